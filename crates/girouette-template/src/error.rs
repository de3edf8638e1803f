//! Error types for template compilation and hydration.
//!
//! Compile errors carry source locations; hydrate errors carry the data
//! path that failed. Both expose a stable `kind()` identifier so adapters
//! can map them onto transport status codes without string matching.

use std::sync::Arc;
use thiserror::Error;

/// A span in template source (byte offset, length).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    offset: usize,
    len: usize,
}

impl SourceSpan {
    pub fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A named template source, kept for error reporting.
#[derive(Debug, Clone)]
pub struct TemplateSource {
    pub name: String,
    pub source: Arc<String>,
}

impl TemplateSource {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: Arc::new(source.into()),
        }
    }

    /// Compute (line, column) from a byte offset. Both are 1-based.
    pub fn offset_to_line_col(&self, offset: usize) -> (usize, usize) {
        let mut line = 1;
        let mut col = 1;
        for (i, ch) in self.source.char_indices() {
            if i >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }

    /// Format a span as `name:line:col`.
    pub fn location(&self, span: SourceSpan) -> String {
        let (line, col) = self.offset_to_line_col(span.offset());
        format!("{}:{}:{}", self.name, line, col)
    }
}

/// A syntax error with its location in the template.
#[derive(Debug, Clone)]
pub struct SyntaxError {
    pub message: String,
    pub location: String,
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.message, self.location)
    }
}

/// Errors raised while compiling a template. These never occur at runtime:
/// a template that compiles hydrates without structural surprises.
#[derive(Error, Debug, Clone)]
pub enum TemplateError {
    #[error("syntax error: {0}")]
    Syntax(Box<SyntaxError>),

    #[error("unknown template {name:?} invoked at {location}")]
    UnknownTemplate { name: String, location: String },

    #[error("cyclic template invocation through {name:?} at {location}")]
    CyclicInvoke { name: String, location: String },

    #[error("template name must be a string literal at {location}")]
    DynamicInvokeName { location: String },

    #[error("dynamic slot in {element} content at {location}")]
    RawTextSlot { element: String, location: String },

    #[error("dynamic slot outside an attribute value or element text at {location}")]
    SplitAttribute { location: String },

    #[error("branches leave mismatched markup contexts at {location}")]
    MismatchedContext { location: String },
}

impl TemplateError {
    pub fn syntax(message: impl Into<String>, location: String) -> Self {
        TemplateError::Syntax(Box::new(SyntaxError {
            message: message.into(),
            location,
        }))
    }

    /// Stable error kind identifier.
    pub fn kind(&self) -> &'static str {
        "template"
    }
}

/// Errors raised while hydrating a compiled template with a data snapshot.
#[derive(Error, Debug, Clone)]
pub enum HydrateError {
    #[error("data snapshot is missing field {path:?}")]
    MissingField { path: String },

    #[error("field {path:?} is a {type_name}, expected a scalar")]
    NotAScalar {
        path: String,
        type_name: &'static str,
    },

    #[error("field {path:?} is a {type_name}, expected a sequence")]
    NotACollection {
        path: String,
        type_name: &'static str,
    },

    #[error("range item is missing key field {path:?}")]
    MissingKey { path: String },

    #[error("duplicate range key {key:?}")]
    DuplicateKey { key: String },

    #[error("refusing to emit scripting URL in attribute position")]
    UnsafeUrl,
}

impl HydrateError {
    /// Stable error kind identifier.
    pub fn kind(&self) -> &'static str {
        "data-shape"
    }
}
