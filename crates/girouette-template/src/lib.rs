//! Template compiler and hydrator for the girouette live template engine.
//!
//! A template is compiled once into an immutable construct tree - typed
//! nodes (text, field, conditional, range, with, invoke) with fixed,
//! position-ordered dynamic slot indices - and then hydrated once per data
//! snapshot into a [`girouette_tree::RenderTree`]. Compilation resolves
//! named sub-templates, assigns HTML escape contexts to every slot, and
//! reports which constructs support tree patching.
//!
//! ```
//! use girouette_template::Template;
//! use serde_json::json;
//!
//! let template = Template::compile("hello", "<p>Hello {{.Name}}</p>").unwrap();
//! let tree = template.hydrate(&json!({"Name": "Ada"})).unwrap();
//! assert_eq!(tree.to_html(), "<p>Hello Ada</p>");
//! ```

mod ast;
mod compile;
mod error;
mod escape;
mod hydrate;
mod parser;
mod value;

pub use compile::{Capabilities, CapabilityEntry};
pub use error::{HydrateError, SourceSpan, TemplateError, TemplateSource};
pub use escape::{EscapeContext, Quote};
pub use value::ValueExt;

use compile::{CompiledBody, Compiler};
use girouette_tree::RenderTree;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A compiled template, shared across every session that renders it.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    body: Arc<CompiledBody>,
    capabilities: Capabilities,
}

impl Template {
    /// Compile a standalone template (no sub-template invocations).
    pub fn compile(
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Self, TemplateError> {
        let name = name.into();
        let mut set = TemplateSet::new();
        set.define(name.clone(), source);
        set.compile(&name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Which constructs support tree patching and which force a subtree
    /// replace.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Evaluate the construct tree against a data snapshot.
    ///
    /// Deterministic: the same snapshot always produces a byte-identical
    /// render tree.
    pub fn hydrate(&self, data: &Value) -> Result<RenderTree, HydrateError> {
        hydrate::hydrate_body(&self.body, data)
    }
}

/// A set of named template sources, compiled together so `{{template}}`
/// invocations resolve at compile time.
///
/// Mirrors the loader/engine split of classic template engines, without
/// runtime loading: the engine never discovers a template after compile.
#[derive(Debug, Default)]
pub struct TemplateSet {
    sources: HashMap<String, String>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named template source. Later definitions replace
    /// earlier ones of the same name.
    pub fn define(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(name.into(), source.into());
    }

    /// Compile `root`, resolving every `{{template}}` it reaches.
    pub fn compile(&self, root: &str) -> Result<Template, TemplateError> {
        let Some(source) = self.sources.get(root) else {
            return Err(TemplateError::UnknownTemplate {
                name: root.to_owned(),
                location: root.to_owned(),
            });
        };
        let (body, capabilities) = Compiler::new(&self.sources).compile_root(root, source)?;
        tracing::debug!(
            template = root,
            slots = body.slots.len(),
            patchable = capabilities.fully_patchable(),
            "template compiled"
        );
        Ok(Template {
            name: root.to_owned(),
            body: Arc::new(body),
            capabilities,
        })
    }
}
