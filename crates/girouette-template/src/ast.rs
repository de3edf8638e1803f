//! Parsed template AST.
//!
//! The parser produces this tree; the compile pass lowers it into the
//! construct tree with fixed slot indices, folding adjacent text runs into
//! statics along the way.

use crate::error::SourceSpan;
use std::fmt;

/// A parsed template body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ast {
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(TextNode),
    Field(FieldNode),
    If(IfNode),
    Range(RangeNode),
    With(WithNode),
    Invoke(InvokeNode),
}

impl Node {
    pub fn span(&self) -> SourceSpan {
        match self {
            Node::Text(n) => n.span,
            Node::Field(n) => n.span,
            Node::If(n) => n.span,
            Node::Range(n) => n.span,
            Node::With(n) => n.span,
            Node::Invoke(n) => n.span,
        }
    }
}

/// A literal HTML run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextNode {
    pub text: String,
    pub span: SourceSpan,
}

/// `{{.Path.To.Field}}` - emits the value at a data path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNode {
    pub path: Path,
    pub span: SourceSpan,
}

/// `{{if .Cond}} ... {{else}} ... {{end}}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfNode {
    pub cond: Path,
    pub then_body: Vec<Node>,
    pub else_body: Option<Vec<Node>>,
    pub span: SourceSpan,
}

/// `{{range .Items}} ... {{end}}` - repeats the body per element, with the
/// context rebased to the element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeNode {
    pub collection: Path,
    pub body: Vec<Node>,
    pub span: SourceSpan,
}

/// `{{with .Path}} ... {{end}}` - rebases the context when the value is
/// truthy, renders empty otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithNode {
    pub path: Path,
    pub body: Vec<Node>,
    pub span: SourceSpan,
}

/// `{{template "name" .Arg}}` - expands a named sub-template, resolved at
/// compile time. The argument defaults to the current context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeNode {
    pub name: String,
    pub arg: Option<Path>,
    pub span: SourceSpan,
}

/// A dot-path relative to the current context. Empty segments means the
/// context value itself (`{{.}}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    pub segments: Vec<String>,
}

impl Path {
    pub fn dot() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    pub fn is_dot(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, ".");
        }
        for segment in &self.segments {
            write!(f, ".{segment}")?;
        }
        Ok(())
    }
}
