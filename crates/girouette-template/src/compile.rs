//! Lowering from the parsed AST to the construct tree.
//!
//! The construct tree is the compile-time shape of a template: per body, an
//! ordered statics array framing dynamic slots, each slot carrying its
//! construct, its escape context, and its source span. Slot indices are
//! fixed here and never change across hydrations.
//!
//! Lowering also resolves `{{template}}` invocations against the template
//! set (rejecting unknown names and cycles), assigns escape contexts by
//! scanning the statics, detects range key fields, and accumulates the
//! capabilities report.

use crate::ast::{Node, Path};
use crate::error::{SourceSpan, TemplateError, TemplateSource};
use crate::escape::{EscapeContext, Scanner, SlotPlacement};
use crate::parser::Parser;
use std::collections::HashMap;
use std::sync::Arc;

/// A lowered template body: `statics.len() == slots.len() + 1`.
#[derive(Debug, Clone)]
pub(crate) struct CompiledBody {
    pub statics: Vec<String>,
    pub slots: Vec<Slot>,
}

#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub construct: ConstructSlot,
    pub context: EscapeContext,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub(crate) enum ConstructSlot {
    Field {
        path: Path,
    },
    Conditional {
        cond: Path,
        then_body: CompiledBody,
        else_body: Option<CompiledBody>,
    },
    Range {
        collection: Path,
        /// Name of the item field that declares the stable key, when the
        /// body references one.
        key_field: Option<String>,
        body: CompiledBody,
    },
    With {
        path: Path,
        body: CompiledBody,
    },
    Invoke {
        name: String,
        arg: Option<Path>,
        body: Arc<CompiledBody>,
    },
}

/// Per-construct classification: whether the differ can patch through it
/// or updates touching it degrade to a subtree replace.
#[derive(Debug, Clone)]
pub struct Capabilities {
    entries: Vec<CapabilityEntry>,
}

#[derive(Debug, Clone)]
pub struct CapabilityEntry {
    /// `name:line:col` of the construct.
    pub location: String,
    pub construct: &'static str,
    pub patchable: bool,
    pub reason: Option<&'static str>,
}

impl Capabilities {
    pub fn entries(&self) -> &[CapabilityEntry] {
        &self.entries
    }

    /// True when every construct supports tree patching.
    pub fn fully_patchable(&self) -> bool {
        self.entries.iter().all(|e| e.patchable)
    }

    pub fn forces_replace(&self) -> impl Iterator<Item = &CapabilityEntry> {
        self.entries.iter().filter(|e| !e.patchable)
    }
}

/// Item field names that declare a stable range key, checked in order.
const KEY_FIELD_NAMES: &[&str] = &["ID", "Id", "id"];

pub(crate) struct Compiler<'set> {
    sources: &'set HashMap<String, String>,
    /// Compiled sub-templates, shared between invoke sites.
    compiled: HashMap<String, Arc<CompiledBody>>,
    /// Invocation stack for cycle detection.
    in_progress: Vec<String>,
    capabilities: Vec<CapabilityEntry>,
}

impl<'set> Compiler<'set> {
    pub(crate) fn new(sources: &'set HashMap<String, String>) -> Self {
        Self {
            sources,
            compiled: HashMap::new(),
            in_progress: Vec::new(),
            capabilities: Vec::new(),
        }
    }

    pub(crate) fn compile_root(
        mut self,
        name: &str,
        source: &str,
    ) -> Result<(CompiledBody, Capabilities), TemplateError> {
        let template_source = TemplateSource::new(name, source);
        let ast = Parser::new(name, source).parse()?;
        self.in_progress.push(name.to_owned());
        let mut scanner = Scanner::new();
        let body = self.lower_body(&ast.body, &template_source, &mut scanner)?;
        self.in_progress.pop();
        Ok((
            body,
            Capabilities {
                entries: self.capabilities,
            },
        ))
    }

    /// Compile a named sub-template for an invoke site. Sub-templates are
    /// compiled once, from a fresh lexical state, and must end back in
    /// element text: that is what lets one compiled body serve every
    /// invoke site.
    fn compile_invoked(
        &mut self,
        name: &str,
        site: String,
    ) -> Result<Arc<CompiledBody>, TemplateError> {
        if self.in_progress.iter().any(|n| n == name) {
            return Err(TemplateError::CyclicInvoke {
                name: name.to_owned(),
                location: site,
            });
        }
        if let Some(body) = self.compiled.get(name) {
            return Ok(body.clone());
        }
        let Some(source) = self.sources.get(name) else {
            return Err(TemplateError::UnknownTemplate {
                name: name.to_owned(),
                location: site,
            });
        };
        let source = source.clone();
        let template_source = TemplateSource::new(name, source.as_str());
        let ast = Parser::new(name, source.as_str()).parse()?;
        self.in_progress.push(name.to_owned());
        let mut scanner = Scanner::new();
        let body = self.lower_body(&ast.body, &template_source, &mut scanner)?;
        self.in_progress.pop();
        if scanner != Scanner::new() {
            return Err(TemplateError::MismatchedContext { location: site });
        }
        let body = Arc::new(body);
        self.compiled.insert(name.to_owned(), body.clone());
        Ok(body)
    }

    fn lower_body(
        &mut self,
        nodes: &[Node],
        source: &TemplateSource,
        scanner: &mut Scanner,
    ) -> Result<CompiledBody, TemplateError> {
        let mut statics = vec![String::new()];
        let mut slots = Vec::new();

        for node in nodes {
            if let Node::Text(text) = node {
                scanner.feed(&text.text);
                statics
                    .last_mut()
                    .expect("statics starts non-empty")
                    .push_str(&text.text);
                continue;
            }

            let span = node.span();
            let context = self.slot_context(scanner, source, span)?;
            let construct = match node {
                Node::Text(_) => unreachable!("handled above"),
                Node::Field(field) => {
                    self.note(source, span, "field", true, None);
                    ConstructSlot::Field {
                        path: field.path.clone(),
                    }
                }
                Node::If(node) => {
                    self.note(source, span, "conditional", true, None);
                    let entry = scanner.clone();
                    let mut then_scanner = entry.clone();
                    let then_body =
                        self.lower_body(&node.then_body, source, &mut then_scanner)?;
                    let (else_body, else_scanner) = match &node.else_body {
                        Some(nodes) => {
                            let mut else_scanner = entry.clone();
                            let body = self.lower_body(nodes, source, &mut else_scanner)?;
                            (Some(body), else_scanner)
                        }
                        None => (None, entry.clone()),
                    };
                    if then_scanner != else_scanner {
                        return Err(TemplateError::MismatchedContext {
                            location: source.location(span),
                        });
                    }
                    *scanner = then_scanner;
                    ConstructSlot::Conditional {
                        cond: node.cond.clone(),
                        then_body,
                        else_body,
                    }
                }
                Node::Range(node) => {
                    let entry = scanner.clone();
                    let mut body_scanner = entry.clone();
                    let body = self.lower_body(&node.body, source, &mut body_scanner)?;
                    if body_scanner != entry {
                        return Err(TemplateError::MismatchedContext {
                            location: source.location(span),
                        });
                    }
                    let key_field = detect_key_field(&body);
                    if key_field.is_some() {
                        self.note(source, span, "range", true, None);
                    } else {
                        self.note(
                            source,
                            span,
                            "range",
                            false,
                            Some("keyless range: a length change replaces the whole list"),
                        );
                    }
                    ConstructSlot::Range {
                        collection: node.collection.clone(),
                        key_field,
                        body,
                    }
                }
                Node::With(node) => {
                    self.note(source, span, "with", true, None);
                    let entry = scanner.clone();
                    let mut body_scanner = entry.clone();
                    let body = self.lower_body(&node.body, source, &mut body_scanner)?;
                    if body_scanner != entry {
                        return Err(TemplateError::MismatchedContext {
                            location: source.location(span),
                        });
                    }
                    ConstructSlot::With {
                        path: node.path.clone(),
                        body,
                    }
                }
                Node::Invoke(node) => {
                    self.note(source, span, "invoke", true, None);
                    if context != EscapeContext::ElementText {
                        return Err(TemplateError::SplitAttribute {
                            location: source.location(span),
                        });
                    }
                    let body = self.compile_invoked(&node.name, source.location(span))?;
                    ConstructSlot::Invoke {
                        name: node.name.clone(),
                        arg: node.arg.clone(),
                        body,
                    }
                }
            };
            slots.push(Slot {
                construct,
                context,
                span,
            });
            statics.push(String::new());
        }

        Ok(CompiledBody { statics, slots })
    }

    fn slot_context(
        &self,
        scanner: &Scanner,
        source: &TemplateSource,
        span: SourceSpan,
    ) -> Result<EscapeContext, TemplateError> {
        match scanner.placement() {
            SlotPlacement::Ok(context) => Ok(context),
            SlotPlacement::Raw(element) => Err(TemplateError::RawTextSlot {
                element: element.to_owned(),
                location: source.location(span),
            }),
            SlotPlacement::Split => Err(TemplateError::SplitAttribute {
                location: source.location(span),
            }),
        }
    }

    fn note(
        &mut self,
        source: &TemplateSource,
        span: SourceSpan,
        construct: &'static str,
        patchable: bool,
        reason: Option<&'static str>,
    ) {
        self.capabilities.push(CapabilityEntry {
            location: source.location(span),
            construct,
            patchable,
            reason,
        });
    }
}

/// A range body declares its key through a field reference to an
/// `id`-named item field at item scope. References inside nested ranges
/// or `with` blocks refer to other scopes and do not count.
fn detect_key_field(body: &CompiledBody) -> Option<String> {
    fn scan(body: &CompiledBody) -> Option<String> {
        for slot in &body.slots {
            match &slot.construct {
                ConstructSlot::Field { path } => {
                    if let [single] = path.segments.as_slice() {
                        if KEY_FIELD_NAMES.contains(&single.as_str()) {
                            return Some(single.clone());
                        }
                    }
                }
                ConstructSlot::Conditional {
                    then_body,
                    else_body,
                    ..
                } => {
                    if let Some(found) = scan(then_body) {
                        return Some(found);
                    }
                    if let Some(found) = else_body.as_ref().and_then(scan) {
                        return Some(found);
                    }
                }
                // Rebased scopes: `.ID` inside means something else.
                ConstructSlot::Range { .. }
                | ConstructSlot::With { .. }
                | ConstructSlot::Invoke { .. } => {}
            }
        }
        None
    }
    scan(body)
}
