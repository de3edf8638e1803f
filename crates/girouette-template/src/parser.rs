//! Template parser.
//!
//! Splits the source at `{{` / `}}` delimiters, then assembles the flat
//! action stream into a nested AST. Grammar of an action, after trimming:
//!
//! ```text
//! action   := field | "if" path | "else" | "end"
//!           | "range" path | "with" path
//!           | "template" string-lit path?
//! field    := path
//! path     := "." | "." ident ("." ident)*
//! ```

use crate::ast::*;
use crate::error::{SourceSpan, TemplateError, TemplateSource};

pub struct Parser {
    source: TemplateSource,
}

/// A lexed action, before block assembly.
#[derive(Debug)]
enum Action {
    Field(Path),
    If(Path),
    Else,
    End,
    Range(Path),
    With(Path),
    Invoke { name: String, arg: Option<Path> },
}

#[derive(Debug)]
enum Segment {
    Text(String, SourceSpan),
    Action(Action, SourceSpan),
}

impl Parser {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            source: TemplateSource::new(name, source),
        }
    }

    pub fn parse(self) -> Result<Ast, TemplateError> {
        let segments = self.lex()?;
        let mut iter = segments.into_iter().peekable();
        let body = self.parse_body(&mut iter, None)?;
        if let Some(seg) = iter.next() {
            let span = match seg {
                Segment::Text(_, span) | Segment::Action(_, span) => span,
            };
            return Err(self.syntax("unmatched {{end}} or {{else}}", span));
        }
        Ok(Ast { body })
    }

    fn syntax(&self, message: &str, span: SourceSpan) -> TemplateError {
        TemplateError::syntax(message, self.source.location(span))
    }

    /// Split the raw source into text runs and actions.
    fn lex(&self) -> Result<Vec<Segment>, TemplateError> {
        let src = self.source.source.as_str();
        let mut segments = Vec::new();
        let mut rest = src;
        let mut offset = 0;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Text(
                    rest[..open].to_owned(),
                    SourceSpan::new(offset, open),
                ));
            }
            let action_start = offset + open;
            let after_open = &rest[open + 2..];
            let close = after_open.find("}}").ok_or_else(|| {
                self.syntax("unclosed {{", SourceSpan::new(action_start, 2))
            })?;
            let raw = &after_open[..close];
            let span = SourceSpan::new(action_start, close + 4);
            segments.push(Segment::Action(self.lex_action(raw, span)?, span));
            let consumed = open + 2 + close + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(
                rest.to_owned(),
                SourceSpan::new(offset, rest.len()),
            ));
        }
        Ok(segments)
    }

    fn lex_action(&self, raw: &str, span: SourceSpan) -> Result<Action, TemplateError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(self.syntax("empty action", span));
        }
        if trimmed.starts_with('.') {
            return Ok(Action::Field(self.parse_path(trimmed, span)?));
        }
        let (keyword, tail) = match trimmed.find(char::is_whitespace) {
            Some(i) => (&trimmed[..i], trimmed[i..].trim_start()),
            None => (trimmed, ""),
        };
        match keyword {
            "if" => Ok(Action::If(self.parse_path(tail, span)?)),
            "else" => {
                if !tail.is_empty() {
                    return Err(self.syntax("unexpected tokens after else", span));
                }
                Ok(Action::Else)
            }
            "end" => {
                if !tail.is_empty() {
                    return Err(self.syntax("unexpected tokens after end", span));
                }
                Ok(Action::End)
            }
            "range" => Ok(Action::Range(self.parse_path(tail, span)?)),
            "with" => Ok(Action::With(self.parse_path(tail, span)?)),
            "template" => self.lex_invoke(tail, span),
            _ => Err(self.syntax("unknown action", span)),
        }
    }

    /// `template "name"` with an optional path argument. Anything other
    /// than a string literal for the name is a dynamic invocation, which
    /// the engine rejects at compile time.
    fn lex_invoke(&self, tail: &str, span: SourceSpan) -> Result<Action, TemplateError> {
        if !tail.starts_with('"') {
            return Err(TemplateError::DynamicInvokeName {
                location: self.source.location(span),
            });
        }
        let rest = &tail[1..];
        let close = rest.find('"').ok_or_else(|| {
            self.syntax("unterminated template name", span)
        })?;
        let name = rest[..close].to_owned();
        if name.is_empty() {
            return Err(self.syntax("empty template name", span));
        }
        let after = rest[close + 1..].trim();
        let arg = if after.is_empty() {
            None
        } else {
            Some(self.parse_path(after, span)?)
        };
        Ok(Action::Invoke { name, arg })
    }

    fn parse_path(&self, text: &str, span: SourceSpan) -> Result<Path, TemplateError> {
        if text == "." {
            return Ok(Path::dot());
        }
        let Some(stripped) = text.strip_prefix('.') else {
            return Err(self.syntax("expected a .path", span));
        };
        let mut segments = Vec::new();
        for part in stripped.split('.') {
            if part.is_empty() || !is_ident(part) {
                return Err(self.syntax("malformed path segment", span));
            }
            segments.push(part.to_owned());
        }
        Ok(Path { segments })
    }

    /// Assemble the flat segment stream into nested bodies. `block` names
    /// the enclosing construct for error messages; the iterator stops
    /// before a terminator (`end`/`else`) so the caller can consume it.
    fn parse_body(
        &self,
        iter: &mut std::iter::Peekable<std::vec::IntoIter<Segment>>,
        block: Option<(&str, SourceSpan)>,
    ) -> Result<Vec<Node>, TemplateError> {
        let mut body = Vec::new();
        loop {
            match iter.peek() {
                None => {
                    if let Some((kind, span)) = block {
                        return Err(
                            self.syntax(&format!("{kind} is missing its {{{{end}}}}"), span)
                        );
                    }
                    return Ok(body);
                }
                // Terminator: left in the stream for the caller. At the
                // root, parse() reports it as stray.
                Some(Segment::Action(Action::End | Action::Else, _)) => return Ok(body),
                _ => {}
            }
            let segment = iter.next().expect("peeked above");
            match segment {
                Segment::Text(text, span) => body.push(Node::Text(TextNode { text, span })),
                Segment::Action(action, span) => match action {
                    Action::Field(path) => body.push(Node::Field(FieldNode { path, span })),
                    Action::If(cond) => {
                        let then_body = self.parse_body(iter, Some(("if", span)))?;
                        let else_body = match iter.next() {
                            Some(Segment::Action(Action::Else, _)) => {
                                let nodes = self.parse_body(iter, Some(("if", span)))?;
                                match iter.next() {
                                    Some(Segment::Action(Action::End, _)) => {}
                                    _ => {
                                        return Err(
                                            self.syntax("if is missing its {{end}}", span)
                                        );
                                    }
                                }
                                Some(nodes)
                            }
                            Some(Segment::Action(Action::End, _)) => None,
                            _ => return Err(self.syntax("if is missing its {{end}}", span)),
                        };
                        body.push(Node::If(IfNode {
                            cond,
                            then_body,
                            else_body,
                            span,
                        }));
                    }
                    Action::Range(collection) => {
                        let inner = self.parse_body(iter, Some(("range", span)))?;
                        self.expect_end(iter, "range", span)?;
                        body.push(Node::Range(RangeNode {
                            collection,
                            body: inner,
                            span,
                        }));
                    }
                    Action::With(path) => {
                        let inner = self.parse_body(iter, Some(("with", span)))?;
                        self.expect_end(iter, "with", span)?;
                        body.push(Node::With(WithNode {
                            path,
                            body: inner,
                            span,
                        }));
                    }
                    Action::Invoke { name, arg } => {
                        body.push(Node::Invoke(InvokeNode { name, arg, span }));
                    }
                    Action::Else | Action::End => unreachable!("peeked above"),
                },
            }
        }
    }

    fn expect_end(
        &self,
        iter: &mut std::iter::Peekable<std::vec::IntoIter<Segment>>,
        kind: &str,
        span: SourceSpan,
    ) -> Result<(), TemplateError> {
        match iter.next() {
            Some(Segment::Action(Action::End, _)) => Ok(()),
            Some(Segment::Action(Action::Else, else_span)) => {
                Err(self.syntax(&format!("else is not valid in {kind}"), else_span))
            }
            _ => Err(self.syntax(&format!("{kind} is missing its {{{{end}}}}"), span)),
        }
    }
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
