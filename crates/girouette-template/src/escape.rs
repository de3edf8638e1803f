//! Lexical escape contexts.
//!
//! The compiler runs a small HTML state machine over the statics of each
//! body and records, per dynamic slot, which escaping its values need at
//! hydration time. Slots inside `<script>`/`<style>`/comments, slots
//! between attributes, and slots in unquoted attribute values are compile
//! errors; everything a template that compiles can emit is escapable.

use crate::error::HydrateError;
use std::borrow::Cow;

/// Attribute quoting style, which picks the escaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quote {
    Double,
    Single,
}

/// The lexical context a dynamic slot sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeContext {
    /// Element text content.
    ElementText,
    /// Inside a quoted attribute value.
    Attribute(Quote),
    /// Inside a quoted attribute value of a URL attribute (`href`, `src`,
    /// ...). Escaped like an attribute, plus scripting-scheme rejection.
    UrlAttribute(Quote),
}

/// Escape a scalar for its context. The only failure is a scripting URL
/// in a URL attribute.
pub fn escape(value: &str, context: EscapeContext) -> Result<String, HydrateError> {
    let escaped: Cow<'_, str> = match context {
        EscapeContext::ElementText => html_escape::encode_text(value),
        EscapeContext::Attribute(Quote::Double) => {
            html_escape::encode_double_quoted_attribute(value)
        }
        EscapeContext::Attribute(Quote::Single) => {
            html_escape::encode_single_quoted_attribute(value)
        }
        EscapeContext::UrlAttribute(quote) => {
            if has_scripting_scheme(value) {
                return Err(HydrateError::UnsafeUrl);
            }
            return escape(value, EscapeContext::Attribute(quote));
        }
    };
    Ok(escaped.into_owned())
}

fn has_scripting_scheme(value: &str) -> bool {
    let head: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .take(11)
        .collect::<String>()
        .to_ascii_lowercase();
    head.starts_with("javascript:") || head.starts_with("vbscript:")
}

/// Where the scanner is, lexically, after consuming some prefix of a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LexState {
    Text,
    /// Just consumed `<`.
    TagOpen,
    /// Consumed `<!`; deciding between a comment and a declaration.
    Bang { seen_dash: bool },
    Tag(TagState),
    AttrValue { tag: TagState, quote: Quote, url: bool },
    Comment { seen_dashes: u8 },
    RawText { element: RawKind, tail_match: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RawKind {
    Script,
    Style,
}

impl RawKind {
    pub(crate) fn element(&self) -> &'static str {
        match self {
            RawKind::Script => "script",
            RawKind::Style => "style",
        }
    }

    fn close_pattern(&self) -> &'static str {
        match self {
            RawKind::Script => "</script",
            RawKind::Style => "</style",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TagState {
    name: String,
    name_done: bool,
    closing: bool,
    self_closing: bool,
    attr: String,
    mode: TagMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagMode {
    Attrs,
    AfterEq,
    Unquoted,
}

impl TagState {
    fn open() -> Self {
        Self {
            name: String::new(),
            name_done: false,
            closing: false,
            self_closing: false,
            attr: String::new(),
            mode: TagMode::Attrs,
        }
    }

    fn closing() -> Self {
        Self {
            closing: true,
            name_done: true,
            ..Self::open()
        }
    }
}

/// What a slot placed at the current scanner position means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotPlacement {
    Ok(EscapeContext),
    /// Inside script/style/comment content.
    Raw(&'static str),
    /// Between attributes, in a tag name, or in an unquoted value.
    Split,
}

/// HTML lexical scanner. Not a full HTML5 tokenizer; it tracks exactly the
/// distinctions escaping needs: text vs tag vs quoted attribute value vs
/// raw text vs comment, plus the current attribute name for URL detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Scanner {
    state: LexState,
}

impl Scanner {
    pub(crate) fn new() -> Self {
        Self {
            state: LexState::Text,
        }
    }

    pub(crate) fn placement(&self) -> SlotPlacement {
        match &self.state {
            LexState::Text => SlotPlacement::Ok(EscapeContext::ElementText),
            LexState::AttrValue { quote, url, .. } => {
                if *url {
                    SlotPlacement::Ok(EscapeContext::UrlAttribute(*quote))
                } else {
                    SlotPlacement::Ok(EscapeContext::Attribute(*quote))
                }
            }
            LexState::RawText { element, .. } => SlotPlacement::Raw(element.element()),
            LexState::Comment { .. } => SlotPlacement::Raw("comment"),
            LexState::TagOpen | LexState::Bang { .. } | LexState::Tag(_) => SlotPlacement::Split,
        }
    }

    pub(crate) fn feed(&mut self, text: &str) {
        for c in text.chars() {
            self.step(c);
        }
    }

    fn step(&mut self, c: char) {
        let state = std::mem::replace(&mut self.state, LexState::Text);
        self.state = match state {
            LexState::Text => {
                if c == '<' {
                    LexState::TagOpen
                } else {
                    LexState::Text
                }
            }
            LexState::TagOpen => {
                if c == '!' {
                    LexState::Bang { seen_dash: false }
                } else if c == '/' {
                    LexState::Tag(TagState::closing())
                } else if c.is_ascii_alphabetic() {
                    let mut tag = TagState::open();
                    tag.name.push(c.to_ascii_lowercase());
                    LexState::Tag(tag)
                } else {
                    // A bare '<' in text.
                    LexState::Text
                }
            }
            LexState::Bang { seen_dash } => {
                if c == '-' {
                    if seen_dash {
                        LexState::Comment { seen_dashes: 0 }
                    } else {
                        LexState::Bang { seen_dash: true }
                    }
                } else {
                    // Declaration (`<!DOCTYPE ...>`): treat like a tag.
                    LexState::Tag(TagState::closing())
                }
            }
            LexState::Comment { seen_dashes } => match c {
                '-' => LexState::Comment {
                    seen_dashes: (seen_dashes + 1).min(2),
                },
                '>' if seen_dashes >= 2 => LexState::Text,
                _ => LexState::Comment { seen_dashes: 0 },
            },
            LexState::Tag(mut tag) => match tag.mode {
                TagMode::Attrs => {
                    if c == '>' {
                        Self::end_of_tag(&tag)
                    } else if c == '/' {
                        tag.self_closing = true;
                        tag.name_done = true;
                        LexState::Tag(tag)
                    } else if c == '=' && !tag.attr.is_empty() {
                        tag.mode = TagMode::AfterEq;
                        LexState::Tag(tag)
                    } else if c.is_whitespace() {
                        tag.name_done = true;
                        tag.attr.clear();
                        LexState::Tag(tag)
                    } else {
                        if tag.name_done {
                            tag.attr.push(c.to_ascii_lowercase());
                        } else {
                            tag.name.push(c.to_ascii_lowercase());
                        }
                        LexState::Tag(tag)
                    }
                }
                TagMode::AfterEq => {
                    if c == '"' || c == '\'' {
                        let quote = if c == '"' { Quote::Double } else { Quote::Single };
                        let url = is_url_attr(&tag.attr);
                        tag.mode = TagMode::Attrs;
                        tag.attr.clear();
                        LexState::AttrValue { tag, quote, url }
                    } else if c == '>' {
                        Self::end_of_tag(&tag)
                    } else if c.is_whitespace() {
                        LexState::Tag(tag)
                    } else {
                        tag.mode = TagMode::Unquoted;
                        LexState::Tag(tag)
                    }
                }
                TagMode::Unquoted => {
                    if c == '>' {
                        Self::end_of_tag(&tag)
                    } else {
                        if c.is_whitespace() {
                            tag.mode = TagMode::Attrs;
                            tag.attr.clear();
                        }
                        LexState::Tag(tag)
                    }
                }
            },
            LexState::AttrValue { tag, quote, url } => {
                let closes = match quote {
                    Quote::Double => c == '"',
                    Quote::Single => c == '\'',
                };
                if closes {
                    LexState::Tag(tag)
                } else {
                    LexState::AttrValue { tag, quote, url }
                }
            }
            LexState::RawText {
                element,
                tail_match,
            } => {
                let pattern = element.close_pattern().as_bytes();
                let expected = pattern[tail_match] as char;
                if c.to_ascii_lowercase() == expected {
                    if tail_match + 1 == pattern.len() {
                        LexState::Tag(TagState::closing())
                    } else {
                        LexState::RawText {
                            element,
                            tail_match: tail_match + 1,
                        }
                    }
                } else {
                    LexState::RawText {
                        element,
                        tail_match: if c == '<' { 1 } else { 0 },
                    }
                }
            }
        };
    }

    fn end_of_tag(tag: &TagState) -> LexState {
        if tag.closing || tag.self_closing {
            return LexState::Text;
        }
        match tag.name.as_str() {
            "script" => LexState::RawText {
                element: RawKind::Script,
                tail_match: 0,
            },
            "style" => LexState::RawText {
                element: RawKind::Style,
                tail_match: 0,
            },
            _ => LexState::Text,
        }
    }
}

fn is_url_attr(name: &str) -> bool {
    matches!(name, "href" | "src" | "action" | "formaction" | "poster")
}
