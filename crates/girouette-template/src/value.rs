//! Data snapshot access helpers.
//!
//! A data snapshot is a `serde_json::Value`: a tree of scalars, ordered
//! sequences, and string-keyed mappings. These helpers extend it with the
//! template-specific operations the hydrator needs.

use crate::ast::Path;
use serde_json::Value;

pub trait ValueExt {
    /// Truthiness for conditionals and `with`.
    fn is_truthy(&self) -> bool;

    /// A human-readable type name for error messages.
    fn type_name(&self) -> &'static str;

    /// Stringify a scalar with the fixed, locale-independent formatter:
    /// integers base 10, floats shortest-round-trip, booleans
    /// `true`/`false`, null empty. `None` for sequences and mappings.
    fn format_scalar(&self) -> Option<String>;
}

impl ValueExt for Value {
    fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    i != 0
                } else if let Some(u) = n.as_u64() {
                    u != 0
                } else {
                    n.as_f64().is_some_and(|f| f != 0.0)
                }
            }
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "sequence",
            Value::Object(_) => "mapping",
        }
    }

    fn format_scalar(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(b) => Some(if *b { "true" } else { "false" }.to_owned()),
            // itoa for integers, ryu shortest-round-trip for floats.
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// Resolve a dot-path against the current context. Paths descend through
/// mappings only; an empty path is the context itself.
pub fn lookup<'v>(dot: &'v Value, path: &Path) -> Option<&'v Value> {
    let mut current = dot;
    for segment in &path.segments {
        match current {
            Value::Object(map) => current = map.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}
