//! Hydration: construct tree × data snapshot → render tree.
//!
//! Hydration is deterministic and byte-reproducible: slot order was fixed
//! at compile time, scalar formatting is locale-independent, and escaping
//! is decided by each slot's compile-time context.

use crate::compile::{CompiledBody, ConstructSlot, Slot};
use crate::error::HydrateError;
use crate::escape::escape;
use crate::value::{ValueExt, lookup};
use girouette_tree::{Dynamic, RenderItem, RenderList, RenderTree};
use serde_json::Value;
use std::collections::HashSet;

pub(crate) fn hydrate_body(body: &CompiledBody, dot: &Value) -> Result<RenderTree, HydrateError> {
    let mut dynamics = Vec::with_capacity(body.slots.len());
    for slot in &body.slots {
        dynamics.push(hydrate_slot(slot, dot)?);
    }
    Ok(RenderTree {
        statics: body.statics.clone(),
        dynamics,
    })
}

fn hydrate_slot(slot: &Slot, dot: &Value) -> Result<Dynamic, HydrateError> {
    match &slot.construct {
        ConstructSlot::Field { path } => {
            let value = lookup(dot, path).ok_or_else(|| HydrateError::MissingField {
                path: path.to_string(),
            })?;
            let raw = value
                .format_scalar()
                .ok_or_else(|| HydrateError::NotAScalar {
                    path: path.to_string(),
                    type_name: value.type_name(),
                })?;
            Ok(Dynamic::Value(escape(&raw, slot.context)?))
        }
        ConstructSlot::Conditional {
            cond,
            then_body,
            else_body,
        } => {
            // A missing conditional path is simply false.
            let truthy = lookup(dot, cond).is_some_and(|v| v.is_truthy());
            if truthy {
                Ok(Dynamic::Tree(hydrate_body(then_body, dot)?))
            } else {
                match else_body {
                    Some(body) => Ok(Dynamic::Tree(hydrate_body(body, dot)?)),
                    None => Ok(Dynamic::Value(String::new())),
                }
            }
        }
        ConstructSlot::Range {
            collection,
            key_field,
            body,
        } => {
            let items = match lookup(dot, collection) {
                None | Some(Value::Null) => &[][..],
                Some(Value::Array(items)) => items.as_slice(),
                Some(other) => {
                    return Err(HydrateError::NotACollection {
                        path: collection.to_string(),
                        type_name: other.type_name(),
                    });
                }
            };
            let mut seen = HashSet::new();
            let mut rendered = Vec::with_capacity(items.len());
            for item in items {
                let key = match key_field {
                    Some(field) => Some(item_key(item, field, &mut seen)?),
                    None => None,
                };
                rendered.push(RenderItem {
                    key,
                    tree: hydrate_body(body, item)?,
                });
            }
            Ok(Dynamic::List(RenderList {
                keyed: key_field.is_some(),
                items: rendered,
            }))
        }
        ConstructSlot::With { path, body } => {
            match lookup(dot, path) {
                Some(value) if value.is_truthy() => {
                    Ok(Dynamic::Tree(hydrate_body(body, value)?))
                }
                _ => Ok(Dynamic::Value(String::new())),
            }
        }
        ConstructSlot::Invoke { arg, body, .. } => {
            let value = match arg {
                Some(path) => lookup(dot, path).ok_or_else(|| HydrateError::MissingField {
                    path: path.to_string(),
                })?,
                None => dot,
            };
            Ok(Dynamic::Tree(hydrate_body(body, value)?))
        }
    }
}

/// Extract and uniqueness-check an item's stable key. Keys are the raw
/// scalar, unescaped: they identify items, they are never emitted as HTML.
fn item_key(
    item: &Value,
    field: &str,
    seen: &mut HashSet<String>,
) -> Result<String, HydrateError> {
    let key = item
        .get(field)
        .and_then(|v| match v {
            Value::Null => None,
            _ => v.format_scalar(),
        })
        .ok_or_else(|| HydrateError::MissingKey {
            path: format!(".{field}"),
        })?;
    if !seen.insert(key.clone()) {
        return Err(HydrateError::DuplicateKey { key });
    }
    Ok(key)
}
