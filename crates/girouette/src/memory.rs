//! Memory estimation for the tenant budget.
//!
//! Estimates are heap-footprint approximations, not allocator truth; they
//! only need to rank sessions for eviction and trip the budget in the
//! right order of magnitude.

use serde_json::Value;

/// Rough heap footprint of a data snapshot.
pub(crate) fn estimate_snapshot(value: &Value) -> usize {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => size_of::<Value>(),
        Value::String(s) => size_of::<Value>() + s.len(),
        Value::Array(items) => {
            size_of::<Value>() + items.iter().map(estimate_snapshot).sum::<usize>()
        }
        Value::Object(map) => {
            size_of::<Value>()
                + map
                    .iter()
                    .map(|(k, v)| k.len() + estimate_snapshot(v))
                    .sum::<usize>()
        }
    }
}
