//! Wire shape of a complete render tree.
//!
//! A node serializes to a JSON object with `"s"` (the statics array) and one
//! entry per dynamic slot keyed by its decimal index: scalars as strings,
//! nested trees as objects, lists as `{"l": [{"k": key, "t": node}, ...]}`.
//! A complete tree always carries `"s"` on every node; sparse updates (built
//! by the differ) omit statics the client already caches.

use crate::{Dynamic, RenderTree};
use serde_json::{Map, Value, json};

impl RenderTree {
    /// Serialize the complete tree, statics included on every node.
    pub fn to_wire(&self) -> Value {
        let mut node = Map::new();
        node.insert(
            "s".to_owned(),
            Value::Array(self.statics.iter().map(|s| json!(s)).collect()),
        );
        for (i, dynamic) in self.dynamics.iter().enumerate() {
            node.insert(i.to_string(), dynamic.to_wire());
        }
        Value::Object(node)
    }
}

impl Dynamic {
    pub fn to_wire(&self) -> Value {
        match self {
            Dynamic::Value(v) => json!(v),
            Dynamic::Tree(t) => t.to_wire(),
            Dynamic::List(list) => {
                let items: Vec<Value> = list
                    .items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let k = match &item.key {
                            Some(key) => json!(key),
                            None => json!(i),
                        };
                        json!({ "k": k, "t": item.tree.to_wire() })
                    })
                    .collect();
                json!({ "l": items })
            }
        }
    }
}
