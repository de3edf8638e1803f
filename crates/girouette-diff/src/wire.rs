//! Wire shape of a minimal update.
//!
//! Sparse patches serialize like render tree nodes minus the statics:
//! a JSON object with one entry per changed slot, keyed by decimal index.
//! An entry is a string (scalar write), an object without `"s"` (sparse
//! nested patch), an object with `"s"` (subtree replace: the client
//! re-caches statics), or `{"ops": [...]}` (list operations).

use crate::update::{
    Anchor, ItemKey, ItemPatch, ListOp, MinimalUpdate, SlotPatch, TreePatch,
};
use serde_json::{Map, Value, json};

impl MinimalUpdate {
    pub fn to_wire(&self) -> Value {
        match self {
            MinimalUpdate::Unchanged => Value::Object(Map::new()),
            MinimalUpdate::Patch(patch) => patch.to_wire(),
            MinimalUpdate::Replace(tree) => tree.to_wire(),
        }
    }

    /// Serialized wire size in bytes, the quantity the planner caps.
    pub fn wire_size(&self) -> usize {
        self.to_wire().to_string().len()
    }
}

impl TreePatch {
    pub fn to_wire(&self) -> Value {
        let mut node = Map::new();
        for (index, slot) in &self.slots {
            node.insert(index.to_string(), slot.to_wire());
        }
        Value::Object(node)
    }
}

impl SlotPatch {
    pub fn to_wire(&self) -> Value {
        match self {
            SlotPatch::Value(value) => json!(value),
            SlotPatch::Nested(patch) => patch.to_wire(),
            SlotPatch::Replace(dynamic) => dynamic.to_wire(),
            SlotPatch::List(list) => {
                json!({ "ops": list.ops.iter().map(ListOp::to_wire).collect::<Vec<_>>() })
            }
        }
    }
}

impl ListOp {
    pub fn to_wire(&self) -> Value {
        match self {
            ListOp::Update { key, patch } => {
                json!({ "op": "update", "key": key.to_wire(), "patch": patch.to_wire() })
            }
            ListOp::Insert { key, after, tree } => json!({
                "op": "insert",
                "key": key.to_wire(),
                "after": after.to_wire(),
                "tree": tree.to_wire(),
            }),
            ListOp::Remove { key } => json!({ "op": "remove", "key": key.to_wire() }),
            ListOp::Reorder { keys } => json!({
                "op": "reorder",
                "keys": keys.iter().map(ItemKey::to_wire).collect::<Vec<_>>(),
            }),
        }
    }
}

impl ItemPatch {
    pub fn to_wire(&self) -> Value {
        match self {
            ItemPatch::Sparse(patch) => patch.to_wire(),
            ItemPatch::Replace(tree) => tree.to_wire(),
        }
    }
}

impl ItemKey {
    pub fn to_wire(&self) -> Value {
        match self {
            ItemKey::Key(key) => json!(key),
            ItemKey::Index(index) => json!(index),
        }
    }
}

impl Anchor {
    pub fn to_wire(&self) -> Value {
        match self {
            Anchor::Head => Value::Null,
            Anchor::After(key) => key.to_wire(),
        }
    }
}
