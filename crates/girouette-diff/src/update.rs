//! The minimal update model.

use girouette_tree::{Dynamic, RenderTree};
use std::collections::BTreeMap;

/// The difference between two render trees of the same template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MinimalUpdate {
    /// The trees are identical; an update cycle emitting this becomes a
    /// heartbeat.
    Unchanged,
    /// A sparse patch against the prior tree's shape.
    Patch(TreePatch),
    /// The root structural identity changed; the client replaces the
    /// whole tree (statics included).
    Replace(RenderTree),
}

/// A sparse set of slot patches, keyed by dynamic slot index. Slots
/// absent from the map are unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TreePatch {
    pub slots: BTreeMap<usize, SlotPatch>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotPatch {
    /// New scalar content for the slot.
    Value(String),
    /// Sparse patch into a nested tree of unchanged shape.
    Nested(TreePatch),
    /// Full replacement of the slot's content: structure or slot type
    /// changed. Carries statics, so the client re-caches them.
    Replace(Dynamic),
    /// Operations against a list slot.
    List(ListPatch),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListPatch {
    pub ops: Vec<ListOp>,
}

/// A list operation. Keys are stable item keys for keyed ranges and
/// positional indices for keyless ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListOp {
    Update { key: ItemKey, patch: ItemPatch },
    Insert {
        key: ItemKey,
        after: Anchor,
        tree: RenderTree,
    },
    Remove { key: ItemKey },
    /// The full new key sequence. Emitted only when the order change is
    /// not explained by the inserts and removes alone.
    Reorder { keys: Vec<ItemKey> },
}

/// Patch for one list item: sparse when the item kept its shape, a full
/// replacement otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemPatch {
    Sparse(TreePatch),
    Replace(RenderTree),
}

/// Anchor for an insert: after an existing item, or at the head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    Head,
    After(ItemKey),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemKey {
    Key(String),
    Index(usize),
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemKey::Key(k) => write!(f, "{k}"),
            ItemKey::Index(i) => write!(f, "{i}"),
        }
    }
}

impl MinimalUpdate {
    pub fn is_empty(&self) -> bool {
        match self {
            MinimalUpdate::Unchanged => true,
            MinimalUpdate::Patch(patch) => patch.slots.is_empty(),
            MinimalUpdate::Replace(_) => false,
        }
    }

    /// Whether the update only writes scalar slot values. Value-only
    /// updates are the ones the delivery gate may merge under
    /// backpressure; anything structural must never be dropped.
    pub fn is_value_only(&self) -> bool {
        match self {
            MinimalUpdate::Unchanged => true,
            MinimalUpdate::Patch(patch) => patch.is_value_only(),
            MinimalUpdate::Replace(_) => false,
        }
    }

    /// Total scalar slot writes, across all nesting.
    pub fn value_update_count(&self) -> usize {
        match self {
            MinimalUpdate::Unchanged | MinimalUpdate::Replace(_) => 0,
            MinimalUpdate::Patch(patch) => patch.value_update_count(),
        }
    }
}

impl TreePatch {
    pub fn is_value_only(&self) -> bool {
        self.slots.values().all(SlotPatch::is_value_only)
    }

    pub fn value_update_count(&self) -> usize {
        self.slots.values().map(SlotPatch::value_update_count).sum()
    }

    /// List operations across all nesting, for the planner's per-subtree
    /// cap.
    pub fn list_op_count(&self) -> usize {
        self.slots.values().map(SlotPatch::list_op_count).sum()
    }
}

impl SlotPatch {
    pub fn is_value_only(&self) -> bool {
        match self {
            SlotPatch::Value(_) => true,
            SlotPatch::Nested(nested) => nested.is_value_only(),
            SlotPatch::Replace(_) | SlotPatch::List(_) => false,
        }
    }

    pub fn value_update_count(&self) -> usize {
        match self {
            SlotPatch::Value(_) => 1,
            SlotPatch::Nested(nested) => nested.value_update_count(),
            SlotPatch::Replace(_) => 0,
            SlotPatch::List(list) => list
                .ops
                .iter()
                .map(|op| match op {
                    ListOp::Update {
                        patch: ItemPatch::Sparse(p),
                        ..
                    } => p.value_update_count(),
                    _ => 0,
                })
                .sum(),
        }
    }

    pub fn list_op_count(&self) -> usize {
        match self {
            SlotPatch::Value(_) | SlotPatch::Replace(_) => 0,
            SlotPatch::Nested(nested) => nested.list_op_count(),
            SlotPatch::List(list) => {
                list.ops.len()
                    + list
                        .ops
                        .iter()
                        .map(|op| match op {
                            ListOp::Update {
                                patch: ItemPatch::Sparse(p),
                                ..
                            } => p.list_op_count(),
                            _ => 0,
                        })
                        .sum::<usize>()
            }
        }
    }
}
