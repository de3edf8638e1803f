//! Coalescing successive minimal updates.
//!
//! Two updates produced by consecutive cycles compose into one update
//! equivalent to applying both in order: later scalar writes win, list
//! operations concatenate and then normalize (an insert followed by a
//! remove of the same key annihilates, successive updates to one item
//! collapse to their composition), and a later whole-subtree replace
//! supersedes whatever preceded it.
//!
//! Composition can fail when the newer update's shape does not fit the
//! state the older one left behind; callers treat that as "not mergeable"
//! and fall back to a resync or a full render.

use crate::apply::{apply, apply_list, apply_tree};
use crate::update::{
    ItemKey, ItemPatch, ListOp, ListPatch, MinimalUpdate, SlotPatch, TreePatch,
};
use girouette_tree::Dynamic;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("updates cannot be composed")]
    Incompatible,
}

impl MinimalUpdate {
    /// Compose `newer` on top of `self`.
    pub fn merge(self, newer: MinimalUpdate) -> Result<MinimalUpdate, MergeError> {
        match (self, newer) {
            (older, MinimalUpdate::Unchanged) => Ok(older),
            (MinimalUpdate::Unchanged, newer) => Ok(newer),
            (_, MinimalUpdate::Replace(tree)) => Ok(MinimalUpdate::Replace(tree)),
            (MinimalUpdate::Replace(tree), MinimalUpdate::Patch(patch)) => {
                let patched = apply(&tree, &MinimalUpdate::Patch(patch))
                    .map_err(|_| MergeError::Incompatible)?;
                Ok(MinimalUpdate::Replace(patched))
            }
            (MinimalUpdate::Patch(older), MinimalUpdate::Patch(newer)) => {
                Ok(MinimalUpdate::Patch(merge_tree(older, newer)?))
            }
        }
    }
}

fn merge_tree(mut older: TreePatch, newer: TreePatch) -> Result<TreePatch, MergeError> {
    for (index, slot) in newer.slots {
        let merged = match older.slots.remove(&index) {
            None => slot,
            Some(existing) => merge_slot(existing, slot)?,
        };
        // Composition can cancel out (insert + remove); drop the slot
        // rather than shipping an empty patch.
        let cancelled = match &merged {
            SlotPatch::List(list) => list.ops.is_empty(),
            SlotPatch::Nested(nested) => nested.slots.is_empty(),
            SlotPatch::Value(_) | SlotPatch::Replace(_) => false,
        };
        if !cancelled {
            older.slots.insert(index, merged);
        }
    }
    Ok(older)
}

fn merge_slot(older: SlotPatch, newer: SlotPatch) -> Result<SlotPatch, MergeError> {
    match (older, newer) {
        // The newer write fully determines the slot.
        (_, SlotPatch::Value(value)) => Ok(SlotPatch::Value(value)),
        (_, SlotPatch::Replace(dynamic)) => Ok(SlotPatch::Replace(dynamic)),

        (SlotPatch::Nested(older), SlotPatch::Nested(newer)) => {
            Ok(SlotPatch::Nested(merge_tree(older, newer)?))
        }
        (SlotPatch::List(older), SlotPatch::List(newer)) => {
            let mut ops = older.ops;
            ops.extend(newer.ops);
            Ok(SlotPatch::List(ListPatch {
                ops: normalize_ops(ops)?,
            }))
        }

        // A sparse patch layered on a replacement folds into the
        // replacement.
        (SlotPatch::Replace(Dynamic::Tree(mut tree)), SlotPatch::Nested(patch)) => {
            apply_tree(&mut tree, &patch).map_err(|_| MergeError::Incompatible)?;
            Ok(SlotPatch::Replace(Dynamic::Tree(tree)))
        }
        (SlotPatch::Replace(Dynamic::List(mut list)), SlotPatch::List(patch)) => {
            apply_list(&mut list, &patch.ops).map_err(|_| MergeError::Incompatible)?;
            Ok(SlotPatch::Replace(Dynamic::List(list)))
        }

        _ => Err(MergeError::Incompatible),
    }
}

/// Normalize a concatenated op sequence, preserving the relative order of
/// the operations that survive.
fn normalize_ops(ops: Vec<ListOp>) -> Result<Vec<ListOp>, MergeError> {
    let mut out: Vec<ListOp> = Vec::with_capacity(ops.len());
    for op in ops {
        match op {
            ListOp::Remove { key } => {
                let pending_insert = out
                    .iter()
                    .position(|o| matches!(o, ListOp::Insert { key: k, .. } if *k == key));
                out.retain(|o| !matches!(o, ListOp::Update { key: k, .. } if *k == key));
                match pending_insert {
                    // Inserted and removed within the window: a no-op.
                    Some(position) => {
                        out.remove(position);
                    }
                    None => out.push(ListOp::Remove { key }),
                }
            }
            ListOp::Update { key, patch } => {
                if let Some(ListOp::Insert { tree, .. }) = out
                    .iter_mut()
                    .find(|o| matches!(o, ListOp::Insert { key: k, .. } if *k == key))
                {
                    match patch {
                        ItemPatch::Replace(new_tree) => *tree = new_tree,
                        ItemPatch::Sparse(p) => {
                            apply_tree(tree, &p).map_err(|_| MergeError::Incompatible)?;
                        }
                    }
                } else if let Some(ListOp::Update { patch: existing, .. }) = out
                    .iter_mut()
                    .find(|o| matches!(o, ListOp::Update { key: k, .. } if *k == key))
                {
                    *existing = compose_item(existing.clone(), patch)?;
                } else {
                    out.push(ListOp::Update { key, patch });
                }
            }
            ListOp::Insert { .. } => out.push(op),
            ListOp::Reorder { keys } => {
                // Only the latest ordering matters.
                out.retain(|o| !matches!(o, ListOp::Reorder { .. }));
                out.push(ListOp::Reorder { keys });
            }
        }
    }
    Ok(out)
}

fn compose_item(older: ItemPatch, newer: ItemPatch) -> Result<ItemPatch, MergeError> {
    match (older, newer) {
        (_, ItemPatch::Replace(tree)) => Ok(ItemPatch::Replace(tree)),
        (ItemPatch::Replace(mut tree), ItemPatch::Sparse(patch)) => {
            apply_tree(&mut tree, &patch).map_err(|_| MergeError::Incompatible)?;
            Ok(ItemPatch::Replace(tree))
        }
        (ItemPatch::Sparse(older), ItemPatch::Sparse(newer)) => {
            Ok(ItemPatch::Sparse(merge_tree(older, newer)?))
        }
    }
}
