//! Applying a minimal update to a render tree.
//!
//! This is the client patcher's reference semantics, kept server-side for
//! two reasons: the round-trip tests (diff then apply must reproduce the
//! new tree byte for byte), and update merging, which composes a sparse
//! patch onto a replacement tree.

use crate::update::{
    Anchor, ItemKey, ItemPatch, ListOp, MinimalUpdate, SlotPatch, TreePatch,
};
use girouette_tree::{Dynamic, RenderItem, RenderList, RenderTree};
use thiserror::Error;

/// An update that does not fit the tree it was applied to. Under the
/// differ's contract this cannot happen; seeing it means session state is
/// corrupted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("patch addresses slot {index} but the tree has {len} slots")]
    BadSlot { index: usize, len: usize },

    #[error("patch kind does not match slot content at slot {index}")]
    KindMismatch { index: usize },

    #[error("list op addresses unknown key {key}")]
    UnknownKey { key: String },

    #[error("insert anchor {key} not found")]
    UnknownAnchor { key: String },

    #[error("reorder key set does not match the list")]
    ReorderMismatch,
}

impl ApplyError {
    /// Stable error kind identifier.
    pub fn kind(&self) -> &'static str {
        "fatal"
    }
}

/// Apply `update` to `prior`, producing the new tree.
pub fn apply(prior: &RenderTree, update: &MinimalUpdate) -> Result<RenderTree, ApplyError> {
    match update {
        MinimalUpdate::Unchanged => Ok(prior.clone()),
        MinimalUpdate::Replace(tree) => Ok(tree.clone()),
        MinimalUpdate::Patch(patch) => {
            let mut tree = prior.clone();
            apply_tree(&mut tree, patch)?;
            Ok(tree)
        }
    }
}

pub(crate) fn apply_tree(tree: &mut RenderTree, patch: &TreePatch) -> Result<(), ApplyError> {
    for (&index, slot_patch) in &patch.slots {
        let len = tree.dynamics.len();
        let slot = tree
            .dynamics
            .get_mut(index)
            .ok_or(ApplyError::BadSlot { index, len })?;
        apply_slot(slot, slot_patch, index)?;
    }
    Ok(())
}

fn apply_slot(slot: &mut Dynamic, patch: &SlotPatch, index: usize) -> Result<(), ApplyError> {
    match patch {
        SlotPatch::Value(value) => {
            *slot = Dynamic::Value(value.clone());
            Ok(())
        }
        SlotPatch::Replace(dynamic) => {
            *slot = dynamic.clone();
            Ok(())
        }
        SlotPatch::Nested(nested) => match slot {
            Dynamic::Tree(tree) => apply_tree(tree, nested),
            _ => Err(ApplyError::KindMismatch { index }),
        },
        SlotPatch::List(list_patch) => match slot {
            Dynamic::List(list) => apply_list(list, &list_patch.ops),
            _ => Err(ApplyError::KindMismatch { index }),
        },
    }
}

pub(crate) fn apply_list(list: &mut RenderList, ops: &[ListOp]) -> Result<(), ApplyError> {
    for op in ops {
        match op {
            ListOp::Update { key, patch } => {
                let item = find_item(list, key)?;
                match patch {
                    ItemPatch::Replace(tree) => item.tree = tree.clone(),
                    ItemPatch::Sparse(nested) => apply_tree(&mut item.tree, nested)?,
                }
            }
            ListOp::Insert { key, after, tree } => {
                let position = match after {
                    Anchor::Head => 0,
                    Anchor::After(anchor) => {
                        item_position(list, anchor).ok_or_else(|| ApplyError::UnknownAnchor {
                            key: anchor.to_string(),
                        })? + 1
                    }
                };
                let item_key = match key {
                    ItemKey::Key(k) => Some(k.clone()),
                    ItemKey::Index(_) => None,
                };
                list.items.insert(
                    position,
                    RenderItem {
                        key: item_key,
                        tree: tree.clone(),
                    },
                );
            }
            ListOp::Remove { key } => {
                let position = item_position(list, key).ok_or_else(|| ApplyError::UnknownKey {
                    key: key.to_string(),
                })?;
                list.items.remove(position);
            }
            ListOp::Reorder { keys } => {
                if keys.len() != list.items.len() {
                    return Err(ApplyError::ReorderMismatch);
                }
                let mut pool: Vec<Option<RenderItem>> =
                    list.items.drain(..).map(Some).collect();
                let mut reordered = Vec::with_capacity(keys.len());
                for key in keys {
                    let position = pool
                        .iter()
                        .position(|entry| {
                            entry.as_ref().is_some_and(|item| item_matches(item, key, 0))
                        })
                        .ok_or(ApplyError::ReorderMismatch)?;
                    reordered.push(pool[position].take().expect("position found above"));
                }
                list.items = reordered;
            }
        }
    }
    Ok(())
}

fn find_item<'l>(list: &'l mut RenderList, key: &ItemKey) -> Result<&'l mut RenderItem, ApplyError> {
    match key {
        ItemKey::Index(index) => {
            list.items
                .get_mut(*index)
                .ok_or_else(|| ApplyError::UnknownKey {
                    key: index.to_string(),
                })
        }
        ItemKey::Key(wanted) => list
            .items
            .iter_mut()
            .find(|item| item.key.as_deref() == Some(wanted.as_str()))
            .ok_or_else(|| ApplyError::UnknownKey {
                key: wanted.clone(),
            }),
    }
}

fn item_position(list: &RenderList, key: &ItemKey) -> Option<usize> {
    list.items
        .iter()
        .enumerate()
        .position(|(index, item)| item_matches(item, key, index))
}

fn item_matches(item: &RenderItem, key: &ItemKey, position: usize) -> bool {
    match key {
        ItemKey::Key(wanted) => item.key.as_deref() == Some(wanted.as_str()),
        ItemKey::Index(index) => *index == position,
    }
}
