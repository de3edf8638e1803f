//! The diff algorithm.

use crate::update::{
    Anchor, ItemKey, ItemPatch, ListOp, ListPatch, MinimalUpdate, SlotPatch, TreePatch,
};
use girouette_tree::{Dynamic, RenderItem, RenderList, RenderTree};
use std::collections::{HashMap, HashSet};

/// Compute the minimal update turning `prior` into `new`.
///
/// Pure and canonical: the same pair of trees always yields the same
/// update, and applying the result to `prior` reproduces `new` byte for
/// byte.
pub fn diff(prior: &RenderTree, new: &RenderTree) -> MinimalUpdate {
    if !prior.same_shape(new) {
        return MinimalUpdate::Replace(new.clone());
    }
    let patch = diff_dynamics(prior, new);
    if patch.slots.is_empty() {
        MinimalUpdate::Unchanged
    } else {
        MinimalUpdate::Patch(patch)
    }
}

fn diff_dynamics(prior: &RenderTree, new: &RenderTree) -> TreePatch {
    let mut patch = TreePatch::default();
    for (index, (old, current)) in prior.dynamics.iter().zip(&new.dynamics).enumerate() {
        if let Some(slot) = diff_slot(old, current) {
            patch.slots.insert(index, slot);
        }
    }
    patch
}

fn diff_slot(prior: &Dynamic, new: &Dynamic) -> Option<SlotPatch> {
    match (prior, new) {
        (Dynamic::Value(old), Dynamic::Value(current)) => {
            (old != current).then(|| SlotPatch::Value(current.clone()))
        }
        (Dynamic::Tree(old), Dynamic::Tree(current)) => {
            if !old.same_shape(current) {
                return Some(SlotPatch::Replace(Dynamic::Tree(current.clone())));
            }
            let nested = diff_dynamics(old, current);
            (!nested.slots.is_empty()).then(|| SlotPatch::Nested(nested))
        }
        (Dynamic::List(old), Dynamic::List(current)) => diff_list(old, current),
        // Slot type changed (scalar ↔ tree ↔ list): replace, never an
        // in-place patch.
        _ => Some(SlotPatch::Replace(new.clone())),
    }
}

fn diff_list(prior: &RenderList, new: &RenderList) -> Option<SlotPatch> {
    if prior.keyed != new.keyed {
        return Some(SlotPatch::Replace(Dynamic::List(new.clone())));
    }
    if prior.keyed {
        diff_keyed(prior, new)
    } else {
        diff_positional(prior, new)
    }
}

/// Keyed list diff: match by key, anchor inserts on their new-list
/// predecessor, and close with a single reorder when the residual order
/// still disagrees.
fn diff_keyed(prior: &RenderList, new: &RenderList) -> Option<SlotPatch> {
    debug_assert!(unique_keys(prior) && unique_keys(new), "duplicate list keys");

    let prior_index: HashMap<&str, &RenderItem> = prior
        .items
        .iter()
        .map(|item| (item.key.as_deref().unwrap_or_default(), item))
        .collect();
    let new_keys: HashSet<&str> = new
        .items
        .iter()
        .map(|item| item.key.as_deref().unwrap_or_default())
        .collect();

    let mut ops = Vec::new();

    // Removes, in prior order.
    let mut residual: Vec<&str> = Vec::with_capacity(new.items.len());
    for item in &prior.items {
        let key = item.key.as_deref().unwrap_or_default();
        if new_keys.contains(key) {
            residual.push(key);
        } else {
            ops.push(ListOp::Remove {
                key: ItemKey::Key(key.to_owned()),
            });
        }
    }

    // Inserts and updates, in new order.
    let mut previous: Option<&str> = None;
    for item in &new.items {
        let key = item.key.as_deref().unwrap_or_default();
        match prior_index.get(key) {
            None => {
                let after = match previous {
                    None => Anchor::Head,
                    Some(prev) => Anchor::After(ItemKey::Key(prev.to_owned())),
                };
                let position = match &after {
                    Anchor::Head => 0,
                    Anchor::After(ItemKey::Key(prev)) => {
                        residual.iter().position(|k| k == prev).map(|p| p + 1).unwrap_or(residual.len())
                    }
                    Anchor::After(ItemKey::Index(_)) => unreachable!("keyed anchor"),
                };
                residual.insert(position, key);
                ops.push(ListOp::Insert {
                    key: ItemKey::Key(key.to_owned()),
                    after,
                    tree: item.tree.clone(),
                });
            }
            Some(old) => {
                if let Some(patch) = diff_item(&old.tree, &item.tree) {
                    ops.push(ListOp::Update {
                        key: ItemKey::Key(key.to_owned()),
                        patch,
                    });
                }
            }
        }
        previous = Some(key);
    }

    // Reorder only when inserts/removes do not already explain the new
    // order.
    let new_order: Vec<&str> = new
        .items
        .iter()
        .map(|item| item.key.as_deref().unwrap_or_default())
        .collect();
    if residual != new_order {
        ops.push(ListOp::Reorder {
            keys: new_order
                .iter()
                .map(|k| ItemKey::Key((*k).to_owned()))
                .collect(),
        });
    }

    (!ops.is_empty()).then(|| SlotPatch::List(ListPatch { ops }))
}

/// Keyless list diff: positional when lengths match, whole-list replace
/// otherwise (the stability invariant is lost).
fn diff_positional(prior: &RenderList, new: &RenderList) -> Option<SlotPatch> {
    if prior.items.len() != new.items.len() {
        return Some(SlotPatch::Replace(Dynamic::List(new.clone())));
    }
    let mut ops = Vec::new();
    for (index, (old, current)) in prior.items.iter().zip(&new.items).enumerate() {
        if let Some(patch) = diff_item(&old.tree, &current.tree) {
            ops.push(ListOp::Update {
                key: ItemKey::Index(index),
                patch,
            });
        }
    }
    (!ops.is_empty()).then(|| SlotPatch::List(ListPatch { ops }))
}

fn diff_item(prior: &RenderTree, new: &RenderTree) -> Option<ItemPatch> {
    if !prior.same_shape(new) {
        return Some(ItemPatch::Replace(new.clone()));
    }
    let patch = diff_dynamics(prior, new);
    (!patch.slots.is_empty()).then(|| ItemPatch::Sparse(patch))
}

fn unique_keys(list: &RenderList) -> bool {
    let mut seen = HashSet::new();
    list.items
        .iter()
        .all(|item| seen.insert(item.key.as_deref().unwrap_or_default()))
}
