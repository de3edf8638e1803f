//! Render tree differ for the girouette live template engine.
//!
//! Compares two render trees of the same template and produces a
//! [`MinimalUpdate`], a sparse, canonical description of what changed:
//! scalar slot writes, nested sparse patches, keyed list operations
//! (update / insert / remove / reorder), and full subtree replaces where
//! structure changed. Applying the update to the prior tree reproduces
//! the new tree byte for byte.
//!
//! The differ is pure and deterministic: no choice in the output depends
//! on map iteration order, and ordering always follows list order.

mod apply;
mod diff;
mod merge;
mod update;
mod wire;

pub use apply::{ApplyError, apply};
pub use diff::diff;
pub use merge::MergeError;
pub use update::{
    Anchor, ItemKey, ItemPatch, ListOp, ListPatch, MinimalUpdate, SlotPatch, TreePatch,
};
