//! Render tree model for the girouette live template engine.
//!
//! A render tree is the result of hydrating a compiled template with a data
//! snapshot: an ordered sequence of constant HTML fragments (the *statics*)
//! framing indexed *dynamic* slots. Statics are fixed per structural shape
//! and cacheable client-side; dynamics hold escaped scalars, nested trees,
//! or ordered lists of keyed sub-trees.
//!
//! This crate is a shared-types leaf: the template engine produces render
//! trees, the differ compares them, and the protocol layer serializes them
//! onto the wire.

mod fingerprint;
mod tree;
mod wire;

pub use fingerprint::Fingerprint;
pub use tree::{Dynamic, RenderItem, RenderList, RenderTree};
