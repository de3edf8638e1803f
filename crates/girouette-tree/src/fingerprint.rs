//! Content fingerprinting for render trees.
//!
//! A fingerprint is a rapidhash over a canonical, length-framed walk of the
//! tree. Equal fingerprints short-circuit the update cycle into a heartbeat
//! without running the differ. This is change detection, not a security
//! primitive.

use crate::{Dynamic, RenderTree};
use rapidhash::fast::RapidHasher;
use std::fmt;
use std::hash::Hasher;

/// Walk tags, so that e.g. a scalar `"ab"` and statics `["a", "b"]` cannot
/// produce the same byte stream.
const TAG_TREE: u8 = 1;
const TAG_VALUE: u8 = 2;
const TAG_NESTED: u8 = 3;
const TAG_LIST: u8 = 4;
const TAG_ITEM: u8 = 5;

/// A fixed-width content hash of a [`RenderTree`].
///
/// Equality implies the two trees serialize identically (up to hash
/// collision): every byte that serialization emits is fed to the hasher,
/// with a tag and a length frame per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub fn of(tree: &RenderTree) -> Self {
        let mut hasher = RapidHasher::default();
        hash_tree(&mut hasher, tree);
        Fingerprint(hasher.finish())
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

fn hash_tree(hasher: &mut RapidHasher, tree: &RenderTree) {
    hasher.write_u8(TAG_TREE);
    hasher.write_usize(tree.statics.len());
    for s in &tree.statics {
        hasher.write_usize(s.len());
        hasher.write(s.as_bytes());
    }
    for dynamic in &tree.dynamics {
        match dynamic {
            Dynamic::Value(v) => {
                hasher.write_u8(TAG_VALUE);
                hasher.write_usize(v.len());
                hasher.write(v.as_bytes());
            }
            Dynamic::Tree(t) => {
                hasher.write_u8(TAG_NESTED);
                hash_tree(hasher, t);
            }
            Dynamic::List(list) => {
                hasher.write_u8(TAG_LIST);
                hasher.write_u8(list.keyed as u8);
                hasher.write_usize(list.items.len());
                for item in &list.items {
                    hasher.write_u8(TAG_ITEM);
                    match &item.key {
                        Some(key) => {
                            hasher.write_usize(key.len());
                            hasher.write(key.as_bytes());
                        }
                        None => hasher.write_usize(usize::MAX),
                    }
                    hash_tree(hasher, &item.tree);
                }
            }
        }
    }
}
