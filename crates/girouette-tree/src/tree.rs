//! Render tree node types.

use crate::Fingerprint;

/// A hydrated template node: `statics.len() == dynamics.len() + 1`, with
/// `statics[i]` preceding slot `i` and `statics.last()` closing the node.
///
/// Two trees with equal statics share a structural identity; the client
/// caches statics under that identity and sparse updates omit them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTree {
    pub statics: Vec<String>,
    pub dynamics: Vec<Dynamic>,
}

/// The content of one dynamic slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dynamic {
    /// A scalar, already HTML-escaped for its lexical context.
    Value(String),
    /// A nested render tree (conditional body, `with` body, sub-template).
    Tree(RenderTree),
    /// An ordered list of repeated sub-trees (a `range` body).
    List(RenderList),
}

/// An ordered list of repeated sub-trees.
///
/// When the range declared a key path every item carries its stable key and
/// the differ matches items by key. Without keys items are positional and a
/// length change degrades to a whole-list replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderList {
    pub keyed: bool,
    pub items: Vec<RenderItem>,
}

/// One item of a [`RenderList`]. `key` is `Some` iff the list is keyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderItem {
    pub key: Option<String>,
    pub tree: RenderTree,
}

impl RenderTree {
    /// An empty node: one empty static, no dynamics.
    pub fn empty() -> Self {
        Self {
            statics: vec![String::new()],
            dynamics: Vec::new(),
        }
    }

    /// Whether `other` has the same structural identity (equal statics).
    pub fn same_shape(&self, other: &RenderTree) -> bool {
        self.statics == other.statics
    }

    /// Content hash of the whole tree. See [`Fingerprint`].
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }

    /// Render the tree to its full HTML string.
    ///
    /// Scalar slots were escaped at hydration time, so this is a plain
    /// interleaving walk.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        for (i, dynamic) in self.dynamics.iter().enumerate() {
            out.push_str(&self.statics[i]);
            match dynamic {
                Dynamic::Value(v) => out.push_str(v),
                Dynamic::Tree(t) => t.write_html(out),
                Dynamic::List(list) => {
                    for item in &list.items {
                        item.tree.write_html(out);
                    }
                }
            }
        }
        if let Some(last) = self.statics.last() {
            out.push_str(last);
        }
    }

    /// Rough heap footprint in bytes, used for the tenant memory budget
    /// and as the eviction tie-break.
    pub fn estimated_size(&self) -> usize {
        let mut size = size_of::<RenderTree>();
        size += self.statics.iter().map(|s| s.len()).sum::<usize>();
        for dynamic in &self.dynamics {
            size += size_of::<Dynamic>();
            match dynamic {
                Dynamic::Value(v) => size += v.len(),
                Dynamic::Tree(t) => size += t.estimated_size(),
                Dynamic::List(list) => {
                    for item in &list.items {
                        size += size_of::<RenderItem>();
                        size += item.key.as_ref().map(|k| k.len()).unwrap_or(0);
                        size += item.tree.estimated_size();
                    }
                }
            }
        }
        size
    }
}
