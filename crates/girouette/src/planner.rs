//! The update planner.
//!
//! Turns a raw minimal update into deliverable payloads, degrading rather
//! than failing, in order: tree-patch when everything fits; fragment
//! replace for each oversized subtree; chunking when the serialized
//! envelope still exceeds the ceiling; full re-render while the session's
//! fallback breaker is open (the caller handles that last step, since it
//! owns the breaker).

use crate::config::PlannerConfig;
use girouette_diff::{MinimalUpdate, SlotPatch};
use girouette_protocol::{Chunk, Payload};
use girouette_tree::RenderTree;
use rapidhash::fast::RapidHasher;
use serde_json::Value;
use std::hash::Hasher;

/// Which degradation the planner chose, most severe wins for accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Degradation {
    None,
    /// One or more oversized subtrees were replaced by re-rendered
    /// fragments.
    FragmentReplace,
    /// The serialized update was split into sequenced chunks.
    Chunked,
    /// The whole update was replaced by a full tree.
    FullRender,
}

pub(crate) enum Plan {
    /// Nothing changed; the caller emits a heartbeat.
    Heartbeat,
    Deliver {
        payloads: Vec<(Payload, Option<MinimalUpdate>)>,
        degradation: Degradation,
    },
}

/// Plan delivery of `update`, with `new_tree` available for fragment
/// re-renders. Never fails.
pub(crate) fn plan(update: MinimalUpdate, new_tree: &RenderTree, config: &PlannerConfig) -> Plan {
    if update.is_empty() {
        return Plan::Heartbeat;
    }

    let mut degradation = Degradation::None;
    let mut update = update;

    // Per-subtree caps: an oversized top-level slot patch becomes a
    // re-rendered fragment, dropping its sparse data.
    if let MinimalUpdate::Patch(patch) = &mut update {
        for (&index, slot) in patch.slots.iter_mut() {
            let oversized = slot.value_update_count() > config.max_value_updates_per_subtree
                || slot.list_op_count() > config.max_list_ops_per_subtree;
            if oversized {
                let Some(fragment) = new_tree.dynamics.get(index) else {
                    continue;
                };
                tracing::debug!(slot = index, "subtree over caps, replacing fragment");
                *slot = SlotPatch::Replace(fragment.clone());
                degradation = degradation.max(Degradation::FragmentReplace);
            }
        }
    }

    // Per-envelope cap: past this, shipping the whole tree is smaller
    // than the patch would be.
    if update.value_update_count() > config.max_value_updates_per_envelope {
        tracing::debug!("update over envelope cap, sending full tree");
        update = MinimalUpdate::Replace(new_tree.clone());
        degradation = Degradation::FullRender;
    }

    let wire = update.to_wire();
    let serialized = wire.to_string();
    if serialized.len() <= config.payload_ceiling {
        return Plan::Deliver {
            payloads: vec![(Payload::Update(wire), Some(update))],
            degradation,
        };
    }

    // Still over the ceiling: split at top-level keys into sequenced
    // chunks the client reassembles and applies atomically.
    let parts = split_object(&wire, config.chunk_size);
    let n = parts.len() as u32;
    let id = chunk_id(&serialized);
    tracing::debug!(chunks = n, "update over payload ceiling, chunking");
    let payloads = parts
        .into_iter()
        .enumerate()
        .map(|(i, part)| {
            (
                Payload::Chunk(Chunk {
                    id: id.clone(),
                    i: i as u32,
                    n,
                    part,
                }),
                None,
            )
        })
        .collect();
    Plan::Deliver {
        payloads,
        degradation: degradation.max(Degradation::Chunked),
    }
}

/// Greedily group a JSON object's entries so each group serializes to at
/// most `target` bytes. A single entry larger than the target ships alone
/// in an oversized part; a non-object value cannot be split and becomes
/// one part.
fn split_object(wire: &Value, target: usize) -> Vec<Value> {
    let Value::Object(map) = wire else {
        return vec![wire.clone()];
    };
    let mut parts = Vec::new();
    let mut current = serde_json::Map::new();
    let mut current_size = 2usize;
    for (key, value) in map {
        // Entry cost: "key":value plus separators.
        let entry_size = key.len() + value.to_string().len() + 4;
        if !current.is_empty() && current_size + entry_size > target {
            parts.push(Value::Object(std::mem::take(&mut current)));
            current_size = 2;
        }
        current.insert(key.clone(), value.clone());
        current_size += entry_size;
    }
    if !current.is_empty() {
        parts.push(Value::Object(current));
    }
    if parts.is_empty() {
        parts.push(Value::Object(serde_json::Map::new()));
    }
    parts
}

/// Chunk set identifier: content hash of the serialized update.
fn chunk_id(serialized: &str) -> String {
    let mut hasher = RapidHasher::default();
    hasher.write(serialized.as_bytes());
    format!("c{:016x}", hasher.finish())
}
