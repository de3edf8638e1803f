//! Envelope and payload frames.

use crate::PROTOCOL_VERSION;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A versioned, sequenced wire frame.
///
/// `seq` strictly increases within a session, including across resyncs
/// and the terminal close frame. `ack` echoes the client's last
/// acknowledged sequence on control frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub v: String,
    pub seq: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
    pub ts: String,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(seq: u64, ack: Option<u64>, payload: Payload) -> Self {
        Self {
            v: PROTOCOL_VERSION.to_owned(),
            seq,
            ack,
            ts: now_rfc3339(),
            payload,
        }
    }

    /// Serialized wire size in bytes.
    pub fn wire_size(&self) -> usize {
        serde_json::to_string(self).map(|s| s.len()).unwrap_or(0)
    }
}

/// Envelope payload. Untagged on the wire: control frames carry `kind`,
/// chunks carry `id`/`i`/`n`/`part`, anything else is a tree update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Control(Control),
    Chunk(Chunk),
    /// A sparse or complete render tree object, produced by the differ
    /// or a full hydration.
    Update(Value),
}

impl Payload {
    /// Structural updates and resyncs must never be dropped by
    /// backpressure; heartbeats may.
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Payload::Control(Control::Heartbeat))
    }
}

/// One numbered fragment of a tree update that exceeded the payload
/// ceiling. The client reassembles parts `0..n-1` under `id` and applies
/// the merged update atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub i: u32,
    pub n: u32,
    pub part: Value,
}

/// Control frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Control {
    /// A complete render tree replacing everything the client holds for
    /// this session. Also the first frame a session ever receives.
    Resync { tree: Value },
    /// Liveness frame; also the no-change ack echo.
    Heartbeat,
    /// Terminal frame: the session is gone.
    Close,
}

/// RFC3339 timestamp for the `ts` field, millisecond precision, UTC.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
