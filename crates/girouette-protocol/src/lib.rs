//! Wire protocol types for the girouette live template engine.
//!
//! The engine communicates with connected browsers through versioned,
//! per-session-sequenced envelopes. The host's transport (WebSocket, SSE,
//! long-poll - outside this workspace) serializes envelopes as JSON and
//! must deliver them in the order the engine emits them.
//!
//! Envelope payloads come in three shapes:
//! - a **tree update**: a sparse or complete render tree object,
//! - a **chunk**: one numbered fragment of an oversized tree update,
//! - a **control** frame: `resync`, `heartbeat`, or `close`.
//!
//! The first envelope of a session is a `resync` control frame carrying
//! the complete render tree; a later resync is indistinguishable in shape
//! and replaces the client's cached statics.

mod envelope;
mod identity;

pub use envelope::{Chunk, Control, Envelope, Payload, now_rfc3339};
pub use identity::{SessionId, TenantId};

use thiserror::Error;

/// Protocol version carried in every envelope's `v` field.
pub const PROTOCOL_VERSION: &str = "1.0";

/// The transport seam: the engine hands envelopes to the host in order,
/// and the host's sink must forward them in that order.
pub trait TransportSink: Send + Sync {
    fn send(&self, session: &SessionId, envelope: &Envelope) -> Result<(), SinkError>;
}

/// A transport-side delivery failure, opaque to the engine.
#[derive(Error, Debug, Clone)]
#[error("transport send failed: {0}")]
pub struct SinkError(pub String);
