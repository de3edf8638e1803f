//! girouette - server-side live HTML templates.
//!
//! Render a template once, then stream minimal incremental updates to
//! connected browsers as server-side state changes. The engine compiles
//! templates into construct trees, hydrates them per data snapshot,
//! fingerprints and diffs the resulting render trees, and delivers
//! sparse, sequenced, resumable update envelopes per session - degrading
//! from tree patches through fragment replaces and chunking down to full
//! re-renders, but never failing an update cycle.
//!
//! Transports, HTTP routing, cookies, and the browser-side patcher live
//! with the host; the engine's surface is [`Tenant`]: create sessions,
//! feed it new data snapshots, hand the returned envelopes to your
//! transport in order.
//!
//! ```
//! use girouette::{EngineConfig, SigningKey, Template, Tenant, TenantId};
//! use serde_json::json;
//!
//! let tenant = Tenant::new(
//!     TenantId::new("acme"),
//!     SigningKey::generate(),
//!     EngineConfig::default(),
//! );
//! tenant.register_template(Template::compile("hello", "<p>Hello {{.Name}}</p>").unwrap());
//!
//! let created = tenant
//!     .create_session("hello", json!({"Name": "Ada"}))
//!     .unwrap();
//! let updates = tenant
//!     .update(&created.session, json!({"Name": "Bea"}))
//!     .unwrap();
//! assert_eq!(updates.len(), 1);
//! ```

mod actions;
mod cancel;
mod config;
mod error;
mod gate;
mod memory;
mod planner;
mod registry;
mod session;
mod store;
mod token;

pub use actions::Apply;
pub use cancel::CancelToken;
pub use config::{DeliveryConfig, EngineConfig, PlannerConfig, SessionConfig, TokenConfig};
pub use error::EngineError;
pub use planner::Degradation;
pub use registry::{SessionCreated, SessionMetrics, Tenant, TenantStats};
pub use store::{InMemorySnapshotStore, SessionSnapshot, SessionSnapshotStore, StoreError};
pub use token::SigningKey;

// The template and wire-level types hosts see on the engine surface.
pub use girouette_protocol::{
    Chunk, Control, Envelope, Payload, SessionId, SinkError, TenantId, TransportSink,
};
pub use girouette_template::{Template, TemplateSet};
