//! Engine configuration.
//!
//! Every knob has a documented default; hosts deserialize overrides from
//! whatever config file they carry.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineConfig {
    pub planner: PlannerConfig,
    pub delivery: DeliveryConfig,
    pub sessions: SessionConfig,
    pub tokens: TokenConfig,
}

/// Caps and degradation thresholds for the update planner.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PlannerConfig {
    /// Scalar slot writes one subtree patch may carry before it degrades
    /// to a fragment replace.
    pub max_value_updates_per_subtree: usize,

    /// Scalar slot writes one envelope may carry before the whole update
    /// degrades to a full tree.
    pub max_value_updates_per_envelope: usize,

    /// List operations one subtree patch may carry before it degrades to
    /// a fragment replace.
    pub max_list_ops_per_subtree: usize,

    /// Serialized payload bytes above which an update is chunked.
    pub payload_ceiling: usize,

    /// Target serialized bytes per chunk.
    pub chunk_size: usize,

    /// Cycles considered by the fallback-rate circuit breaker.
    pub breaker_window: usize,

    /// Fallback rate over the window that opens the breaker (forcing
    /// full re-renders).
    pub breaker_trip_rate: f32,

    /// Fallback rate at or below which an open breaker closes again.
    pub breaker_recover_rate: f32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_value_updates_per_subtree: 64,
            max_value_updates_per_envelope: 512,
            max_list_ops_per_subtree: 128,
            payload_ceiling: 256 * 1024,
            chunk_size: 64 * 1024,
            breaker_window: 20,
            breaker_trip_rate: 0.5,
            breaker_recover_rate: 0.25,
        }
    }
}

/// Sequencing, backpressure, and resume behavior of the delivery gate.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct DeliveryConfig {
    /// Undelivered envelopes buffered per session before keep-latest
    /// merging kicks in.
    pub out_queue_limit: usize,

    /// Sent envelopes retained for reconnect replay.
    pub resume_window_len: usize,

    /// Maximum age of a retained envelope; count and age bind together,
    /// whichever first.
    pub resume_window_age_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            out_queue_limit: 32,
            resume_window_len: 100,
            resume_window_age_secs: 30,
        }
    }
}

impl DeliveryConfig {
    pub fn resume_window_age(&self) -> Duration {
        Duration::from_secs(self.resume_window_age_secs)
    }
}

/// Per-tenant session bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SessionConfig {
    /// Hard cap on live sessions per tenant; exceeding it evicts the
    /// least recently accessed.
    pub max_sessions: usize,

    /// Aggregate estimated bytes of retained session state per tenant.
    pub memory_budget: usize,

    /// Sessions idle longer than this are swept.
    pub idle_ttl_secs: u64,

    /// Keep the previous data snapshot on the session. Required for
    /// action appliers; costs memory.
    pub retain_snapshots: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10_000,
            memory_budget: 256 * 1024 * 1024,
            idle_ttl_secs: 3600,
            retain_snapshots: true,
        }
    }
}

impl SessionConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }
}

/// Token issue and rotation policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TokenConfig {
    /// Token lifetime from issue.
    pub ttl_secs: u64,

    /// How long a rotated-out signing key keeps verifying.
    pub rotation_grace_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 7 * 24 * 3600,
            rotation_grace_secs: 3600,
        }
    }
}

impl TokenConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn rotation_grace(&self) -> Duration {
        Duration::from_secs(self.rotation_grace_secs)
    }
}
