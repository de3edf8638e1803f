//! Per-session state.
//!
//! A session owns the prior render tree and fingerprint, the delivery
//! sequencing state (out-queue, resume ring, ack bookkeeping), and the
//! degradation history feeding the planner's circuit breaker. All of it
//! is mutated only under the session's exclusive lock; the surrounding
//! slot carries the atomics the registry reads without locking.

use girouette_diff::MinimalUpdate;
use girouette_protocol::{Envelope, SessionId};
use girouette_template::Template;
use girouette_tree::{Fingerprint, RenderTree};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// Registry entry for one session. `last_access_us` and `est_memory` are
/// atomics so eviction scans never take session locks.
pub(crate) struct SessionSlot {
    pub(crate) state: Mutex<SessionState>,
    pub(crate) last_access_us: AtomicU64,
    pub(crate) est_memory: AtomicUsize,
}

impl SessionSlot {
    pub(crate) fn new(state: SessionState, now_us: u64) -> Self {
        Self {
            state: Mutex::new(state),
            last_access_us: AtomicU64::new(now_us),
            est_memory: AtomicUsize::new(0),
        }
    }

    pub(crate) fn touch(&self, now_us: u64) {
        self.last_access_us.store(now_us, Ordering::Relaxed);
    }
}

/// An envelope waiting for the host to take it. Tree updates keep their
/// pre-serialization form so keep-latest backpressure can merge them.
pub(crate) struct QueuedEnvelope {
    pub(crate) envelope: Envelope,
    pub(crate) update: Option<MinimalUpdate>,
    pub(crate) size: usize,
}

/// An envelope already handed to the host, retained for reconnect replay.
pub(crate) struct SentEnvelope {
    pub(crate) envelope: Envelope,
    pub(crate) sent_at: Instant,
    pub(crate) size: usize,
}

pub(crate) struct SessionState {
    pub(crate) id: SessionId,
    pub(crate) template: std::sync::Arc<Template>,

    /// Most recent render tree; released under memory pressure, which
    /// forces the next cycle to a full render.
    pub(crate) prior: Option<RenderTree>,
    pub(crate) prior_fingerprint: Option<Fingerprint>,
    /// Previous data snapshot, kept when `retain_snapshots` is on; action
    /// appliers mutate it.
    pub(crate) prior_data: Option<Value>,

    /// Last assigned sequence number. Only ever increases.
    pub(crate) seq: u64,
    pub(crate) last_acked: u64,
    pub(crate) out_queue: VecDeque<QueuedEnvelope>,
    pub(crate) ring: VecDeque<SentEnvelope>,
    /// Highest sequence ever pruned out of the ring: replay is possible
    /// only for acks at or above this floor.
    pub(crate) ring_floor: u64,

    /// Set when a structural update could not be buffered or the client
    /// acked an unknown sequence; the next emission is a full re-render.
    pub(crate) pending_resync: bool,

    /// Rolling record of recent cycles: `true` where the planner had to
    /// degrade. Feeds the circuit breaker.
    pub(crate) fallback_window: VecDeque<bool>,
    pub(crate) breaker_open: bool,

    pub(crate) created_at: Instant,
    pub(crate) bytes_sent: u64,
}

impl SessionState {
    pub(crate) fn new(id: SessionId, template: std::sync::Arc<Template>) -> Self {
        Self {
            id,
            template,
            prior: None,
            prior_fingerprint: None,
            prior_data: None,
            seq: 0,
            last_acked: 0,
            out_queue: VecDeque::new(),
            ring: VecDeque::new(),
            ring_floor: 0,
            pending_resync: false,
            fallback_window: VecDeque::new(),
            breaker_open: false,
            created_at: Instant::now(),
            bytes_sent: 0,
        }
    }

    /// Install the outcome of a completed update cycle. Called only after
    /// every fallible step finished: a cancelled cycle never gets here.
    pub(crate) fn commit_render(
        &mut self,
        tree: RenderTree,
        fingerprint: Fingerprint,
        data: Option<Value>,
    ) {
        self.prior = Some(tree);
        self.prior_fingerprint = Some(fingerprint);
        self.prior_data = data;
    }

    /// Record a cycle in the breaker window and update the breaker.
    pub(crate) fn record_fallback(&mut self, degraded: bool, window: usize, trip: f32, recover: f32) {
        self.fallback_window.push_back(degraded);
        while self.fallback_window.len() > window {
            self.fallback_window.pop_front();
        }
        if self.fallback_window.len() < window {
            return;
        }
        let rate = self.fallback_window.iter().filter(|d| **d).count() as f32 / window as f32;
        if !self.breaker_open && rate >= trip {
            tracing::warn!(session = %self.id, rate, "fallback breaker opened");
            self.breaker_open = true;
        } else if self.breaker_open && rate <= recover {
            tracing::info!(session = %self.id, rate, "fallback breaker closed");
            self.breaker_open = false;
        }
    }

    /// Estimated retained bytes: prior tree, retained snapshot, queue and
    /// ring buffers.
    pub(crate) fn estimated_memory(&self) -> usize {
        let tree = self.prior.as_ref().map(|t| t.estimated_size()).unwrap_or(0);
        let data = self
            .prior_data
            .as_ref()
            .map(crate::memory::estimate_snapshot)
            .unwrap_or(0);
        let queued: usize = self.out_queue.iter().map(|q| q.size).sum();
        let retained: usize = self.ring.iter().map(|s| s.size).sum();
        tree + data + queued + retained
    }
}
