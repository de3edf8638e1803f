//! The tenant: session registry, token boundary, and update cycle.
//!
//! A [`Tenant`] is the isolation unit. It owns its templates, its signing
//! keys, its action registry, and a map of live sessions. Registry
//! lookups are lock-free reads; everything inside one session happens
//! under that session's exclusive lock.
//!
//! The update cycle is hydrate → fingerprint → diff → plan → enqueue,
//! with cancellation checks between the stages and state committed only
//! once every fallible stage has passed.

use crate::actions::{ActionRegistry, Apply};
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::gate::EnqueueOutcome;
use crate::planner::{self, Degradation, Plan};
use crate::session::{SessionSlot, SessionState};
use crate::store::{SessionSnapshot, SessionSnapshotStore};
use crate::token::{SigningKey, TokenService, random_session_id};
use dashmap::DashMap;
use girouette_diff::{MinimalUpdate, diff};
use girouette_protocol::{Control, Envelope, Payload, SessionId, TenantId};
use girouette_template::Template;
use girouette_tree::RenderTree;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// The result of opening a new session: its identity, the signed token
/// the client presents on reconnect, and the first envelope (a complete
/// render tree).
pub struct SessionCreated {
    pub session: SessionId,
    pub token: String,
    pub envelope: Envelope,
}

/// Point-in-time view of one session's delivery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionMetrics {
    pub seq: u64,
    pub last_acked: u64,
    pub bytes_sent: u64,
    pub age: Duration,
    pub estimated_memory: usize,
}

/// Point-in-time tenant counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TenantStats {
    pub sessions: usize,
    pub memory_used: usize,
    pub fragment_replaces: u64,
    pub chunked_updates: u64,
    pub full_renders: u64,
    pub resyncs: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct Counters {
    fragment_replaces: AtomicU64,
    chunked_updates: AtomicU64,
    full_renders: AtomicU64,
    resyncs: AtomicU64,
    evictions: AtomicU64,
}

pub struct Tenant {
    id: TenantId,
    config: EngineConfig,
    templates: RwLock<HashMap<String, Arc<Template>>>,
    tokens: RwLock<TokenService>,
    actions: RwLock<ActionRegistry>,
    sessions: DashMap<SessionId, Arc<SessionSlot>>,
    store: Option<Arc<dyn SessionSnapshotStore>>,
    /// Zero point for the monotonic clock behind LRU bookkeeping.
    epoch: Instant,
    counters: Counters,
}

impl Tenant {
    pub fn new(id: TenantId, key: SigningKey, config: EngineConfig) -> Self {
        let tokens = TokenService::new(id.clone(), key, config.tokens.ttl());
        Self {
            id,
            config,
            templates: RwLock::new(HashMap::new()),
            tokens: RwLock::new(tokens),
            actions: RwLock::new(ActionRegistry::default()),
            sessions: DashMap::new(),
            store: None,
            epoch: Instant::now(),
            counters: Counters::default(),
        }
    }

    /// Plug in a snapshot store so sessions survive restarts.
    pub fn with_snapshot_store(mut self, store: Arc<dyn SessionSnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn id(&self) -> &TenantId {
        &self.id
    }

    pub fn register_template(&self, template: Template) {
        let name = template.name().to_owned();
        self.templates
            .write()
            .expect("template registry poisoned")
            .insert(name, Arc::new(template));
    }

    pub fn register_action(&self, action: impl Into<String>, handler: Arc<dyn Apply>) {
        self.actions
            .write()
            .expect("action registry poisoned")
            .register(action, handler);
    }

    /// Install a new signing key; the old one keeps verifying for the
    /// configured grace interval.
    pub fn rotate_key(&self, new: SigningKey) {
        tracing::info!(tenant = %self.id, "rotating signing key");
        self.tokens
            .write()
            .expect("token service poisoned")
            .rotate(new, self.config.tokens.rotation_grace());
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn memory_used(&self) -> usize {
        self.sessions
            .iter()
            .map(|entry| entry.value().est_memory.load(Ordering::Relaxed))
            .sum()
    }

    pub fn stats(&self) -> TenantStats {
        TenantStats {
            sessions: self.session_count(),
            memory_used: self.memory_used(),
            fragment_replaces: self.counters.fragment_replaces.load(Ordering::Relaxed),
            chunked_updates: self.counters.chunked_updates.load(Ordering::Relaxed),
            full_renders: self.counters.full_renders.load(Ordering::Relaxed),
            resyncs: self.counters.resyncs.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn session_metrics(&self, session: &SessionId) -> Result<SessionMetrics, EngineError> {
        let slot = self.slot(session)?;
        let state = slot.state.lock().expect("session lock poisoned");
        Ok(SessionMetrics {
            seq: state.seq,
            last_acked: state.last_acked,
            bytes_sent: state.bytes_sent,
            age: state.created_at.elapsed(),
            estimated_memory: state.estimated_memory(),
        })
    }

    fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    fn template(&self, name: &str) -> Result<Arc<Template>, EngineError> {
        self.templates
            .read()
            .expect("template registry poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownTemplate(name.to_owned()))
    }

    fn slot(&self, session: &SessionId) -> Result<Arc<SessionSlot>, EngineError> {
        self.sessions
            .get(session)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::UnknownSession(session.clone()))
    }

    /// Open a session: first hydration, signed token, and the initial
    /// envelope carrying the complete render tree.
    pub fn create_session(
        &self,
        template: &str,
        data: Value,
    ) -> Result<SessionCreated, EngineError> {
        let template = self.template(template)?;
        let session = random_session_id();
        let mut state = SessionState::new(session.clone(), template);

        let tree = state.template.hydrate(&data)?;
        let fingerprint = tree.fingerprint();
        state.enqueue(
            Payload::Control(Control::Resync {
                tree: tree.to_wire(),
            }),
            None,
            None,
            &self.config.delivery,
        );
        let mut envelopes = state.drain(&self.config.delivery);
        let envelope = envelopes.pop().expect("initial envelope was enqueued");
        state.commit_render(tree, fingerprint, self.retained(data));

        let estimated = state.estimated_memory();
        let slot = Arc::new(SessionSlot::new(state, self.now_us()));
        slot.est_memory.store(estimated, Ordering::Relaxed);

        self.evict_for_pressure(Some(&session), 1);
        self.sessions.insert(session.clone(), slot);
        self.persist(&session);
        let token = self
            .tokens
            .read()
            .expect("token service poisoned")
            .issue(&session);
        tracing::info!(tenant = %self.id, session = %session, "session created");

        Ok(SessionCreated {
            session,
            token,
            envelope,
        })
    }

    /// Verify a token and return the live session it names. A session
    /// missing from the registry is revived from the snapshot store when
    /// one is attached; the revived session owes its client a resync.
    pub fn resolve(&self, token: &str) -> Result<SessionId, EngineError> {
        let session = self
            .tokens
            .read()
            .expect("token service poisoned")
            .verify(token)?;
        if let Some(slot) = self.sessions.get(&session) {
            slot.touch(self.now_us());
            return Ok(session);
        }
        self.revive(&session)?;
        Ok(session)
    }

    fn revive(&self, session: &SessionId) -> Result<(), EngineError> {
        let Some(store) = &self.store else {
            return Err(EngineError::UnknownSession(session.clone()));
        };
        let snapshot = store
            .load(&self.id, session)
            .ok()
            .flatten()
            .ok_or_else(|| EngineError::UnknownSession(session.clone()))?;
        let template = self.template(&snapshot.template)?;
        let mut state = SessionState::new(session.clone(), template);
        state.seq = snapshot.seq;
        state.pending_resync = true;
        self.sessions
            .insert(session.clone(), Arc::new(SessionSlot::new(state, self.now_us())));
        tracing::info!(tenant = %self.id, session = %session, "session revived from snapshot");
        Ok(())
    }

    /// Run the update cycle for a new data snapshot and return the
    /// envelopes to send, in order.
    pub fn update(&self, session: &SessionId, data: Value) -> Result<Vec<Envelope>, EngineError> {
        self.update_with_cancel(session, data, &CancelToken::new())
    }

    pub fn update_with_cancel(
        &self,
        session: &SessionId,
        data: Value,
        cancel: &CancelToken,
    ) -> Result<Vec<Envelope>, EngineError> {
        let slot = self.slot(session)?;
        slot.touch(self.now_us());
        let mut state = slot.state.lock().expect("session lock poisoned");
        self.run_cycle(&mut state, data, cancel)?;
        Ok(self.finish(session, &slot, &mut state))
    }

    /// Run the update cycle without draining the out-queue. Hosts that
    /// pace their transport stage cycles and take envelopes when the
    /// transport is ready; the bounded queue applies keep-latest merging
    /// in between.
    pub fn stage_update(&self, session: &SessionId, data: Value) -> Result<(), EngineError> {
        let slot = self.slot(session)?;
        slot.touch(self.now_us());
        let mut state = slot.state.lock().expect("session lock poisoned");
        self.run_cycle(&mut state, data, &CancelToken::new())?;
        slot.est_memory
            .store(state.estimated_memory(), Ordering::Relaxed);
        self.persist_state(session, &state);
        Ok(())
    }

    /// Drain everything staged for this session, in sequence order.
    pub fn take_outgoing(&self, session: &SessionId) -> Result<Vec<Envelope>, EngineError> {
        let slot = self.slot(session)?;
        let mut state = slot.state.lock().expect("session lock poisoned");
        Ok(self.finish(session, &slot, &mut state))
    }

    /// Route a named client action into a data mutation, then run the
    /// update cycle on the mutated snapshot.
    pub fn apply_action(
        &self,
        session: &SessionId,
        action: &str,
        payload: &Value,
    ) -> Result<Vec<Envelope>, EngineError> {
        let handler = self
            .actions
            .read()
            .expect("action registry poisoned")
            .get(action)?;
        let slot = self.slot(session)?;
        slot.touch(self.now_us());
        let mut state = slot.state.lock().expect("session lock poisoned");
        let mut data = state.prior_data.clone().ok_or(EngineError::NoSnapshot)?;
        handler.apply(action, &mut data, payload)?;
        self.run_cycle(&mut state, data, &CancelToken::new())?;
        Ok(self.finish(session, &slot, &mut state))
    }

    /// Record a client ack. Acking a sequence that was never emitted is a
    /// protocol slip; the client gets a resync and the session continues.
    pub fn on_ack(&self, session: &SessionId, seq: u64) -> Result<Vec<Envelope>, EngineError> {
        let slot = self.slot(session)?;
        slot.touch(self.now_us());
        let mut state = slot.state.lock().expect("session lock poisoned");
        if state.record_ack(seq) {
            return Ok(Vec::new());
        }
        tracing::warn!(session = %session, seq, "ack for unknown sequence");
        self.enqueue_resync(&mut state);
        Ok(self.finish(session, &slot, &mut state))
    }

    /// Serve a reconnect: replay everything after `last_acked` when the
    /// resume window still covers it, otherwise exactly one resync
    /// envelope.
    pub fn on_reconnect(
        &self,
        session: &SessionId,
        last_acked: u64,
    ) -> Result<Vec<Envelope>, EngineError> {
        let slot = self.slot(session)?;
        slot.touch(self.now_us());
        let mut state = slot.state.lock().expect("session lock poisoned");
        if let Some(envelopes) = state.replay_from(last_acked, &self.config.delivery) {
            tracing::debug!(session = %session, last_acked, n = envelopes.len(), "replaying window");
            return Ok(envelopes);
        }
        tracing::debug!(session = %session, last_acked, "reconnect outside window");
        self.enqueue_resync(&mut state);
        Ok(self.finish(session, &slot, &mut state))
    }

    /// Close a session: flush what is queued, emit the terminal frame,
    /// release state.
    pub fn close(&self, session: &SessionId) -> Result<Vec<Envelope>, EngineError> {
        let (_, slot) = self
            .sessions
            .remove(session)
            .ok_or_else(|| EngineError::UnknownSession(session.clone()))?;
        let mut state = slot.state.lock().expect("session lock poisoned");
        let last_acked = state.last_acked;
        state.enqueue(
            Payload::Control(Control::Close),
            None,
            Some(last_acked),
            &self.config.delivery,
        );
        let envelopes = state.drain(&self.config.delivery);
        if let Some(store) = &self.store {
            let _ = store.remove(&self.id, session);
        }
        tracing::info!(tenant = %self.id, session = %session, "session closed");
        Ok(envelopes)
    }

    /// Evict sessions idle past the TTL. Returns how many were dropped.
    pub fn sweep_idle(&self) -> usize {
        let ttl_us = self.config.sessions.idle_ttl().as_micros() as u64;
        let now = self.now_us();
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| {
                now.saturating_sub(entry.value().last_access_us.load(Ordering::Relaxed)) > ttl_us
            })
            .map(|entry| entry.key().clone())
            .collect();
        for session in &expired {
            self.drop_session(session);
            tracing::info!(session = %session, "idle session swept");
        }
        expired.len()
    }

    // ------------------------------------------------------------------
    // Update cycle internals
    // ------------------------------------------------------------------

    fn retained(&self, data: Value) -> Option<Value> {
        self.config.sessions.retain_snapshots.then_some(data)
    }

    fn run_cycle(
        &self,
        state: &mut SessionState,
        data: Value,
        cancel: &CancelToken,
    ) -> Result<(), EngineError> {
        cancel.check()?;
        let new_tree = state.template.hydrate(&data)?;
        let fingerprint = new_tree.fingerprint();

        // Fingerprint short-circuit: no diff, just an ack echo.
        if state.prior_fingerprint == Some(fingerprint) && !state.pending_resync {
            cancel.check()?;
            state.enqueue(
                Payload::Control(Control::Heartbeat),
                None,
                Some(state.last_acked),
                &self.config.delivery,
            );
            state.commit_render(new_tree, fingerprint, self.retained(data));
            return Ok(());
        }

        // Sessions that owe the client a full tree: a resync is pending,
        // or the prior tree was shed under memory pressure.
        cancel.check()?;
        let update = match state.prior.as_ref() {
            Some(prior) if !state.pending_resync => Some(diff(prior, &new_tree)),
            _ => None,
        };
        let Some(update) = update else {
            self.enqueue_resync_with(state, &new_tree);
            state.commit_render(new_tree, fingerprint, self.retained(data));
            return Ok(());
        };
        let plan = planner::plan(update, &new_tree, &self.config.planner);
        // Last gate before mutation: a cancelled cycle leaves no trace.
        cancel.check()?;

        match plan {
            Plan::Heartbeat => {
                state.enqueue(
                    Payload::Control(Control::Heartbeat),
                    None,
                    Some(state.last_acked),
                    &self.config.delivery,
                );
            }
            Plan::Deliver {
                payloads,
                degradation,
            } => {
                let planner_config = &self.config.planner;
                if state.breaker_open {
                    // Breaker open: the client gets a full tree no
                    // matter what the planner found.
                    self.counters.full_renders.fetch_add(1, Ordering::Relaxed);
                    let full = MinimalUpdate::Replace(new_tree.clone());
                    state.enqueue(
                        Payload::Update(full.to_wire()),
                        Some(full),
                        None,
                        &self.config.delivery,
                    );
                } else {
                    self.count_degradation(degradation);
                    for (payload, update) in payloads {
                        let outcome = state.enqueue(payload, update, None, &self.config.delivery);
                        if outcome == EnqueueOutcome::PendingResync {
                            tracing::warn!(
                                session = %state.id,
                                "out-queue full, structural update withheld until resync"
                            );
                        }
                    }
                }
                state.record_fallback(
                    degradation != Degradation::None,
                    planner_config.breaker_window,
                    planner_config.breaker_trip_rate,
                    planner_config.breaker_recover_rate,
                );
            }
        }

        state.commit_render(new_tree, fingerprint, self.retained(data));
        Ok(())
    }

    fn count_degradation(&self, degradation: Degradation) {
        match degradation {
            Degradation::None => {}
            Degradation::FragmentReplace => {
                self.counters.fragment_replaces.fetch_add(1, Ordering::Relaxed);
            }
            Degradation::Chunked => {
                self.counters.chunked_updates.fetch_add(1, Ordering::Relaxed);
            }
            Degradation::FullRender => {
                self.counters.full_renders.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Queue a resync from the session's current tree, or mark one as
    /// pending when no tree is retained.
    fn enqueue_resync(&self, state: &mut SessionState) {
        match state.prior.clone() {
            Some(tree) => self.enqueue_resync_with(state, &tree),
            None => state.pending_resync = true,
        }
    }

    fn enqueue_resync_with(&self, state: &mut SessionState, tree: &RenderTree) {
        self.counters.resyncs.fetch_add(1, Ordering::Relaxed);
        state.pending_resync = false;
        state.enqueue(
            Payload::Control(Control::Resync {
                tree: tree.to_wire(),
            }),
            None,
            Some(state.last_acked),
            &self.config.delivery,
        );
    }

    /// Post-cycle bookkeeping shared by every mutating entry point:
    /// drain, persist, re-estimate memory, shed and evict under
    /// pressure.
    fn finish(
        &self,
        session: &SessionId,
        slot: &SessionSlot,
        state: &mut SessionState,
    ) -> Vec<Envelope> {
        let envelopes = state.drain(&self.config.delivery);

        // Memory pressure: release the retained tree and snapshot; the
        // next cycle for this session re-renders in full.
        if self.memory_used() > self.config.sessions.memory_budget {
            tracing::warn!(session = %session, "memory pressure: shedding retained state");
            state.prior = None;
            state.prior_data = None;
        }
        slot.est_memory
            .store(state.estimated_memory(), Ordering::Relaxed);
        self.persist_state(session, state);
        self.evict_for_pressure(Some(session), 0);
        envelopes
    }

    fn persist(&self, session: &SessionId) {
        if self.store.is_none() {
            return;
        }
        if let Ok(slot) = self.slot(session) {
            let state = slot.state.lock().expect("session lock poisoned");
            self.persist_state(session, &state);
        }
    }

    fn persist_state(&self, session: &SessionId, state: &SessionState) {
        let Some(store) = &self.store else { return };
        let snapshot = SessionSnapshot {
            tenant: self.id.clone(),
            session: session.clone(),
            template: state.template.name().to_owned(),
            fingerprint: state
                .prior_fingerprint
                .map(|f| f.as_u64())
                .unwrap_or_default(),
            seq: state.seq,
        };
        if let Err(error) = store.save(&snapshot) {
            tracing::warn!(session = %session, %error, "snapshot save failed");
        }
    }

    /// Enforce the session-count and memory bounds: evict least recently
    /// accessed first, largest estimated memory as the tie-break.
    /// `incoming` reserves room for sessions about to be inserted.
    fn evict_for_pressure(&self, except: Option<&SessionId>, incoming: usize) {
        loop {
            let over_count =
                self.sessions.len() + incoming > self.config.sessions.max_sessions;
            let over_memory = self.memory_used() > self.config.sessions.memory_budget;
            if !over_count && !over_memory {
                return;
            }
            let victim = self
                .sessions
                .iter()
                .filter(|entry| Some(entry.key()) != except)
                .map(|entry| {
                    (
                        entry.key().clone(),
                        entry.value().last_access_us.load(Ordering::Relaxed),
                        entry.value().est_memory.load(Ordering::Relaxed),
                    )
                })
                .min_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)));
            let Some((victim, _, _)) = victim else { return };
            tracing::warn!(session = %victim, "evicting session under pressure");
            self.drop_session(&victim);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn drop_session(&self, session: &SessionId) {
        self.sessions.remove(session);
        if let Some(store) = &self.store {
            let _ = store.remove(&self.id, session);
        }
    }
}
