//! The delivery gate: sequencing, backpressure, and the resume window.
//!
//! Envelopes get their sequence numbers here and nowhere else. The
//! out-queue is bounded; when it fills, value-only updates merge into the
//! newest queued update (keep-latest), heartbeats drop, and a structural
//! update that cannot be buffered flips the session to pending-resync.
//! Drained envelopes move into the resume ring, bounded by count and age,
//! from which reconnects replay.

use crate::config::DeliveryConfig;
use crate::session::{QueuedEnvelope, SentEnvelope, SessionState};
use girouette_diff::MinimalUpdate;
use girouette_protocol::{Envelope, Payload};
use std::time::Instant;

/// What happened to an enqueued payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnqueueOutcome {
    /// Assigned a fresh sequence number and buffered.
    Queued(u64),
    /// Merged into the newest queued update under keep-latest.
    Merged,
    /// A heartbeat dropped because the queue is full.
    Dropped,
    /// A structural update could not be buffered; the session now owes
    /// the client a full re-render.
    PendingResync,
}

impl SessionState {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Enqueue a payload for delivery. `update` carries the
    /// pre-serialization form of tree updates so backpressure can merge
    /// them; control frames pass `None`.
    pub(crate) fn enqueue(
        &mut self,
        payload: Payload,
        update: Option<MinimalUpdate>,
        ack: Option<u64>,
        config: &DeliveryConfig,
    ) -> EnqueueOutcome {
        let full = self.out_queue.len() >= config.out_queue_limit;
        // Resync and close frames are exempt from the bound: they are
        // rare and exactly what a congested session needs next.
        let exempt = matches!(payload, Payload::Control(_)) && !payload.is_heartbeat();
        if full && !exempt {
            if payload.is_heartbeat() {
                return EnqueueOutcome::Dropped;
            }
            let Some(incoming) = update else {
                self.pending_resync = true;
                return EnqueueOutcome::PendingResync;
            };
            if incoming.is_value_only() {
                if let Some(queued) = self
                    .out_queue
                    .iter_mut()
                    .rev()
                    .find(|q| q.update.is_some())
                {
                    let older = queued.update.take().expect("checked above");
                    match older.merge(incoming) {
                        Ok(merged) => {
                            queued.envelope.payload = Payload::Update(merged.to_wire());
                            queued.size = queued.envelope.wire_size();
                            queued.update = Some(merged);
                            return EnqueueOutcome::Merged;
                        }
                        Err(_) => {
                            self.pending_resync = true;
                            return EnqueueOutcome::PendingResync;
                        }
                    }
                }
            }
            self.pending_resync = true;
            return EnqueueOutcome::PendingResync;
        }

        let seq = self.next_seq();
        let envelope = Envelope::new(seq, ack, payload);
        let size = envelope.wire_size();
        self.out_queue.push_back(QueuedEnvelope {
            envelope,
            update,
            size,
        });
        EnqueueOutcome::Queued(seq)
    }

    /// Hand every buffered envelope to the host, in sequence order, and
    /// retain them in the resume ring.
    pub(crate) fn drain(&mut self, config: &DeliveryConfig) -> Vec<Envelope> {
        let now = Instant::now();
        let mut out = Vec::with_capacity(self.out_queue.len());
        while let Some(queued) = self.out_queue.pop_front() {
            self.bytes_sent += queued.size as u64;
            self.ring.push_back(SentEnvelope {
                envelope: queued.envelope.clone(),
                sent_at: now,
                size: queued.size,
            });
            out.push(queued.envelope);
        }
        self.prune_ring(config);
        out
    }

    /// Drop ring entries outside the count/age window, whichever binds
    /// first.
    fn prune_ring(&mut self, config: &DeliveryConfig) {
        let age = config.resume_window_age();
        let now = Instant::now();
        while let Some(front) = self.ring.front() {
            let over_len = self.ring.len() > config.resume_window_len;
            let over_age = now.duration_since(front.sent_at) > age;
            if !over_len && !over_age {
                break;
            }
            let dropped = self.ring.pop_front().expect("front checked");
            self.ring_floor = self.ring_floor.max(dropped.envelope.seq);
        }
    }

    /// Record a client ack. Returns `false` when the ack names a sequence
    /// that was never emitted - the caller answers with a resync.
    pub(crate) fn record_ack(&mut self, seq: u64) -> bool {
        if seq > self.seq {
            return false;
        }
        self.last_acked = self.last_acked.max(seq);
        // Acked envelopes will never replay; release them.
        while self
            .ring
            .front()
            .is_some_and(|front| front.envelope.seq <= self.last_acked)
        {
            let dropped = self.ring.pop_front().expect("front checked");
            self.ring_floor = self.ring_floor.max(dropped.envelope.seq);
        }
        true
    }

    /// Replay for a reconnect at `last_acked`. `None` means the window no
    /// longer covers the gap and the caller must resync.
    pub(crate) fn replay_from(
        &mut self,
        last_acked: u64,
        config: &DeliveryConfig,
    ) -> Option<Vec<Envelope>> {
        if last_acked > self.seq {
            return None;
        }
        // Anything still queued is part of what the reconnecting client
        // is owed; move it into the ring first.
        let _ = self.drain(config);
        if last_acked < self.ring_floor {
            return None;
        }
        self.last_acked = self.last_acked.max(last_acked);
        Some(
            self.ring
                .iter()
                .filter(|sent| sent.envelope.seq > last_acked)
                .map(|sent| sent.envelope.clone())
                .collect(),
        )
    }
}
