//! Session lifecycle: tokens, actions, cancellation, close, sweep, and
//! restart revival.

use crate::harness::{is_heartbeat, mount, resync_tree, tenant, tenant_with, update_payload};
use girouette::{
    CancelToken, Control, EngineConfig, Envelope, InMemorySnapshotStore, Payload, SessionConfig,
    SessionId, SessionSnapshotStore, SigningKey, SinkError, Template, Tenant, TenantId,
    TransportSink,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

/// A recording sink, standing in for the host's transport.
#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(SessionId, u64)>>,
}

impl TransportSink for RecordingSink {
    fn send(&self, session: &SessionId, envelope: &Envelope) -> Result<(), SinkError> {
        self.sent
            .lock()
            .map_err(|e| SinkError(e.to_string()))?
            .push((session.clone(), envelope.seq));
        Ok(())
    }
}

/// Envelopes forwarded through a transport sink in the order the engine
/// returns them arrive in strict sequence order.
#[test]
fn envelopes_flow_through_a_transport_sink_in_order() {
    let tenant = tenant("<p>{{.N}}</p>");
    let sink = RecordingSink::default();
    let created = mount(&tenant, json!({"N": 0}));
    sink.send(&created.session, &created.envelope).unwrap();
    for i in 1..=5 {
        for envelope in tenant.update(&created.session, json!({"N": i})).unwrap() {
            sink.send(&created.session, &envelope).unwrap();
        }
    }
    let sent = sink.sent.lock().unwrap();
    let seqs: Vec<u64> = sent.iter().map(|(_, seq)| *seq).collect();
    assert_eq!(seqs, (1..=6).collect::<Vec<u64>>());
}

/// Resolving the issued token finds the session.
#[test]
fn token_resolves_to_its_session() -> eyre::Result<()> {
    let tenant = tenant("<p>{{.N}}</p>");
    let created = mount(&tenant, json!({"N": 1}));
    assert_eq!(tenant.resolve(&created.token)?, created.session);
    Ok(())
}

/// Close flushes the queue, emits the terminal frame, and frees state.
#[test]
fn close_emits_terminal_frame_and_frees_state() {
    let tenant = tenant("<p>{{.N}}</p>");
    let created = mount(&tenant, json!({"N": 1}));
    tenant.stage_update(&created.session, json!({"N": 2})).unwrap();

    let envelopes = tenant.close(&created.session).unwrap();
    assert_eq!(envelopes.len(), 2, "queued update then close frame");
    assert_eq!(update_payload(&envelopes[0]), &json!({"0": "2"}));
    assert!(matches!(
        envelopes[1].payload,
        Payload::Control(Control::Close)
    ));
    assert!(envelopes[1].seq > envelopes[0].seq);

    let err = tenant.update(&created.session, json!({"N": 3})).unwrap_err();
    assert_eq!(err.kind(), "session");
    assert_eq!(tenant.session_count(), 0);
}

/// A cancelled cycle leaves no trace: no envelope, no state mutation.
#[test]
fn cancelled_update_leaves_state_untouched() {
    let tenant = tenant("<p>{{.N}}</p>");
    let created = mount(&tenant, json!({"N": 1}));

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = tenant
        .update_with_cancel(&created.session, json!({"N": 2}), &cancel)
        .unwrap_err();
    assert_eq!(err.kind(), "cancelled");

    // The next cycle diffs against the original tree and sequence
    // numbering has no gap.
    let envelopes = tenant.update(&created.session, json!({"N": 2})).unwrap();
    assert_eq!(envelopes[0].seq, 2);
    assert_eq!(update_payload(&envelopes[0]), &json!({"0": "2"}));
}

/// Idle sessions are swept once they outlive the TTL.
#[test]
fn idle_sessions_are_swept() {
    let config = EngineConfig {
        sessions: SessionConfig {
            idle_ttl_secs: 0,
            ..SessionConfig::default()
        },
        ..EngineConfig::default()
    };
    let tenant = tenant_with("<p>{{.N}}</p>", config);
    let created = mount(&tenant, json!({"N": 1}));
    std::thread::sleep(std::time::Duration::from_millis(5));
    assert_eq!(tenant.sweep_idle(), 1);
    assert!(tenant.update(&created.session, json!({"N": 2})).is_err());
}

/// Registered actions mutate the retained snapshot and run the normal
/// update cycle; unknown actions are a typed error.
#[test]
fn actions_mutate_the_snapshot() {
    let tenant = tenant("<p>{{.Count}}</p>");
    tenant.register_action(
        "increment",
        Arc::new(|_action: &str, data: &mut Value, payload: &Value| {
            let by = payload.as_i64().unwrap_or(1);
            let count = data["Count"].as_i64().unwrap_or(0);
            data["Count"] = json!(count + by);
            Ok(())
        }),
    );
    let created = mount(&tenant, json!({"Count": 1}));

    let envelopes = tenant
        .apply_action(&created.session, "increment", &json!(4))
        .unwrap();
    assert_eq!(update_payload(&envelopes[0]), &json!({"0": "5"}));

    // The mutated snapshot is retained: the next action composes.
    let envelopes = tenant
        .apply_action(&created.session, "increment", &Value::Null)
        .unwrap();
    assert_eq!(update_payload(&envelopes[0]), &json!({"0": "6"}));

    let err = tenant
        .apply_action(&created.session, "decrement", &Value::Null)
        .unwrap_err();
    assert_eq!(err.kind(), "protocol");
}

/// With snapshot retention off, actions have nothing to mutate.
#[test]
fn actions_require_retained_snapshots() {
    let config = EngineConfig {
        sessions: SessionConfig {
            retain_snapshots: false,
            ..SessionConfig::default()
        },
        ..EngineConfig::default()
    };
    let tenant = tenant_with("<p>{{.Count}}</p>", config);
    tenant.register_action(
        "noop",
        Arc::new(|_: &str, _: &mut Value, _: &Value| Ok(())),
    );
    let created = mount(&tenant, json!({"Count": 1}));
    let err = tenant
        .apply_action(&created.session, "noop", &Value::Null)
        .unwrap_err();
    assert_eq!(err.kind(), "session");
}

/// A session survives a process restart through the snapshot store: the
/// token still resolves, sequence numbering continues, and the client
/// gets a resync.
#[test_log::test]
fn snapshot_store_revives_sessions_across_restart() -> eyre::Result<()> {
    let store: Arc<dyn SessionSnapshotStore> = Arc::new(InMemorySnapshotStore::new());
    let key = SigningKey::from_bytes([3u8; 32]);
    let template = || Template::compile("page", "<p>{{.N}}</p>").unwrap();

    let (token, session, last_seq) = {
        let tenant = Tenant::new(
            TenantId::new("acme"),
            key.clone(),
            EngineConfig::default(),
        )
        .with_snapshot_store(store.clone());
        tenant.register_template(template());
        let created = tenant.create_session("page", json!({"N": 1}))?;
        let envelopes = tenant.update(&created.session, json!({"N": 2}))?;
        (created.token, created.session, envelopes[0].seq)
    };

    // "Restart": a fresh tenant over the same store and key.
    let revived = Tenant::new(TenantId::new("acme"), key, EngineConfig::default())
        .with_snapshot_store(store);
    revived.register_template(template());

    assert_eq!(revived.resolve(&token)?, session);
    let envelopes = revived.update(&session, json!({"N": 3}))?;
    assert_eq!(envelopes.len(), 1);
    let tree = resync_tree(&envelopes[0]);
    assert_eq!(tree["0"], json!("3"));
    assert!(
        envelopes[0].seq > last_seq,
        "sequence numbering continues after revival"
    );
    Ok(())
}

/// Without a store, an unknown session is simply unknown.
#[test]
fn unknown_sessions_stay_unknown_without_a_store() {
    let a = tenant("<p>{{.N}}</p>");
    let created = mount(&a, json!({"N": 1}));
    let b = tenant_with("<p>{{.N}}</p>", EngineConfig::default());
    // Same template, same tenant id string, but no shared registry or
    // store: the token fails on the key, not on a session lookup.
    assert!(b.resolve(&created.token).is_err());
}

/// Delivery accounting is visible through tenant stats and per-session
/// metrics.
#[test]
fn stats_reflect_activity() {
    let tenant = tenant("<p>{{.N}}</p>");
    let created = mount(&tenant, json!({"N": 1}));
    tenant.update(&created.session, json!({"N": 1})).unwrap();
    tenant.update(&created.session, json!({"N": 2})).unwrap();
    let stats = tenant.stats();
    assert_eq!(stats.sessions, 1);
    assert!(stats.memory_used > 0);
    assert_eq!(stats.resyncs, 0);

    let metrics = tenant.session_metrics(&created.session).unwrap();
    assert_eq!(metrics.seq, 3, "mount plus heartbeat plus one update");
    assert!(metrics.bytes_sent > 0);
    assert!(metrics.estimated_memory > 0);

    // Heartbeats do not disturb the update stream.
    let envelopes = tenant.update(&created.session, json!({"N": 2})).unwrap();
    assert!(is_heartbeat(&envelopes[0]));
    assert_eq!(tenant.session_metrics(&created.session).unwrap().seq, 4);
}
