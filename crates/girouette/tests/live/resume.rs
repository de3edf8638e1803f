//! Reconnect, replay, acks, and out-queue backpressure.

use crate::harness::{is_heartbeat, mount, resync_tree, tenant, tenant_with, update_payload};
use girouette::{DeliveryConfig, EngineConfig};
use serde_json::json;

fn counter_tenant() -> girouette::Tenant {
    tenant("<p>{{.N}}</p>")
}

/// Emit envelopes 1..=N and return the mounted session.
fn emit(tenant: &girouette::Tenant, upto: i64) -> girouette::SessionCreated {
    let created = mount(tenant, json!({"N": 0}));
    for i in 1..upto {
        tenant.update(&created.session, json!({"N": i})).unwrap();
    }
    created
}

/// Reconnect inside the window replays the missed envelopes in order.
#[test]
fn reconnect_inside_window_replays_in_order() {
    let tenant = counter_tenant();
    // Seq 1 (mount) through 10.
    let created = emit(&tenant, 10);
    let replayed = tenant.on_reconnect(&created.session, 7).unwrap();
    let seqs: Vec<u64> = replayed.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![8, 9, 10]);
}

/// Reconnect past the window gets exactly one resync envelope with a
/// fresh sequence number.
#[test]
fn reconnect_outside_window_resyncs() {
    let config = EngineConfig {
        delivery: DeliveryConfig {
            resume_window_len: 5,
            ..DeliveryConfig::default()
        },
        ..EngineConfig::default()
    };
    let tenant = tenant_with("<p>{{.N}}</p>", config);
    // Seq 1..=10 emitted; the ring retains 6..=10.
    let created = emit(&tenant, 10);
    let envelopes = tenant.on_reconnect(&created.session, 2).unwrap();
    assert_eq!(envelopes.len(), 1, "exactly one resync");
    assert_eq!(envelopes[0].seq, 11, "resync takes the next sequence");
    let tree = resync_tree(&envelopes[0]);
    assert_eq!(tree["0"], json!("9"), "resync carries the current tree");
    assert_eq!(tenant.stats().resyncs, 1);
}

/// Reconnect with everything already acked replays nothing.
#[test]
fn reconnect_fully_acked_replays_nothing() {
    let tenant = counter_tenant();
    let created = emit(&tenant, 5);
    let replayed = tenant.on_reconnect(&created.session, 5).unwrap();
    assert!(replayed.is_empty(), "got {replayed:?}");
}

/// Acks prune the ring: a later reconnect below the acked point resyncs.
#[test]
fn acked_envelopes_leave_the_window() {
    let tenant = counter_tenant();
    let created = emit(&tenant, 8);
    tenant.on_ack(&created.session, 6).unwrap();
    // 1..=6 are released; reconnecting at 3 is now outside the window.
    let envelopes = tenant.on_reconnect(&created.session, 3).unwrap();
    assert_eq!(envelopes.len(), 1);
    assert!(envelopes[0].seq > 8);
    resync_tree(&envelopes[0]);
}

/// Acking a sequence that was never emitted answers with a resync and
/// the session continues.
#[test]
fn unknown_ack_triggers_resync() {
    let tenant = counter_tenant();
    let created = emit(&tenant, 3);
    let envelopes = tenant.on_ack(&created.session, 99).unwrap();
    assert_eq!(envelopes.len(), 1);
    resync_tree(&envelopes[0]);

    let next = tenant.update(&created.session, json!({"N": 42})).unwrap();
    assert_eq!(update_payload(&next[0]), &json!({"0": "42"}));
}

/// Keep-latest backpressure: when the out-queue is full, staged value
/// updates merge and only the newest value survives.
#[test]
fn full_queue_merges_value_updates() {
    let config = EngineConfig {
        delivery: DeliveryConfig {
            out_queue_limit: 2,
            ..DeliveryConfig::default()
        },
        ..EngineConfig::default()
    };
    let tenant = tenant_with("<p>{{.N}}</p>", config);
    let created = mount(&tenant, json!({"N": 0}));
    // Mount drained seq 1. Stage three cycles without draining: the
    // third overflows the queue and merges into the second.
    for i in 1..=3 {
        tenant.stage_update(&created.session, json!({"N": i})).unwrap();
    }
    let envelopes = tenant.take_outgoing(&created.session).unwrap();
    assert_eq!(envelopes.len(), 2, "queue stayed within its bound");
    assert_eq!(update_payload(&envelopes[0]), &json!({"0": "1"}));
    // The merged envelope keeps its sequence but carries the newest
    // value.
    assert_eq!(update_payload(&envelopes[1]), &json!({"0": "3"}));
    let seqs: Vec<u64> = envelopes.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![2, 3]);
}

/// A structural update that cannot be buffered is never dropped
/// silently: the session owes a resync and the next cycle delivers it.
#[test]
fn structural_overflow_forces_resync() {
    let config = EngineConfig {
        delivery: DeliveryConfig {
            out_queue_limit: 1,
            ..DeliveryConfig::default()
        },
        ..EngineConfig::default()
    };
    let tenant = tenant_with(
        "<ul>{{range .Items}}<li id=\"{{.ID}}\">{{.N}}</li>{{end}}</ul>",
        config,
    );
    let items = |ids: &[i64]| {
        json!({
            "Items": ids.iter().map(|i| json!({"ID": i, "N": format!("n{i}")})).collect::<Vec<_>>()
        })
    };
    let created = mount(&tenant, items(&[1]));
    // A heartbeat occupies the whole queue.
    tenant.stage_update(&created.session, items(&[1])).unwrap();
    // A structural insert arrives at a full queue: it cannot merge, so
    // it is withheld and the session flips to pending-resync.
    tenant
        .stage_update(&created.session, items(&[1, 2]))
        .unwrap();
    // The next cycle delivers the owed full tree (control frames are
    // exempt from the queue bound).
    tenant
        .stage_update(&created.session, items(&[1, 2, 3]))
        .unwrap();

    let drained = tenant.take_outgoing(&created.session).unwrap();
    assert_eq!(drained.len(), 2, "got {drained:?}");
    assert!(is_heartbeat(&drained[0]));
    let tree = resync_tree(&drained[1]);
    assert_eq!(
        tree["0"]["l"].as_array().unwrap().len(),
        3,
        "resync carries the current three-item list"
    );
    // No envelope ever carried the withheld insert ops.
    assert!(
        drained
            .iter()
            .all(|e| !matches!(&e.payload, girouette::Payload::Update(_))),
        "structural op leaked into the stream: {drained:?}"
    );
}
