//! Planner degradation, the fallback breaker, and resource pressure.

use crate::harness::{mount, resync_tree, tenant_with, update_payload};
use girouette::{DeliveryConfig, EngineConfig, PlannerConfig, SessionConfig};
use serde_json::{Value, json};

const LIST_TEMPLATE: &str = "<ul>{{range .Items}}<li id=\"{{.ID}}\">{{.N}}</li>{{end}}</ul>";

fn items(n: usize, label: &str) -> Value {
    json!({
        "Items": (0..n)
            .map(|i| json!({"ID": i, "N": format!("{label}{i}")}))
            .collect::<Vec<_>>()
    })
}

/// An oversized subtree degrades to a re-rendered fragment and the
/// degradation is recorded.
#[test_log::test]
fn oversized_subtree_degrades_and_counts() {
    let config = EngineConfig {
        planner: PlannerConfig {
            max_value_updates_per_subtree: 4,
            ..PlannerConfig::default()
        },
        ..EngineConfig::default()
    };
    let tenant = tenant_with(LIST_TEMPLATE, config);
    let created = mount(&tenant, items(30, "a"));
    let envelopes = tenant.update(&created.session, items(30, "b")).unwrap();
    let wire = update_payload(&envelopes[0]);
    assert!(
        wire["0"]["l"].is_array(),
        "expected a fragment replace, got {wire}"
    );
    assert_eq!(tenant.stats().fragment_replaces, 1);
}

/// Sustained degradation opens the breaker; once open, every update is a
/// full tree until the rate recovers, then sparse patches resume.
#[test_log::test]
fn fallback_breaker_opens_and_recovers() {
    let config = EngineConfig {
        planner: PlannerConfig {
            max_value_updates_per_subtree: 2,
            breaker_window: 4,
            breaker_trip_rate: 0.5,
            breaker_recover_rate: 0.25,
            ..PlannerConfig::default()
        },
        ..EngineConfig::default()
    };
    let tenant = tenant_with(LIST_TEMPLATE, config);
    let created = mount(&tenant, items(20, "a"));

    // Four degrading cycles fill the window and trip the breaker.
    for round in 0..4 {
        tenant
            .update(&created.session, items(20, &format!("r{round}-")))
            .unwrap();
    }

    // Breaker open: even a tiny change ships as a full tree (statics
    // included).
    let mut small = items(20, "r3-");
    small["Items"][0]["N"] = json!("tweaked");
    let envelopes = tenant.update(&created.session, small.clone()).unwrap();
    let wire = update_payload(&envelopes[0]);
    assert!(wire.get("s").is_some(), "expected a full tree, got {wire}");

    // Clean cycles drain the window below the recovery rate...
    for i in 0..4 {
        small["Items"][0]["N"] = json!(format!("calm{i}"));
        tenant.update(&created.session, small.clone()).unwrap();
    }
    // ...after which updates are sparse patches again.
    small["Items"][0]["N"] = json!("after");
    let envelopes = tenant.update(&created.session, small).unwrap();
    let wire = update_payload(&envelopes[0]);
    assert!(
        wire.get("s").is_none(),
        "expected a sparse patch after recovery, got {wire}"
    );
}

/// Over the payload ceiling, updates ship as ordered chunks.
#[test_log::test]
fn oversized_payload_ships_chunked() {
    let source: String = (0..40).map(|i| format!("<p>{{{{.F{i}}}}}</p>")).collect();
    let wide = |label: &str| {
        json!(
            (0..40)
                .map(|i| (format!("F{i}"), json!(format!("{label}-{i}-{}", "x".repeat(16)))))
                .collect::<serde_json::Map<_, _>>()
        )
    };
    let config = EngineConfig {
        planner: PlannerConfig {
            payload_ceiling: 400,
            chunk_size: 200,
            ..PlannerConfig::default()
        },
        ..EngineConfig::default()
    };
    let tenant = tenant_with(&source, config);
    let created = mount(&tenant, wide("a"));
    let envelopes = tenant.update(&created.session, wide("b")).unwrap();
    assert!(envelopes.len() > 1, "expected chunks, got {envelopes:?}");
    let mut seqs = Vec::new();
    for envelope in &envelopes {
        let girouette::Payload::Chunk(chunk) = &envelope.payload else {
            panic!("expected chunk payload");
        };
        assert_eq!(chunk.n as usize, envelopes.len());
        seqs.push(envelope.seq);
    }
    assert!(seqs.windows(2).all(|w| w[0] < w[1]), "chunks in order");
    assert!(tenant.stats().chunked_updates >= 1);
}

/// Exceeding the session cap evicts the least recently used session.
#[test_log::test]
fn session_cap_evicts_least_recently_used() {
    let config = EngineConfig {
        sessions: SessionConfig {
            max_sessions: 2,
            ..SessionConfig::default()
        },
        ..EngineConfig::default()
    };
    let tenant = tenant_with("<p>{{.N}}</p>", config);
    let first = mount(&tenant, json!({"N": 1}));
    let second = mount(&tenant, json!({"N": 2}));
    // Touch the first so the second is the LRU victim.
    tenant.update(&first.session, json!({"N": 10})).unwrap();
    let third = mount(&tenant, json!({"N": 3}));

    assert_eq!(tenant.session_count(), 2);
    assert_eq!(tenant.stats().evictions, 1);
    let err = tenant.update(&second.session, json!({"N": 20})).unwrap_err();
    assert_eq!(err.kind(), "session");
    // Survivors keep working.
    tenant.update(&first.session, json!({"N": 11})).unwrap();
    tenant.update(&third.session, json!({"N": 30})).unwrap();
}

/// Over the memory budget, a session sheds its retained tree and the
/// next update arrives as a full re-render.
#[test_log::test]
fn memory_pressure_sheds_state_and_resyncs() {
    let config = EngineConfig {
        sessions: SessionConfig {
            max_sessions: 1,
            memory_budget: 64,
            ..SessionConfig::default()
        },
        delivery: DeliveryConfig::default(),
        ..EngineConfig::default()
    };
    let tenant = tenant_with("<p>{{.N}}</p>", config);
    let created = mount(&tenant, json!({"N": "x"}));
    // The first update notices the pressure and sheds the prior tree.
    tenant.update(&created.session, json!({"N": "y"})).unwrap();
    // With no prior to diff against, the next cycle is a full render.
    let envelopes = tenant.update(&created.session, json!({"N": "z"})).unwrap();
    let tree = resync_tree(&envelopes[0]);
    assert_eq!(tree["0"], json!("z"));
}
