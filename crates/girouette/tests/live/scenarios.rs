//! End-to-end update scenarios, checked at the wire level.

use crate::harness::{is_heartbeat, mount, resync_tree, tenant, update_payload};
use serde_json::json;

/// The first envelope carries the complete render tree: all statics, all
/// dynamics.
#[test]
fn first_envelope_is_a_complete_tree() {
    let tenant = tenant("<p>Hello {{.Name}}</p>");
    let created = mount(&tenant, json!({"Name": "Ada"}));
    let tree = resync_tree(&created.envelope);
    assert_eq!(tree["s"], json!(["<p>Hello ", "</p>"]));
    assert_eq!(tree["0"], json!("Ada"));
}

/// Scalar change: a one-slot sparse payload, no statics.
#[test]
fn scalar_change_sends_one_sparse_slot() {
    let tenant = tenant("<p>Hello {{.Name}}</p>");
    let created = mount(&tenant, json!({"Name": "Ada"}));
    let envelopes = tenant
        .update(&created.session, json!({"Name": "Bea"}))
        .unwrap();
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].seq, 2);
    assert_eq!(update_payload(&envelopes[0]), &json!({"0": "Bea"}));
}

/// Conditional flip without an else branch empties the slot.
#[test]
fn conditional_flip_empties_the_slot() {
    let tenant = tenant("<div>{{if .Show}}<p>{{.Msg}}</p>{{end}}</div>");
    let created = mount(&tenant, json!({"Show": true, "Msg": "hi"}));
    let envelopes = tenant
        .update(&created.session, json!({"Show": false, "Msg": "hi"}))
        .unwrap();
    assert_eq!(update_payload(&envelopes[0]), &json!({"0": ""}));
}

/// Keyed list insert: one op, anchored after its new-list predecessor,
/// carrying the rendered item.
#[test]
fn keyed_insert_is_one_anchored_op() {
    let tenant = tenant("<ul>{{range .Items}}<li id=\"{{.ID}}\">{{.N}}</li>{{end}}</ul>");
    let created = mount(
        &tenant,
        json!({"Items": [{"ID": 1, "N": "a"}, {"ID": 2, "N": "b"}]}),
    );
    let envelopes = tenant
        .update(
            &created.session,
            json!({"Items": [{"ID": 1, "N": "a"}, {"ID": 3, "N": "c"}, {"ID": 2, "N": "b"}]}),
        )
        .unwrap();
    let wire = update_payload(&envelopes[0]);
    let ops = wire["0"]["ops"].as_array().unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0]["op"], "insert");
    assert_eq!(ops[0]["key"], "3");
    assert_eq!(ops[0]["after"], "1");
    assert_eq!(ops[0]["tree"]["1"], "c");
}

/// Keyless length change: the whole list subtree is replaced.
#[test]
fn keyless_length_change_replaces_the_list() {
    let tenant = tenant("<ul>{{range .Items}}<li>{{.N}}</li>{{end}}</ul>");
    let items = |n: usize| {
        json!({
            "Items": (0..n).map(|i| json!({"N": format!("n{i}")})).collect::<Vec<_>>()
        })
    };
    let created = mount(&tenant, items(3));
    let envelopes = tenant.update(&created.session, items(4)).unwrap();
    let wire = update_payload(&envelopes[0]);
    let replacement = wire["0"]["l"].as_array().unwrap();
    assert_eq!(replacement.len(), 4, "expected a full four-item list");
}

/// Identical data renders identically: the cycle short-circuits into a
/// heartbeat without running the differ.
#[test]
fn unchanged_data_heartbeats() {
    let tenant = tenant("<p>{{.A}}</p>");
    let created = mount(&tenant, json!({"A": "x"}));
    let envelopes = tenant.update(&created.session, json!({"A": "x"})).unwrap();
    assert_eq!(envelopes.len(), 1);
    assert!(is_heartbeat(&envelopes[0]));
    assert_eq!(envelopes[0].ack, Some(0), "heartbeats echo the last ack");
}

/// Data that differs only in fields the template never reads still
/// fingerprints equal.
#[test]
fn unread_fields_do_not_trigger_updates() {
    let tenant = tenant("<p>{{.A}}</p>");
    let created = mount(&tenant, json!({"A": "x", "Unread": 1}));
    let envelopes = tenant
        .update(&created.session, json!({"A": "x", "Unread": 2}))
        .unwrap();
    assert!(is_heartbeat(&envelopes[0]));
}

/// Hydration, fingerprinting, and diffing are deterministic: two
/// sessions fed the same snapshots produce byte-identical payloads.
#[test]
fn update_payloads_are_deterministic_across_sessions() {
    let tenant = tenant("<ul>{{range .Items}}<li id=\"{{.ID}}\">{{.N}}</li>{{end}}</ul>");
    let prior = json!({"Items": [{"ID": 1, "N": "a"}, {"ID": 2, "N": "b"}]});
    let new = json!({"Items": [{"ID": 2, "N": "B"}, {"ID": 1, "N": "a"}]});

    let one = mount(&tenant, prior.clone());
    let two = mount(&tenant, prior);
    let first = tenant.update(&one.session, new.clone()).unwrap();
    let second = tenant.update(&two.session, new).unwrap();
    assert_eq!(update_payload(&first[0]), update_payload(&second[0]));
}

/// Envelope sequences strictly increase across an update stream.
#[test]
fn sequences_strictly_increase() {
    let tenant = tenant("<p>{{.N}}</p>");
    let created = mount(&tenant, json!({"N": 0}));
    let mut last = created.envelope.seq;
    for i in 1..=10 {
        let envelopes = tenant.update(&created.session, json!({"N": i})).unwrap();
        for envelope in &envelopes {
            assert!(envelope.seq > last, "seq {} after {}", envelope.seq, last);
            last = envelope.seq;
        }
    }
}

/// A data snapshot missing a required field fails the cycle with the
/// data-shape kind and leaves the session usable.
#[test]
fn missing_field_surfaces_and_session_survives() {
    let tenant = tenant("<p>{{.Name}}</p>");
    let created = mount(&tenant, json!({"Name": "Ada"}));
    let err = tenant.update(&created.session, json!({})).unwrap_err();
    assert_eq!(err.kind(), "data-shape");

    let envelopes = tenant
        .update(&created.session, json!({"Name": "Bea"}))
        .unwrap();
    assert_eq!(update_payload(&envelopes[0]), &json!({"0": "Bea"}));
}
