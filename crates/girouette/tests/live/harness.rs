//! Shared fixtures for the engine behavior tests.

use girouette::{EngineConfig, Envelope, Payload, SessionCreated, SigningKey, Tenant, TenantId};
use girouette_template::Template;
use serde_json::Value;

/// A tenant with one registered template, ready to mount sessions.
pub fn tenant(template_source: &str) -> Tenant {
    tenant_with(template_source, EngineConfig::default())
}

pub fn tenant_with(template_source: &str, config: EngineConfig) -> Tenant {
    let tenant = Tenant::new(TenantId::new("test-tenant"), SigningKey::generate(), config);
    tenant.register_template(
        Template::compile("page", template_source).expect("test template compiles"),
    );
    tenant
}

/// Mount a session on `tenant` and sanity-check the initial envelope.
pub fn mount(tenant: &Tenant, data: Value) -> SessionCreated {
    let created = tenant
        .create_session("page", data)
        .expect("session mounts");
    assert_eq!(created.envelope.seq, 1, "first envelope takes seq 1");
    created
}

/// The tree carried by a resync frame, or a panic with context.
pub fn resync_tree(envelope: &Envelope) -> &Value {
    match &envelope.payload {
        Payload::Control(girouette::Control::Resync { tree }) => tree,
        other => panic!("expected resync frame, got {other:?}"),
    }
}

/// The sparse tree update carried by an envelope, or a panic.
pub fn update_payload(envelope: &Envelope) -> &Value {
    match &envelope.payload {
        Payload::Update(wire) => wire,
        other => panic!("expected tree update, got {other:?}"),
    }
}

pub fn is_heartbeat(envelope: &Envelope) -> bool {
    matches!(
        envelope.payload,
        Payload::Control(girouette::Control::Heartbeat)
    )
}
