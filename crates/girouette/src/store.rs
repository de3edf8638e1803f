//! Optional session snapshot store.
//!
//! The engine needs no persistence; a host that wants sessions to survive
//! a restart can plug in a store. Only the coordinates are saved
//! (template name, fingerprint, sequence counter), never the render
//! tree: after a restart the session resumes its sequence numbering and
//! the client receives a resync.

use girouette_protocol::{SessionId, TenantId};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// What survives a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub tenant: TenantId,
    pub session: SessionId,
    pub template: String,
    pub fingerprint: u64,
    pub seq: u64,
}

#[derive(Error, Debug, Clone)]
#[error("session store failed: {0}")]
pub struct StoreError(pub String);

pub trait SessionSnapshotStore: Send + Sync {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StoreError>;
    fn load(
        &self,
        tenant: &TenantId,
        session: &SessionId,
    ) -> Result<Option<SessionSnapshot>, StoreError>;
    fn remove(&self, tenant: &TenantId, session: &SessionId) -> Result<(), StoreError>;
}

/// In-memory store, for tests and single-process hosts.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    snapshots: Mutex<HashMap<(TenantId, SessionId), SessionSnapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionSnapshotStore for InMemorySnapshotStore {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        self.snapshots
            .lock()
            .expect("snapshot store poisoned")
            .insert(
                (snapshot.tenant.clone(), snapshot.session.clone()),
                snapshot.clone(),
            );
        Ok(())
    }

    fn load(
        &self,
        tenant: &TenantId,
        session: &SessionId,
    ) -> Result<Option<SessionSnapshot>, StoreError> {
        Ok(self
            .snapshots
            .lock()
            .expect("snapshot store poisoned")
            .get(&(tenant.clone(), session.clone()))
            .cloned())
    }

    fn remove(&self, tenant: &TenantId, session: &SessionId) -> Result<(), StoreError> {
        self.snapshots
            .lock()
            .expect("snapshot store poisoned")
            .remove(&(tenant.clone(), session.clone()));
        Ok(())
    }
}
