//! Action appliers.
//!
//! Hosts route client events into data mutations through a registry of
//! named actions bound at registration time - one trait method, no
//! runtime method discovery. The engine applies the mutation to the
//! session's retained snapshot and runs the normal update cycle on the
//! result.

use crate::error::EngineError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A named mutation over a session's data snapshot.
pub trait Apply: Send + Sync {
    /// Mutate `data` according to `action`, with the client-supplied
    /// `payload`. Returning an error aborts the cycle; the snapshot is
    /// discarded unchanged.
    fn apply(&self, action: &str, data: &mut Value, payload: &Value) -> Result<(), EngineError>;
}

impl<F> Apply for F
where
    F: Fn(&str, &mut Value, &Value) -> Result<(), EngineError> + Send + Sync,
{
    fn apply(&self, action: &str, data: &mut Value, payload: &Value) -> Result<(), EngineError> {
        self(action, data, payload)
    }
}

/// Maps action names to their appliers. Bound once at startup; lookups
/// at event time are name-only.
#[derive(Default)]
pub(crate) struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn Apply>>,
}

impl ActionRegistry {
    pub(crate) fn register(&mut self, action: impl Into<String>, handler: Arc<dyn Apply>) {
        self.handlers.insert(action.into(), handler);
    }

    pub(crate) fn get(&self, action: &str) -> Result<Arc<dyn Apply>, EngineError> {
        self.handlers
            .get(action)
            .cloned()
            .ok_or_else(|| EngineError::UnknownAction(action.to_owned()))
    }
}

#[cfg(test)]
impl std::fmt::Debug for dyn Apply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Apply")
    }
}
