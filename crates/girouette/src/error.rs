//! Engine errors.
//!
//! Every error the engine surfaces carries a stable `kind()` identifier
//! so adapters can map it onto an HTTP status or a transport close reason
//! without matching on message strings. Token failures are deliberately
//! uniform: the engine never reveals which check rejected a token.

use girouette_diff::ApplyError;
use girouette_protocol::SessionId;
use girouette_template::{HydrateError, TemplateError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid signature, expiry, or tenant mismatch - indistinguishable
    /// by design.
    #[error("token rejected")]
    TokenRejected,

    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    #[error("unknown template {0:?}")]
    UnknownTemplate(String),

    #[error("unknown action {0:?}")]
    UnknownAction(String),

    #[error("no retained data snapshot for session")]
    NoSnapshot,

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Hydrate(#[from] HydrateError),

    #[error("operation cancelled")]
    Cancelled,

    /// A session invariant was violated; the session has been evicted.
    #[error("session state corrupted: {0}")]
    Corrupted(#[from] ApplyError),
}

impl EngineError {
    /// Stable error kind identifier.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::TokenRejected => "token",
            EngineError::UnknownSession(_) | EngineError::NoSnapshot => "session",
            EngineError::UnknownTemplate(_) | EngineError::Template(_) => "template",
            EngineError::UnknownAction(_) => "protocol",
            EngineError::Hydrate(_) => "data-shape",
            EngineError::Cancelled => "cancelled",
            EngineError::Corrupted(_) => "fatal",
        }
    }
}
