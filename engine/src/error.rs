//! Engine-level error taxonomy.
//!
//! Every top-level operation fails with exactly one of these conditions.
//! Lock contention and node unavailability are ordinary outcomes the caller
//! retries later, not faults; storage failures are fatal for the current
//! operation since continuing would silently diverge from persisted truth.

use crate::lock::LockError;
use oxpool_client::ClientError;
use oxpool_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Another invocation holds the named lock — try again later.
    #[error("operation is locked by {0}")]
    Locked(String),

    /// The node cannot serve commands right now — retry with its own backoff.
    #[error("node is not ready")]
    NodeNotReady,

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("node command failed: {0}")]
    Client(ClientError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<ClientError> for EngineError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NodeNotReady => EngineError::NodeNotReady,
            other => EngineError::Client(other),
        }
    }
}

impl From<LockError> for EngineError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::AlreadyLocked(name) => EngineError::Locked(name),
            LockError::Store(e) => EngineError::Store(e),
        }
    }
}
