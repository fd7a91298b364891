//! Dispatch error taxonomy.

use thiserror::Error;

/// Result alias for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors surfaced by command dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request was malformed (empty command, unknown user).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The subprocess could not be spawned at all.
    #[error("failed to start subprocess: {0}")]
    SpawnFailed(String),

    /// Privilege drop to the requested user failed.
    #[error("privilege drop to user `{user}` failed: {reason}")]
    PrivilegeDrop {
        /// The requested user identity.
        user: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The chunk sink rejected a chunk (e.g. the receiver was dropped).
    #[error("output sink closed: {0}")]
    SinkClosed(String),
}
