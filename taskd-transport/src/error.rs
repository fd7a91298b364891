//! Transport-level errors (the `Transport` category of §7).

use thiserror::Error;

/// Errors from the MXP-backed RPC endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The local socket could not be bound.
    #[error("failed to bind transport: {0}")]
    Bind(String),

    /// A message could not be sent to the peer.
    #[error("failed to send message: {0}")]
    Send(String),

    /// No reply arrived within the caller's deadline.
    #[error("call timed out waiting for a reply")]
    Timeout,

    /// The waiter was dropped before a reply arrived (endpoint shutting down).
    #[error("call channel closed before a reply arrived")]
    Closed,

    /// The envelope could not be serialized or deserialized.
    #[error("envelope (de)serialization failed: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
