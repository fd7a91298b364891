//! Shared error definitions for control-plane primitives.

use thiserror::Error;

/// Result alias used throughout the control-plane crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating shared primitive types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// An agent name was empty or blank.
    #[error("agent name must not be empty")]
    EmptyAgentName,

    /// An agent address did not parse as `host:port`.
    #[error("invalid agent address `{value}`: {reason}")]
    InvalidAddress {
        /// The offending address string.
        value: String,
        /// Human-readable reason for rejection.
        reason: String,
    },
}
