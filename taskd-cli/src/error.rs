//! Top-level error type composing every crate boundary the CLI touches.

use taskd_config::ConfigError;
use taskd_master::MasterError;
use taskd_agent::RuntimeError;
use taskd_transport::TransportError;
use thiserror::Error;

/// Everything that can go wrong running the `taskd` binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// A flag or address string failed local validation before any dial was attempted.
    #[error("{0}")]
    InvalidArgument(String),
    /// The remote Master or Agent reported a failure for an otherwise well-formed request.
    #[error("{0}")]
    Remote(String),
    /// Configuration could not be loaded or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The RPC transport failed to bind, dial, or complete a call.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The Master failed to start or run.
    #[error(transparent)]
    Master(#[from] MasterError),
    /// The Agent runtime failed to start or run.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Result alias used throughout the CLI.
pub type CliResult<T> = Result<T, CliError>;
