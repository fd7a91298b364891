//! Agent runtime: binds the RPC listener, serves `RunCommand`/`ExecuteTask`/
//! `Shutdown`, and drives the Master reconnect loop alongside it.

#![warn(missing_docs, clippy::pedantic)]

mod lifecycle;
mod reconnect;
mod rpc;
mod sysinfo;

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use taskd_config::AgentConfig;
use taskd_primitives::AgentName;
use taskd_transport::{Endpoint, TransportError};
use thiserror::Error;
use tracing::info;

pub use lifecycle::{AgentState, Lifecycle, LifecycleError, LifecycleEvent, LifecycleResult};
pub use reconnect::{next_backoff, ConnectionState, ShutdownSignal};
pub use rpc::{AgentRpcHandler, DispatchGate, DispatchGateError, DispatchGateResult};

/// Owns an agent's lifecycle, RPC listener, and Master reconnect loop.
pub struct AgentRuntime {
    config: AgentConfig,
    lifecycle: Lifecycle,
    gate: DispatchGate,
    shutdown: ShutdownSignal,
}

impl AgentRuntime {
    /// Builds a runtime from resolved configuration. Starts in [`AgentState::Init`].
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidName`] if `config.agent_name` is not a
    /// valid [`AgentName`].
    pub fn new(config: AgentConfig) -> RuntimeResult<Self> {
        let agent_name = AgentName::new(&config.agent_name)
            .map_err(|err| RuntimeError::InvalidName(err.to_string()))?;
        let max_concurrent_dispatches = NonZeroU32::new(config.max_concurrent_dispatches)
            .ok_or_else(|| RuntimeError::InvalidName("max_concurrent_dispatches must be positive".to_string()))?;
        Ok(Self {
            config,
            lifecycle: Lifecycle::new(agent_name),
            gate: DispatchGate::new(max_concurrent_dispatches),
            shutdown: ShutdownSignal::new(),
        })
    }

    /// The current serving-lifecycle state.
    #[must_use]
    pub fn state(&self) -> AgentState {
        self.lifecycle.state()
    }

    /// A handle that can be triggered to request graceful shutdown.
    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Binds the listener, activates serving, and runs until the shutdown
    /// signal is triggered (by the `Shutdown` RPC or the caller).
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Transport`] if the listener cannot be bound,
    /// or [`RuntimeError::Lifecycle`] if an internal transition is rejected.
    pub async fn run(mut self) -> RuntimeResult<()> {
        self.lifecycle.transition(LifecycleEvent::Boot)?;

        let bind_addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.listen_port)
            .parse()
            .map_err(|_| RuntimeError::InvalidName("bind address is not valid".to_string()))?;
        let endpoint = Endpoint::bind(bind_addr)?;

        let handler = Arc::new(AgentRpcHandler::new(
            self.gate.clone(),
            self.shutdown.clone(),
        ));
        endpoint.spawn(Some(handler));

        self.lifecycle.transition(LifecycleEvent::Activate)?;
        info!(agent_name = %self.config.agent_name, addr = %endpoint.local_addr(), "agent active");

        let reconnect_handle = tokio::spawn(reconnect::run(
            endpoint.clone(),
            self.config.clone(),
            self.shutdown.clone(),
        ));

        while !self.shutdown.is_set() {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }

        self.lifecycle.transition(LifecycleEvent::Retire)?;
        reconnect_handle.abort();
        self.gate.close();
        self.lifecycle.transition(LifecycleEvent::Terminate)?;
        info!(agent_name = %self.config.agent_name, "agent terminated");
        Ok(())
    }
}

/// Errors surfaced while constructing or running an [`AgentRuntime`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The configured agent name or bind address failed validation.
    #[error("invalid agent runtime configuration: {0}")]
    InvalidName(String),
    /// A lifecycle transition was rejected.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    /// The RPC listener could not be bound.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result alias for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, port: u16) -> AgentConfig {
        AgentConfig {
            listen_port: port,
            bind_address: "127.0.0.1".to_string(),
            report_address: None,
            agent_name: name.to_string(),
            master_address: None,
            standalone: true,
            heartbeat_interval_secs: 5,
            sysinfo_every_n_heartbeats: 12,
            initial_backoff_secs: 5,
            max_backoff_secs: 60,
            max_consecutive_heartbeat_failures: 3,
            max_concurrent_dispatches: 32,
            log_format: taskd_config::LogFormat::Human,
        }
    }

    #[test]
    fn rejects_invalid_agent_names() {
        let mut cfg = config("", 0);
        cfg.agent_name = String::new();
        let err = AgentRuntime::new(cfg).expect_err("empty name should be rejected");
        assert!(matches!(err, RuntimeError::InvalidName(_)));
    }

    #[tokio::test]
    async fn standalone_runtime_boots_and_shuts_down_on_signal() {
        let runtime = AgentRuntime::new(config("standalone-agent", 0)).unwrap();
        let shutdown = runtime.shutdown_signal();
        assert_eq!(runtime.state(), AgentState::Init);

        let handle = tokio::spawn(runtime.run());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown.trigger();
        handle.await.unwrap().unwrap();
    }
}
