//! Master connection state machine: DIALING → REGISTERING → HEARTBEATING,
//! with CLOSING → BACKOFF-WAIT on failure and exponential backoff between
//! dial attempts.
//!
//! This machine is orthogonal to [`crate::lifecycle::Lifecycle`]: the agent
//! keeps serving `RunCommand`/`ExecuteTask` locally throughout, whether or
//! not the Master connection is currently up.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskd_config::AgentConfig;
use taskd_proto::{HeartbeatRequest, RegisterAgentRequest};
use taskd_transport::{Endpoint, RpcRequest, RpcResponse};
use tracing::{debug, info, warn};

/// Connection-loop states, named after the state machine in §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Opening a transport to the Master.
    Dialing,
    /// Sending `RegisterAgent`.
    Registering,
    /// Sending periodic `Heartbeat`s.
    Heartbeating,
    /// Tearing down the transport before backing off.
    Closing,
    /// Sleeping before the next `DIALING` attempt.
    BackoffWait,
}

/// Doubles `current` up to `cap`, the reconnect loop's backoff policy.
#[must_use]
pub fn next_backoff(current: Duration, cap: Duration) -> Duration {
    let doubled = current.saturating_mul(2);
    if doubled > cap {
        cap
    } else {
        doubled
    }
}

/// Signals a terminal, non-reconnecting shutdown requested via the `Shutdown` RPC.
#[derive(Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    /// Creates a fresh, unset signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the signal as set. Idempotent.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// `true` once [`ShutdownSignal::trigger`] has been called.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Drives the reconnect loop against the Master until `shutdown` is triggered.
///
/// Transient dial, register, and heartbeat failures are recovered locally and
/// never propagated; only a triggered `shutdown` ends the loop.
pub async fn run(endpoint: Endpoint, config: AgentConfig, shutdown: ShutdownSignal) {
    let Some(master_address) = resolve_master_address(&config) else {
        info!("agent running in standalone mode, reconnect loop not started");
        return;
    };

    let report_address = config
        .report_address
        .clone()
        .unwrap_or_else(|| format!("{}:{}", config.bind_address, config.listen_port));

    let mut backoff = Duration::from_secs(config.initial_backoff_secs);
    let initial = backoff;
    let cap = Duration::from_secs(config.max_backoff_secs);
    let max_failures = config.max_consecutive_heartbeat_failures;
    let mut heartbeats_sent: u64 = 0;

    'connection: loop {
        if shutdown.is_set() {
            return;
        }

        debug!(%master_address, "DIALING");
        let dial_deadline = Duration::from_secs(10);

        debug!("REGISTERING");
        let register = RpcRequest::RegisterAgent(RegisterAgentRequest {
            agent_name: config.agent_name.clone(),
            agent_address: report_address.clone(),
        });
        let registered = matches!(
            endpoint.call_unary(master_address, register, dial_deadline).await,
            Ok(RpcResponse::RegisterAgent(resp)) if resp.success
        );

        if !registered {
            warn!(%master_address, "registration failed, entering backoff");
            backoff = close_and_wait(backoff, cap, &shutdown).await;
            continue 'connection;
        }

        backoff = initial;
        info!(%master_address, "HEARTBEATING");

        let mut consecutive_failures: u32 = 0;
        loop {
            if shutdown.is_set() {
                return;
            }
            tokio::time::sleep(Duration::from_secs(config.heartbeat_interval_secs)).await;

            let system_info_json = if heartbeats_sent % u64::from(config.sysinfo_every_n_heartbeats)
                == 0
            {
                Some(crate::sysinfo::capture_json())
            } else {
                None
            };
            heartbeats_sent += 1;

            let heartbeat = RpcRequest::Heartbeat(HeartbeatRequest {
                agent_name: config.agent_name.clone(),
                system_info_json,
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            });

            match endpoint
                .call_unary(master_address, heartbeat, Duration::from_secs(5))
                .await
            {
                Ok(RpcResponse::Heartbeat(resp)) if resp.success => {
                    consecutive_failures = 0;
                }
                _ => {
                    consecutive_failures += 1;
                    warn!(consecutive_failures, "heartbeat failed");
                    if consecutive_failures >= max_failures {
                        warn!("max consecutive heartbeat failures reached, closing");
                        backoff = close_and_wait(backoff, cap, &shutdown).await;
                        continue 'connection;
                    }
                }
            }
        }
    }
}

async fn close_and_wait(backoff: Duration, cap: Duration, shutdown: &ShutdownSignal) -> Duration {
    debug!("CLOSING");
    let next = next_backoff(backoff, cap);
    debug!(wait_secs = backoff.as_secs(), "BACKOFF-WAIT");
    tokio::select! {
        () = tokio::time::sleep(backoff) => {}
        () = wait_for_shutdown(shutdown) => {}
    }
    next
}

async fn wait_for_shutdown(shutdown: &ShutdownSignal) {
    while !shutdown.is_set() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn resolve_master_address(config: &AgentConfig) -> Option<SocketAddr> {
    let raw = config.master_address.as_ref()?;
    raw.parse().ok().or_else(|| {
        warn!(address = %raw, "master_address did not parse as a socket address");
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        let cap = Duration::from_secs(60);
        let mut backoff = Duration::from_secs(5);
        backoff = next_backoff(backoff, cap);
        assert_eq!(backoff, Duration::from_secs(10));
        backoff = next_backoff(backoff, cap);
        assert_eq!(backoff, Duration::from_secs(20));
        backoff = next_backoff(backoff, cap);
        assert_eq!(backoff, Duration::from_secs(40));
        backoff = next_backoff(backoff, cap);
        assert_eq!(backoff, Duration::from_secs(60));
        backoff = next_backoff(backoff, cap);
        assert_eq!(backoff, Duration::from_secs(60));
    }

    #[test]
    fn shutdown_signal_is_idempotent() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_set());
        signal.trigger();
        signal.trigger();
        assert!(signal.is_set());
    }
}
