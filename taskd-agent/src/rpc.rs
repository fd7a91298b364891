//! Inbound RPC surface an agent serves: `RunCommand`, `ExecuteTask`, `Shutdown`.

use std::future::Future;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use taskd_archive as archive;
use taskd_dispatch::{ChunkSink, CommandSpec, DispatchError};
use taskd_proto::{
    ExecuteTaskRequest, ExecuteTaskResponse, RunCommandRequest, ShutdownRequest, ShutdownResponse,
    StreamOutputResponse,
};
use taskd_script::{TaskInterpreter, TomlTaskInterpreter};
use taskd_transport::{RpcHandler, RpcRequest, RpcResponse, ServeOutcome};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::reconnect::ShutdownSignal;

/// Caps the number of `RunCommand`/`ExecuteTask` dispatches this agent serves
/// at once, so a burst of requests cannot starve the reconnect loop's own
/// scheduling slot.
#[derive(Debug, Clone)]
pub struct DispatchGate {
    semaphore: Arc<Semaphore>,
    closed: Arc<AtomicBool>,
    max_concurrent_dispatches: NonZeroU32,
}

impl DispatchGate {
    /// Builds a gate admitting at most `max_concurrent_dispatches` dispatches
    /// at a time.
    #[must_use]
    pub fn new(max_concurrent_dispatches: NonZeroU32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent_dispatches.get() as usize)),
            closed: Arc::new(AtomicBool::new(false)),
            max_concurrent_dispatches,
        }
    }

    /// The configured concurrency ceiling.
    #[must_use]
    pub const fn max_concurrent_dispatches(&self) -> NonZeroU32 {
        self.max_concurrent_dispatches
    }

    /// Returns `true` once [`DispatchGate::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stops admitting new dispatches. In-flight ones are unaffected.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.semaphore.close();
    }

    /// Admits `dispatch` once a concurrency permit is free and spawns it.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchGateError::Closed`] if the gate was closed before
    /// the dispatch could be admitted.
    pub fn admit<F, T>(&self, dispatch: F) -> DispatchGateResult<JoinHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return Err(DispatchGateError::Closed);
        }

        let semaphore = Arc::clone(&self.semaphore);
        let handle = tokio::spawn(async move {
            let permit = semaphore
                .acquire_owned()
                .await
                .expect("dispatch gate closed while awaiting a permit");
            let output = dispatch.await;
            drop(permit);
            output
        });

        Ok(handle)
    }
}

/// Errors produced by [`DispatchGate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchGateError {
    /// The agent is retiring and no longer admits new dispatches.
    #[error("dispatch gate closed, agent is retiring")]
    Closed,
}

/// Result alias for [`DispatchGate::admit`].
pub type DispatchGateResult<T> = Result<T, DispatchGateError>;

/// Serves the RPCs a Master (or a direct caller) issues against this agent.
pub struct AgentRpcHandler {
    gate: DispatchGate,
    shutdown: ShutdownSignal,
}

impl AgentRpcHandler {
    /// Builds a handler that admits dispatch work through `gate` and
    /// triggers `shutdown` when a `Shutdown` RPC arrives.
    #[must_use]
    pub fn new(gate: DispatchGate, shutdown: ShutdownSignal) -> Self {
        Self { gate, shutdown }
    }
}

struct ChannelSink(mpsc::Sender<StreamOutputResponse>);

#[async_trait::async_trait]
impl ChunkSink for ChannelSink {
    async fn send(&mut self, chunk: StreamOutputResponse) -> Result<(), DispatchError> {
        let _ = self.0.send(chunk).await;
        Ok(())
    }
}

#[async_trait::async_trait]
impl RpcHandler for AgentRpcHandler {
    async fn handle(&self, peer: SocketAddr, request: RpcRequest) -> ServeOutcome {
        match request {
            RpcRequest::RunCommand(req) => ServeOutcome::Stream(self.serve_run_command(req)),
            RpcRequest::ExecuteTask(req) => {
                ServeOutcome::Unary(self.serve_execute_task(req).await)
            }
            RpcRequest::Shutdown(req) => ServeOutcome::Unary(self.serve_shutdown(req)),
            other => {
                warn!(%peer, ?other, "agent does not serve this RPC directly");
                ServeOutcome::Unary(RpcResponse::Error(
                    "this RPC is not served by an agent".to_string(),
                ))
            }
        }
    }
}

impl AgentRpcHandler {
    fn serve_run_command(&self, request: RunCommandRequest) -> mpsc::Receiver<StreamOutputResponse> {
        let (tx, rx) = mpsc::channel(32);
        let mut spec = CommandSpec::new(request.command);
        if let Some(user) = request.user {
            spec = spec.with_user(user);
        }
        let _ = self.gate.admit(async move {
            let mut sink = ChannelSink(tx.clone());
            if let Err(err) = taskd_dispatch::run_streaming(spec, &mut sink).await {
                let _ = tx
                    .send(StreamOutputResponse::finished_with_error(err.to_string()))
                    .await;
            }
        });
        rx
    }

    async fn serve_execute_task(&self, request: ExecuteTaskRequest) -> RpcResponse {
        match run_execute_task(request).await {
            Ok(response) => RpcResponse::ExecuteTask(response),
            Err(err) => {
                error!(?err, "ExecuteTask failed");
                RpcResponse::Error(err.to_string())
            }
        }
    }

    fn serve_shutdown(&self, _request: ShutdownRequest) -> RpcResponse {
        info!("Shutdown RPC received, agent will stop shortly");
        self.shutdown.trigger();
        RpcResponse::Shutdown(ShutdownResponse)
    }
}

async fn run_execute_task(
    request: ExecuteTaskRequest,
) -> Result<ExecuteTaskResponse, taskd_script::EvalError> {
    let workdir = tempfile::tempdir().map_err(|err| {
        taskd_script::EvalError::Dispatch(DispatchError::InvalidRequest(err.to_string()))
    })?;

    if let Err(err) = archive::unpack(&request.workspace_archive, workdir.path()) {
        return Err(taskd_script::EvalError::Dispatch(DispatchError::InvalidRequest(
            err.to_string(),
        )));
    }

    let interpreter = TomlTaskInterpreter::new();
    let stripped_source = interpreter.strip_delegation(&request.script_source);
    let output = interpreter
        .evaluate(
            &stripped_source,
            &request.task_group,
            &request.task_name,
            workdir.path(),
        )
        .await?;

    let workspace_archive = repack(workdir.path());

    Ok(ExecuteTaskResponse {
        success: output.success,
        output: output.log,
        workspace_archive,
    })
}

fn repack(workdir: &Path) -> Vec<u8> {
    archive::pack(workdir).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn dispatch_gate_respects_max_concurrent_dispatches() {
        let gate = DispatchGate::new(NonZeroU32::new(2).unwrap());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let gate = gate.clone();
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            handles.push(
                gate.admit(async move {
                    let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(current, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                })
                .unwrap(),
            );
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn closed_dispatch_gate_rejects_new_dispatches() {
        let gate = DispatchGate::new(NonZeroU32::new(4).unwrap());
        gate.close();

        let result = gate.admit(async move {});
        assert_eq!(result.unwrap_err(), DispatchGateError::Closed);
    }
}
