//! Registry Service: exposes the [`Store`] over RPC and proxies `ExecuteCommand`/`StopAgent`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use taskd_primitives::{AgentAddress, AgentName};
use taskd_proto::{
    AgentInfo, ExecuteCommandRequest, GetAgentInfoRequest, GetAgentInfoResponse,
    HeartbeatRequest, HeartbeatResponse, ListAgentsRequest, ListAgentsResponse,
    RegisterAgentRequest, RegisterAgentResponse, RunCommandRequest, ShutdownRequest,
    StopAgentRequest, StopAgentResponse, StreamOutputResponse, UnregisterAgentRequest,
    UnregisterAgentResponse,
};
use taskd_registry::{classify, Store, StoreError};
use taskd_transport::{Endpoint, RpcHandler, RpcRequest, RpcResponse, ServeOutcome};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Per-RPC context for a proxied dispatch: the target agent, the payload,
/// and the deadline inherited from the caller. Lives only for the duration
/// of the `ExecuteCommand` call that builds it.
struct DispatchContext {
    agent_name: String,
    command: String,
    deadline: Duration,
}

/// Serves the Registry Service RPCs over an agent-facing [`Endpoint`].
pub struct RegistryService {
    store: Arc<dyn Store>,
    active_window: chrono::Duration,
    /// Deadline applied to a proxied dispatch when the caller did not supply
    /// one of its own via `ExecuteCommandRequest::deadline_secs`.
    default_dial_timeout: Duration,
}

impl RegistryService {
    /// Builds a service over `store`, classifying liveness against `active_window_secs`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, active_window_secs: i64) -> Self {
        Self {
            store,
            active_window: chrono::Duration::seconds(active_window_secs),
            default_dial_timeout: Duration::from_secs(30),
        }
    }

    /// Runs `GCInactive(retention_hours)` once, logging the eviction count.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from the underlying store.
    pub async fn gc_once(&self, retention_hours: i64) -> Result<usize, StoreError> {
        let evicted = self.store.gc_inactive(retention_hours).await?;
        info!(evicted, retention_hours, "startup GC complete");
        Ok(evicted)
    }

    /// Spawns a background task that runs `GCInactive` every `retention_hours`
    /// worth of seconds. Never blocks request handling.
    pub fn spawn_periodic_gc(self: &Arc<Self>, retention_hours: i64) {
        let service = Arc::clone(self);
        let period = Duration::from_secs((retention_hours.max(1) as u64) * 3600);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                match service.store.gc_inactive(retention_hours).await {
                    Ok(evicted) => info!(evicted, "periodic GC complete"),
                    Err(err) => warn!(?err, "periodic GC failed"),
                }
            }
        });
    }

    async fn register_agent(&self, req: RegisterAgentRequest) -> RpcResponse {
        let Ok(name) = AgentName::new(req.agent_name) else {
            return RpcResponse::RegisterAgent(RegisterAgentResponse {
                success: false,
                message: "invalid agent name".to_string(),
            });
        };
        let Ok(address) = AgentAddress::new(req.agent_address) else {
            return RpcResponse::RegisterAgent(RegisterAgentResponse {
                success: false,
                message: "invalid agent address".to_string(),
            });
        };
        match self.store.register(name, address).await {
            Ok(()) => RpcResponse::RegisterAgent(RegisterAgentResponse {
                success: true,
                message: "registered".to_string(),
            }),
            Err(err) => RpcResponse::RegisterAgent(RegisterAgentResponse {
                success: false,
                message: err.to_string(),
            }),
        }
    }

    async fn heartbeat(&self, req: HeartbeatRequest) -> RpcResponse {
        let Ok(name) = AgentName::new(req.agent_name) else {
            return RpcResponse::Heartbeat(HeartbeatResponse {
                success: false,
                message: "invalid agent name".to_string(),
            });
        };
        match self.store.heartbeat(&name).await {
            Ok(()) => {
                if let Some(info) = req.system_info_json {
                    let _ = self.store.update_system_info(&name, info).await;
                }
                if let Some(version) = req.version {
                    let _ = self.store.update_version(&name, version).await;
                }
                RpcResponse::Heartbeat(HeartbeatResponse {
                    success: true,
                    message: "ok".to_string(),
                })
            }
            Err(StoreError::NotFound(_)) => RpcResponse::Heartbeat(HeartbeatResponse {
                success: false,
                message: "Agent not found".to_string(),
            }),
            Err(err) => RpcResponse::Heartbeat(HeartbeatResponse {
                success: false,
                message: err.to_string(),
            }),
        }
    }

    async fn list_agents(&self, _req: ListAgentsRequest) -> RpcResponse {
        match self.store.list().await {
            Ok(records) => {
                let now = chrono::Utc::now();
                let agents = records
                    .into_iter()
                    .map(|record| to_agent_info(&record, now, self.active_window))
                    .collect();
                RpcResponse::ListAgents(ListAgentsResponse { agents })
            }
            Err(err) => RpcResponse::Error(err.to_string()),
        }
    }

    async fn get_agent_info(&self, req: GetAgentInfoRequest) -> RpcResponse {
        let Ok(name) = AgentName::new(req.agent_name) else {
            return RpcResponse::GetAgentInfo(GetAgentInfoResponse {
                success: false,
                message: "invalid agent name".to_string(),
                agent_info: None,
            });
        };
        match self.store.get(&name).await {
            Ok(record) => {
                let now = chrono::Utc::now();
                RpcResponse::GetAgentInfo(GetAgentInfoResponse {
                    success: true,
                    message: "ok".to_string(),
                    agent_info: Some(to_agent_info(&record, now, self.active_window)),
                })
            }
            Err(_) => RpcResponse::GetAgentInfo(GetAgentInfoResponse {
                success: false,
                message: "Agent not found".to_string(),
                agent_info: None,
            }),
        }
    }

    async fn unregister_agent(&self, req: UnregisterAgentRequest) -> RpcResponse {
        let Ok(name) = AgentName::new(req.agent_name) else {
            return RpcResponse::UnregisterAgent(UnregisterAgentResponse {
                success: false,
                message: "invalid agent name".to_string(),
            });
        };
        match self.store.remove(&name).await {
            Ok(()) => RpcResponse::UnregisterAgent(UnregisterAgentResponse {
                success: true,
                message: "removed".to_string(),
            }),
            Err(_) => RpcResponse::UnregisterAgent(UnregisterAgentResponse {
                success: false,
                message: "Agent not found".to_string(),
            }),
        }
    }

    async fn stop_agent(&self, req: StopAgentRequest) -> RpcResponse {
        let Ok(name) = AgentName::new(req.agent_name) else {
            return RpcResponse::StopAgent(StopAgentResponse {
                success: false,
                message: "invalid agent name".to_string(),
            });
        };
        let address = match self.store.get_address(&name).await {
            Ok(address) => address,
            Err(err) => {
                return RpcResponse::StopAgent(StopAgentResponse {
                    success: false,
                    message: err.to_string(),
                })
            }
        };
        let Ok(socket_addr) = address.resolve() else {
            return RpcResponse::StopAgent(StopAgentResponse {
                success: false,
                message: "agent address did not resolve".to_string(),
            });
        };
        match dial_and_call(
            socket_addr,
            RpcRequest::Shutdown(ShutdownRequest),
            self.default_dial_timeout,
        )
        .await
        {
            Ok(RpcResponse::Shutdown(_)) => RpcResponse::StopAgent(StopAgentResponse {
                success: true,
                message: "stopped".to_string(),
            }),
            Ok(_) | Err(_) => RpcResponse::StopAgent(StopAgentResponse {
                success: false,
                message: "failed to deliver Shutdown to agent".to_string(),
            }),
        }
    }

    /// Proxies `ExecuteCommand`: resolves the agent, dials it, and forwards
    /// every `RunCommand` chunk back to the client as it arrives.
    fn execute_command(&self, req: ExecuteCommandRequest) -> mpsc::Receiver<StreamOutputResponse> {
        let (tx, rx) = mpsc::channel(32);
        let store = Arc::clone(&self.store);
        let default_dial_timeout = self.default_dial_timeout;
        let context = DispatchContext {
            agent_name: req.agent_name,
            command: req.command,
            deadline: req
                .deadline_secs
                .map(Duration::from_secs)
                .unwrap_or(default_dial_timeout),
        };
        tokio::spawn(async move {
            let Ok(name) = AgentName::new(context.agent_name) else {
                let _ = tx
                    .send(StreamOutputResponse::finished_with_error("invalid agent name"))
                    .await;
                return;
            };
            let address = match store.get_address(&name).await {
                Ok(address) => address,
                Err(err) => {
                    let _ = tx.send(StreamOutputResponse::finished_with_error(err.to_string())).await;
                    return;
                }
            };
            let Ok(socket_addr) = address.resolve() else {
                let _ = tx
                    .send(StreamOutputResponse::finished_with_error("agent address did not resolve"))
                    .await;
                return;
            };
            if let Err(err) =
                proxy_run_command(socket_addr, context.command, &tx, context.deadline).await
            {
                let _ = tx.send(StreamOutputResponse::finished_with_error(err)).await;
            }
        });
        rx
    }
}

#[async_trait::async_trait]
impl RpcHandler for RegistryService {
    async fn handle(&self, peer: SocketAddr, request: RpcRequest) -> ServeOutcome {
        match request {
            RpcRequest::RegisterAgent(req) => ServeOutcome::Unary(self.register_agent(req).await),
            RpcRequest::Heartbeat(req) => ServeOutcome::Unary(self.heartbeat(req).await),
            RpcRequest::ListAgents(req) => ServeOutcome::Unary(self.list_agents(req).await),
            RpcRequest::GetAgentInfo(req) => ServeOutcome::Unary(self.get_agent_info(req).await),
            RpcRequest::UnregisterAgent(req) => {
                ServeOutcome::Unary(self.unregister_agent(req).await)
            }
            RpcRequest::StopAgent(req) => ServeOutcome::Unary(self.stop_agent(req).await),
            RpcRequest::ExecuteCommand(req) => ServeOutcome::Stream(self.execute_command(req)),
            other => {
                warn!(%peer, ?other, "Master does not serve this RPC");
                ServeOutcome::Unary(RpcResponse::Error(
                    "this RPC is not served by the Master".to_string(),
                ))
            }
        }
    }
}

async fn proxy_run_command(
    agent_addr: SocketAddr,
    command: String,
    sink: &mpsc::Sender<StreamOutputResponse>,
    deadline: Duration,
) -> Result<(), String> {
    let endpoint = Endpoint::bind("0.0.0.0:0".parse().unwrap()).map_err(|err| err.to_string())?;
    let mut chunks = endpoint
        .call_streaming(
            agent_addr,
            RpcRequest::RunCommand(RunCommandRequest { command, user: None }),
            32,
        )
        .await
        .map_err(|err| err.to_string())?;

    let deadline = tokio::time::Instant::now() + deadline;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, chunks.recv()).await {
            Ok(Some(chunk)) => {
                let finished = chunk.finished;
                if sink.send(chunk).await.is_err() {
                    return Ok(());
                }
                if finished {
                    return Ok(());
                }
            }
            Ok(None) => return Ok(()),
            Err(_) => return Err("timed out waiting for agent output".to_string()),
        }
    }
}

async fn dial_and_call(
    addr: SocketAddr,
    request: RpcRequest,
    timeout: Duration,
) -> taskd_transport::TransportResult<RpcResponse> {
    let endpoint = Endpoint::bind("0.0.0.0:0".parse().unwrap())?;
    endpoint.call_unary(addr, request, timeout).await
}

fn to_agent_info(
    record: &taskd_registry::AgentRecord,
    now: chrono::DateTime<chrono::Utc>,
    active_window: chrono::Duration,
) -> AgentInfo {
    let status = match classify(Some(record.last_heartbeat), now, active_window) {
        taskd_registry::Liveness::Active => taskd_proto::AgentStatus::Active,
        taskd_registry::Liveness::Inactive => taskd_proto::AgentStatus::Inactive,
    };
    AgentInfo {
        agent_name: record.name.as_str().to_string(),
        agent_address: record.address.as_str().to_string(),
        last_heartbeat: record.last_heartbeat,
        status,
        last_info_collected: record.last_info_collected,
        system_info_json: record.system_info.clone(),
        version: record.version.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskd_registry::VolatileStore;

    fn service() -> RegistryService {
        let store: Arc<dyn Store> = Arc::new(VolatileStore::new(chrono::Duration::seconds(60)));
        RegistryService::new(store, 60)
    }

    fn register_req(name: &str) -> RegisterAgentRequest {
        RegisterAgentRequest {
            agent_name: name.to_string(),
            agent_address: "127.0.0.1:9000".to_string(),
        }
    }

    #[tokio::test]
    async fn register_then_heartbeat_succeeds() {
        let svc = service();
        let response = svc.register_agent(register_req("alpha")).await;
        assert!(matches!(response, RpcResponse::RegisterAgent(r) if r.success));

        let response = svc
            .heartbeat(HeartbeatRequest {
                agent_name: "alpha".to_string(),
                system_info_json: None,
                version: None,
            })
            .await;
        assert!(matches!(response, RpcResponse::Heartbeat(r) if r.success));
    }

    #[tokio::test]
    async fn heartbeat_for_unknown_agent_reports_not_found() {
        let svc = service();
        let response = svc
            .heartbeat(HeartbeatRequest {
                agent_name: "ghost".to_string(),
                system_info_json: None,
                version: None,
            })
            .await;
        match response {
            RpcResponse::Heartbeat(r) => {
                assert!(!r.success);
                assert_eq!(r.message, "Agent not found");
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_agents_reflects_registered_agents() {
        let svc = service();
        svc.register_agent(register_req("alpha")).await;
        svc.register_agent(register_req("beta")).await;

        match svc.list_agents(ListAgentsRequest).await {
            RpcResponse::ListAgents(r) => assert_eq!(r.agents.len(), 2),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unregister_twice_is_not_idempotent_success() {
        let svc = service();
        svc.register_agent(register_req("alpha")).await;
        let first = svc
            .unregister_agent(UnregisterAgentRequest {
                agent_name: "alpha".to_string(),
            })
            .await;
        assert!(matches!(first, RpcResponse::UnregisterAgent(r) if r.success));

        let second = svc
            .unregister_agent(UnregisterAgentRequest {
                agent_name: "alpha".to_string(),
            })
            .await;
        match second {
            RpcResponse::UnregisterAgent(r) => assert!(!r.success),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_agent_info_for_unknown_agent_reports_failure() {
        let svc = service();
        let response = svc
            .get_agent_info(GetAgentInfoRequest {
                agent_name: "ghost".to_string(),
            })
            .await;
        match response {
            RpcResponse::GetAgentInfo(r) => {
                assert!(!r.success);
                assert!(r.agent_info.is_none());
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn execute_command_without_deadline_falls_back_to_default() {
        let svc = service();
        let mut rx = svc.execute_command(ExecuteCommandRequest {
            agent_name: "ghost".to_string(),
            command: "true".to_string(),
            deadline_secs: None,
        });
        let chunk = rx.recv().await.expect("one terminal chunk");
        assert!(chunk.finished);
        assert!(chunk.error.is_some());
    }

    #[tokio::test]
    async fn execute_command_honors_caller_supplied_deadline() {
        let svc = service();
        let mut rx = svc.execute_command(ExecuteCommandRequest {
            agent_name: "ghost".to_string(),
            command: "true".to_string(),
            deadline_secs: Some(1),
        });
        let chunk = rx.recv().await.expect("one terminal chunk");
        assert!(chunk.finished);
        assert!(chunk.error.is_some());
    }
}
