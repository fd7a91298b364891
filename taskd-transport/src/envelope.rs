//! Wire framing on top of `mxp::Message`: a request-id-correlated envelope
//! carrying one of the control plane's typed RPC bodies.

use serde::{Deserialize, Serialize};
use taskd_proto::{
    ExecuteCommandRequest, ExecuteTaskRequest, ExecuteTaskResponse, GetAgentInfoRequest,
    GetAgentInfoResponse, HeartbeatRequest, HeartbeatResponse, ListAgentsRequest,
    ListAgentsResponse, RegisterAgentRequest, RegisterAgentResponse, RunCommandRequest,
    ShutdownRequest, ShutdownResponse, StopAgentRequest, StopAgentResponse, StreamOutputResponse,
    UnregisterAgentRequest, UnregisterAgentResponse,
};
use uuid::Uuid;

/// One outbound call. Every variant maps 1:1 to a wire schema from §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "rpc")]
pub enum RpcRequest {
    /// `RegisterAgent`.
    RegisterAgent(RegisterAgentRequest),
    /// `Heartbeat`.
    Heartbeat(HeartbeatRequest),
    /// `ListAgents`.
    ListAgents(ListAgentsRequest),
    /// `GetAgentInfo`.
    GetAgentInfo(GetAgentInfoRequest),
    /// `UnregisterAgent`.
    UnregisterAgent(UnregisterAgentRequest),
    /// `StopAgent`.
    StopAgent(StopAgentRequest),
    /// `ExecuteCommand`, a server-streaming call.
    ExecuteCommand(ExecuteCommandRequest),
    /// `RunCommand`, a server-streaming call.
    RunCommand(RunCommandRequest),
    /// `ExecuteTask`.
    ExecuteTask(ExecuteTaskRequest),
    /// `Shutdown`.
    Shutdown(ShutdownRequest),
}

impl RpcRequest {
    /// `true` iff this call replies with a stream of [`StreamOutputResponse`]
    /// chunks rather than a single unary response.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::ExecuteCommand(_) | Self::RunCommand(_))
    }
}

/// The unary reply to an [`RpcRequest`] that is not a streaming call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "rpc")]
pub enum RpcResponse {
    /// Reply to `RegisterAgent`.
    RegisterAgent(RegisterAgentResponse),
    /// Reply to `Heartbeat`.
    Heartbeat(HeartbeatResponse),
    /// Reply to `ListAgents`.
    ListAgents(ListAgentsResponse),
    /// Reply to `GetAgentInfo`.
    GetAgentInfo(GetAgentInfoResponse),
    /// Reply to `UnregisterAgent`.
    UnregisterAgent(UnregisterAgentResponse),
    /// Reply to `StopAgent`.
    StopAgent(StopAgentResponse),
    /// Reply to `ExecuteTask`.
    ExecuteTask(ExecuteTaskResponse),
    /// Reply to `Shutdown`.
    Shutdown(ShutdownResponse),
    /// The peer rejected the call before it could be dispatched (transport-level).
    Error(String),
}

/// A request-id-correlated frame. `request_id` ties a reply (unary or each
/// streamed chunk) back to the call that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Correlates this frame with the call that started the exchange.
    pub request_id: Uuid,
    /// The framed payload.
    pub body: T,
}

impl<T> Envelope<T> {
    /// Wraps `body` under a fresh request id.
    #[must_use]
    pub fn new(request_id: Uuid, body: T) -> Self {
        Self { request_id, body }
    }
}

/// One frame of a streamed reply: either another output chunk, or the
/// terminal signal that the stream is closed (which itself carries the
/// final chunk, mirroring `StreamOutputResponse::finished`).
pub type StreamFrame = StreamOutputResponse;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_execute_and_run_command_are_streaming() {
        assert!(RpcRequest::ExecuteCommand(ExecuteCommandRequest {
            agent_name: "a".into(),
            command: "true".into(),
            deadline_secs: None,
        })
        .is_streaming());
        assert!(RpcRequest::RunCommand(RunCommandRequest {
            command: "true".into(),
            user: None,
        })
        .is_streaming());
        assert!(!RpcRequest::ListAgents(ListAgentsRequest).is_streaming());
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let request_id = Uuid::new_v4();
        let envelope = Envelope::new(
            request_id,
            RpcRequest::Heartbeat(HeartbeatRequest {
                agent_name: "alpha".into(),
                system_info_json: None,
                version: None,
            }),
        );
        let json = serde_json::to_string(&envelope).unwrap();
        let back: Envelope<RpcRequest> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.request_id, request_id);
        assert!(matches!(back.body, RpcRequest::Heartbeat(_)));
    }
}
