//! Wire message schemas for the task-execution control plane.
//!
//! These types are pure data: no networking, no persistence. [`taskd-transport`]
//! wraps them in request/response envelopes and ships them over the wire;
//! [`taskd-registry`] and [`taskd-dispatch`] produce and consume them.

#![warn(missing_docs, clippy::pedantic)]

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Derived liveness of an agent, computed from `last_heartbeat` relative to the
/// configured active window. Never persisted; always recomputed on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    /// The agent has heartbeat within the active window.
    Active,
    /// The agent has not heartbeat within the active window (or never has).
    Inactive,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => f.write_str("Active"),
            Self::Inactive => f.write_str("Inactive"),
        }
    }
}

/// Snapshot of an agent record as returned to callers over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Unique agent name.
    pub agent_name: String,
    /// `host:port` the Master dials to reach the agent.
    pub agent_address: String,
    /// Timestamp of the most recent heartbeat (zero-epoch if none observed).
    pub last_heartbeat: DateTime<Utc>,
    /// Derived liveness at response-construction time.
    pub status: AgentStatus,
    /// Timestamp of the most recent successful system-info update, if any.
    pub last_info_collected: Option<DateTime<Utc>>,
    /// Opaque, last-reported system information blob.
    pub system_info_json: Option<serde_json::Value>,
    /// Reported agent build identifier.
    pub version: Option<String>,
}

/// `RegisterAgent` request: an agent announcing itself (or refreshing its address).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAgentRequest {
    /// Unique identifier the agent wants to register under.
    pub agent_name: String,
    /// `host:port` the Master should dial to reach this agent.
    pub agent_address: String,
}

/// `RegisterAgent` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAgentResponse {
    /// Whether registration succeeded.
    pub success: bool,
    /// Human-readable status message.
    pub message: String,
}

/// `Heartbeat` request: an agent reporting liveness, optionally with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    /// The heartbeating agent's name.
    pub agent_name: String,
    /// Freshly captured system information, sent periodically rather than on
    /// every heartbeat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_info_json: Option<serde_json::Value>,
    /// Reported agent build identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// `Heartbeat` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    /// Whether the heartbeat was recorded. `false` means the agent is unknown
    /// to the registry (not a transport failure) and must re-register.
    pub success: bool,
    /// Human-readable status message.
    pub message: String,
}

/// `ListAgents` request. No fields; present for symmetry with other RPCs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListAgentsRequest;

/// `ListAgents` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListAgentsResponse {
    /// All known agents, ordered by name.
    pub agents: Vec<AgentInfo>,
}

/// `GetAgentInfo` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetAgentInfoRequest {
    /// Agent name to look up.
    pub agent_name: String,
}

/// `GetAgentInfo` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetAgentInfoResponse {
    /// Whether the agent was found.
    pub success: bool,
    /// Human-readable status message.
    pub message: String,
    /// The agent's current info, present iff `success`.
    pub agent_info: Option<AgentInfo>,
}

/// `UnregisterAgent` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterAgentRequest {
    /// Agent name to remove.
    pub agent_name: String,
}

/// `UnregisterAgent` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterAgentResponse {
    /// Whether an agent was actually removed.
    pub success: bool,
    /// Human-readable status message.
    pub message: String,
}

/// `StopAgent` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopAgentRequest {
    /// Agent name to stop.
    pub agent_name: String,
}

/// `StopAgent` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopAgentResponse {
    /// Whether the Shutdown RPC was successfully delivered and acknowledged.
    pub success: bool,
    /// Human-readable status message.
    pub message: String,
}

/// `ExecuteCommand` request, sent by a client to the Master for proxying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteCommandRequest {
    /// Target agent name.
    pub agent_name: String,
    /// Shell command line to execute on the agent.
    pub command: String,
    /// Caller-supplied deadline, in seconds, for the whole dispatch
    /// (Master-to-agent dial plus the full output stream). `None` means the
    /// Master's own default applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
}

/// `RunCommand` request, sent by the Master directly to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCommandRequest {
    /// Shell command line to execute.
    pub command: String,
    /// Optional user identity to execute the command as (unix privilege drop).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// One chunk of a streamed command's output. A stream ends with exactly one
/// chunk carrying `finished = true`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamOutputResponse {
    /// A line of stdout, if this chunk carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_chunk: Option<String>,
    /// A line of stderr, if this chunk carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_chunk: Option<String>,
    /// A human-readable error, set when the subprocess could not be started
    /// or the dispatch itself failed before any output was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether this is the terminal chunk of the stream.
    pub finished: bool,
    /// Process exit code, present iff `finished` and the subprocess started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl StreamOutputResponse {
    /// Builds a non-terminal stdout chunk.
    #[must_use]
    pub fn stdout(line: impl Into<String>) -> Self {
        Self {
            stdout_chunk: Some(line.into()),
            ..Self::default()
        }
    }

    /// Builds a non-terminal stderr chunk.
    #[must_use]
    pub fn stderr(line: impl Into<String>) -> Self {
        Self {
            stderr_chunk: Some(line.into()),
            ..Self::default()
        }
    }

    /// Builds the terminal chunk for a subprocess that ran to completion.
    #[must_use]
    pub fn finished_with_exit_code(exit_code: i32) -> Self {
        Self {
            finished: true,
            exit_code: Some(exit_code),
            ..Self::default()
        }
    }

    /// Builds the terminal chunk for a dispatch that failed before producing
    /// an exit code (e.g. the subprocess never started).
    #[must_use]
    pub fn finished_with_error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            finished: true,
            ..Self::default()
        }
    }

    /// `true` iff the stream finished with a zero exit code.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.finished && self.exit_code == Some(0)
    }
}

/// `ExecuteTask` request: dispatch one task from a packaged workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteTaskRequest {
    /// Name of the task to run.
    pub task_name: String,
    /// Group the task belongs to.
    pub task_group: String,
    /// Gzip-compressed tar archive of the caller's workspace.
    pub workspace_archive: Vec<u8>,
    /// Full source of the task script file.
    pub script_source: String,
    /// Optional user identity to execute under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// `ExecuteTask` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteTaskResponse {
    /// Whether the task evaluated successfully.
    pub success: bool,
    /// Human-readable task output/log.
    pub output: String,
    /// Re-packed workspace archive, returned even on failure.
    pub workspace_archive: Vec<u8>,
}

/// `Shutdown` request. No fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShutdownRequest;

/// `Shutdown` response, sent immediately; the server process stops shortly after.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShutdownResponse;

/// Concrete shape of the opaque `system_info` blob. The registry never
/// interprets these fields; they round-trip verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Machine hostname.
    pub hostname: String,
    /// Operating system name (e.g. `linux`).
    pub os: String,
    /// Operating system version string, if available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    /// Logical CPU core count.
    pub cpu_count: usize,
    /// Total system memory, in bytes.
    pub total_memory_bytes: u64,
    /// Available system memory, in bytes.
    pub available_memory_bytes: u64,
    /// Agent process uptime, in seconds.
    pub uptime_secs: u64,
    /// Free-form extra fields an agent build may want to report.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_output_success_requires_zero_exit() {
        assert!(StreamOutputResponse::finished_with_exit_code(0).is_success());
        assert!(!StreamOutputResponse::finished_with_exit_code(3).is_success());
        assert!(!StreamOutputResponse::stdout("a\n").is_success());
    }

    #[test]
    fn agent_info_round_trips_through_json() {
        let info = AgentInfo {
            agent_name: "alpha".into(),
            agent_address: "10.0.0.1:50051".into(),
            last_heartbeat: Utc::now(),
            status: AgentStatus::Active,
            last_info_collected: None,
            system_info_json: None,
            version: Some("1.2.3".into()),
        };
        let json = serde_json::to_string(&info).unwrap();
        let back: AgentInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back.agent_name, info.agent_name);
        assert_eq!(back.status, AgentStatus::Active);
    }
}
