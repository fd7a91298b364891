//! Registry-client verbs: `agent list/get/delete/stop/run`, talking to a Master.

use std::io::Write;
use std::time::Duration;

use taskd_proto::{
    AgentStatus, ExecuteCommandRequest, GetAgentInfoRequest, ListAgentsRequest, RunCommandRequest,
    StopAgentRequest, UnregisterAgentRequest,
};
use taskd_transport::{Endpoint, RpcRequest, RpcResponse};

use crate::error::{CliError, CliResult};

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

fn dial(master: &str) -> CliResult<(Endpoint, std::net::SocketAddr)> {
    let addr = master
        .parse()
        .map_err(|_| CliError::InvalidArgument(format!("invalid master address `{master}`")))?;
    let endpoint = Endpoint::bind("0.0.0.0:0".parse().expect("valid literal"))?;
    Ok((endpoint, addr))
}

/// `taskd agent list`.
pub async fn list(master: &str) -> CliResult<()> {
    let (endpoint, addr) = dial(master)?;
    match endpoint
        .call_unary(addr, RpcRequest::ListAgents(ListAgentsRequest), CALL_TIMEOUT)
        .await?
    {
        RpcResponse::ListAgents(response) => {
            if response.agents.is_empty() {
                println!("no agents registered");
                return Ok(());
            }
            println!("{:<20} {:<22} {:<10} VERSION", "NAME", "ADDRESS", "STATUS");
            for agent in response.agents {
                let status = match agent.status {
                    AgentStatus::Active => "Active",
                    AgentStatus::Inactive => "Inactive",
                };
                println!(
                    "{:<20} {:<22} {:<10} {}",
                    agent.agent_name,
                    agent.agent_address,
                    status,
                    agent.version.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }
        other => Err(unexpected(other)),
    }
}

/// `taskd agent get`.
pub async fn get(master: &str, agent_name: &str) -> CliResult<()> {
    let (endpoint, addr) = dial(master)?;
    let request = RpcRequest::GetAgentInfo(GetAgentInfoRequest {
        agent_name: agent_name.to_string(),
    });
    match endpoint.call_unary(addr, request, CALL_TIMEOUT).await? {
        RpcResponse::GetAgentInfo(response) if response.success => {
            let info = response.agent_info.expect("success implies agent_info");
            println!("name:               {}", info.agent_name);
            println!("address:            {}", info.agent_address);
            println!("status:             {}", info.status);
            println!("last_heartbeat:     {}", info.last_heartbeat);
            println!("version:            {}", info.version.as_deref().unwrap_or("-"));
            Ok(())
        }
        RpcResponse::GetAgentInfo(response) => Err(CliError::Remote(response.message)),
        other => Err(unexpected(other)),
    }
}

/// `taskd agent delete`.
pub async fn delete(master: &str, agent_name: &str) -> CliResult<()> {
    let (endpoint, addr) = dial(master)?;
    let request = RpcRequest::UnregisterAgent(UnregisterAgentRequest {
        agent_name: agent_name.to_string(),
    });
    match endpoint.call_unary(addr, request, CALL_TIMEOUT).await? {
        RpcResponse::UnregisterAgent(response) if response.success => {
            println!("removed agent `{agent_name}`");
            Ok(())
        }
        RpcResponse::UnregisterAgent(response) => Err(CliError::Remote(response.message)),
        other => Err(unexpected(other)),
    }
}

/// `taskd agent stop`.
pub async fn stop(master: &str, agent_name: &str) -> CliResult<()> {
    let (endpoint, addr) = dial(master)?;
    let request = RpcRequest::StopAgent(StopAgentRequest {
        agent_name: agent_name.to_string(),
    });
    match endpoint.call_unary(addr, request, CALL_TIMEOUT).await? {
        RpcResponse::StopAgent(response) if response.success => {
            println!("stop requested for agent `{agent_name}`");
            Ok(())
        }
        RpcResponse::StopAgent(response) => Err(CliError::Remote(response.message)),
        other => Err(unexpected(other)),
    }
}

/// `taskd agent run`. Streams output to stdout/stderr and returns the
/// subprocess's exit code as this process's own exit code. `deadline_secs`
/// is the caller's deadline for the whole dispatch, inherited by the Master
/// when it proxies the call to the agent; `None` leaves the Master's own
/// default in force.
pub async fn run(
    master: &str,
    agent_name: &str,
    command: &str,
    deadline_secs: Option<u64>,
) -> CliResult<i32> {
    let (endpoint, addr) = dial(master)?;
    let request = RpcRequest::ExecuteCommand(ExecuteCommandRequest {
        agent_name: agent_name.to_string(),
        command: command.to_string(),
        deadline_secs,
    });
    let mut chunks = endpoint.call_streaming(addr, request, 32).await?;

    while let Some(chunk) = chunks.recv().await {
        if let Some(line) = chunk.stdout_chunk {
            print!("{line}");
            let _ = std::io::stdout().flush();
        }
        if let Some(line) = chunk.stderr_chunk {
            eprint!("{line}");
        }
        if chunk.finished {
            if let Some(error) = chunk.error {
                return Err(CliError::Remote(error));
            }
            return Ok(chunk.exit_code.unwrap_or(1));
        }
    }
    Err(CliError::Remote("agent output stream closed without a final chunk".to_string()))
}

/// `RunCommandRequest` is only ever issued agent-to-agent over the transport
/// the binary also exposes for direct, Master-less dispatch during manual
/// testing; kept alongside the client verbs above for discoverability.
pub async fn run_direct(agent_addr: &str, command: &str) -> CliResult<i32> {
    let (endpoint, addr) = dial(agent_addr)?;
    let request = RpcRequest::RunCommand(RunCommandRequest {
        command: command.to_string(),
        user: None,
    });
    let mut chunks = endpoint.call_streaming(addr, request, 32).await?;
    while let Some(chunk) = chunks.recv().await {
        if let Some(line) = chunk.stdout_chunk {
            print!("{line}");
        }
        if let Some(line) = chunk.stderr_chunk {
            eprint!("{line}");
        }
        if chunk.finished {
            if let Some(error) = chunk.error {
                return Err(CliError::Remote(error));
            }
            return Ok(chunk.exit_code.unwrap_or(1));
        }
    }
    Err(CliError::Remote("agent output stream closed without a final chunk".to_string()))
}

fn unexpected(response: RpcResponse) -> CliError {
    CliError::Remote(format!("unexpected response from Master: {response:?}"))
}
