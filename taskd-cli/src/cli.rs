//! Command-line surface: `taskd master` and `taskd agent <start|list|get|delete|stop|run>`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Control-plane CLI for the task-execution system.
#[derive(Parser)]
#[command(name = "taskd", about = "Master/Agent control plane CLI", version)]
pub struct Cli {
    /// Top-level verb.
    #[command(subcommand)]
    pub command: Command,

    /// Path to a TOML config file (`master.toml` / `agent.toml`).
    #[arg(long, global = true, env = "TASKD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format: `human` (default) or `json`.
    #[arg(long, global = true, env = "TASKD_LOG_FORMAT")]
    pub log_format: Option<String>,

    /// Increase log verbosity; repeat for more (`-v`, `-vv`).
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Top-level verbs.
#[derive(Subcommand)]
pub enum Command {
    /// Start the Registry Service (Master).
    Master(MasterArgs),
    /// Agent process control and registry client operations.
    Agent {
        /// Agent subcommand.
        #[command(subcommand)]
        command: AgentCommand,
    },
}

/// `taskd master` arguments.
#[derive(Args)]
pub struct MasterArgs {
    /// Port the Registry Service listens on.
    #[arg(long)]
    pub port: Option<u16>,
    /// Directory holding the durable registry store.
    #[arg(long)]
    pub data_dir: Option<String>,
}

/// `taskd agent <subcommand>`.
#[derive(Subcommand)]
pub enum AgentCommand {
    /// Start this process as an agent runtime.
    Start(AgentStartArgs),
    /// List all agents known to the Master.
    List(MasterAddrArgs),
    /// Fetch one agent's current info.
    Get {
        /// Agent name to look up.
        agent_name: String,
        #[command(flatten)]
        master: MasterAddrArgs,
    },
    /// Remove an agent's registry record.
    Delete {
        /// Agent name to remove.
        agent_name: String,
        #[command(flatten)]
        master: MasterAddrArgs,
    },
    /// Request a graceful shutdown of a running agent.
    Stop {
        /// Agent name to stop.
        agent_name: String,
        #[command(flatten)]
        master: MasterAddrArgs,
    },
    /// Execute a shell command on a named agent and stream its output.
    Run {
        /// Agent name to dispatch to.
        agent_name: String,
        /// Shell command line to execute.
        command: String,
        /// Deadline for the whole dispatch, inherited by the Master's proxy
        /// call to the agent. Defaults to the Master's own dial timeout.
        #[arg(long)]
        deadline_secs: Option<u64>,
        #[command(flatten)]
        master: MasterAddrArgs,
    },
}

/// Shared `--master` flag for registry-client subcommands.
#[derive(Args)]
pub struct MasterAddrArgs {
    /// Master `host:port` to connect to.
    #[arg(long, env = "TASKD_MASTER_ADDRESS", default_value = "127.0.0.1:50053")]
    pub master: String,
}

/// `taskd agent start` arguments.
#[derive(Args)]
pub struct AgentStartArgs {
    /// This agent's unique name.
    pub agent_name: String,
    /// Port the agent's own RPC listener binds to.
    #[arg(long)]
    pub port: Option<u16>,
    /// Address to bind the listener on.
    #[arg(long)]
    pub bind: Option<String>,
    /// `host:port` this agent tells the Master to dial back.
    #[arg(long)]
    pub report_address: Option<String>,
    /// Master `host:port` to register and heartbeat against.
    #[arg(long)]
    pub master: Option<String>,
    /// Run without ever dialing a Master.
    #[arg(long)]
    pub standalone: bool,
}
