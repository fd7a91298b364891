//! `taskd`: Master, Agent, and registry-client verbs in one binary.

mod cli;
mod client;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use taskd_agent::AgentRuntime;
use taskd_config::{AgentConfig, AgentConfigArgs, LogFormat, MasterConfig, MasterConfigArgs};

use cli::{AgentCommand, Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let log_format = cli
        .log_format
        .as_deref()
        .and_then(|raw| raw.parse::<LogFormat>().ok())
        .unwrap_or_default();
    taskd_telemetry::init(log_format, cli.verbose);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("taskd: {err:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    match cli.command {
        Command::Master(args) => {
            let config_path = cli
                .config
                .unwrap_or_else(|| PathBuf::from("./master.toml"));
            let config = MasterConfig::load(
                &config_path,
                MasterConfigArgs {
                    listen_port: args.port,
                    data_dir: args.data_dir,
                    log_format: cli.log_format,
                },
            )
            .with_context(|| format!("loading master config from {}", config_path.display()))?;
            taskd_master::run(config)
                .await
                .context("running the Registry Service")?;
            Ok(0)
        }
        Command::Agent { command } => run_agent_command(command, cli.config).await,
    }
}

async fn run_agent_command(command: AgentCommand, config: Option<PathBuf>) -> anyhow::Result<u8> {
    match command {
        AgentCommand::Start(args) => {
            let config_path = config.unwrap_or_else(|| PathBuf::from("./agent.toml"));
            let agent_name = args.agent_name.clone();
            let agent_config = AgentConfig::load(
                &config_path,
                AgentConfigArgs {
                    listen_port: args.port,
                    bind_address: args.bind,
                    report_address: args.report_address,
                    agent_name: args.agent_name,
                    master_address: args.master,
                    standalone: args.standalone,
                    log_format: None,
                },
            )
            .with_context(|| format!("loading agent config from {}", config_path.display()))?;
            let runtime = AgentRuntime::new(agent_config)
                .with_context(|| format!("starting agent `{agent_name}`"))?;
            install_signal_shutdown(runtime.shutdown_signal());
            runtime.run().await.context("running the agent")?;
            Ok(0)
        }
        AgentCommand::List(master) => {
            client::list(&master.master).await.context("listing agents")?;
            Ok(0)
        }
        AgentCommand::Get { agent_name, master } => {
            client::get(&master.master, &agent_name)
                .await
                .with_context(|| format!("fetching agent `{agent_name}`"))?;
            Ok(0)
        }
        AgentCommand::Delete { agent_name, master } => {
            client::delete(&master.master, &agent_name)
                .await
                .with_context(|| format!("deleting agent `{agent_name}`"))?;
            Ok(0)
        }
        AgentCommand::Stop { agent_name, master } => {
            client::stop(&master.master, &agent_name)
                .await
                .with_context(|| format!("stopping agent `{agent_name}`"))?;
            Ok(0)
        }
        AgentCommand::Run {
            agent_name,
            command,
            deadline_secs,
            master,
        } => {
            let exit_code = client::run(&master.master, &agent_name, &command, deadline_secs)
                .await
                .with_context(|| format!("running command on agent `{agent_name}`"))?;
            Ok(exit_code.clamp(0, i32::from(u8::MAX)) as u8)
        }
    }
}

fn install_signal_shutdown(shutdown: taskd_agent::ShutdownSignal) {
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.trigger();
    });
}
