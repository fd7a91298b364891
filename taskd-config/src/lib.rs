//! Layered configuration (A1): TOML file + `TASKD_`-prefixed environment
//! variables + CLI flags, with precedence CLI > env > file > built-in default.
//!
//! Configuration is parsed and validated exactly once at process startup;
//! an invalid value is a fail-fast [`ConfigError`], never silently clamped.

#![warn(missing_docs, clippy::pedantic)]

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

const DEFAULT_MASTER_PORT: u16 = 50053;
const DEFAULT_AGENT_PORT: u16 = 50051;
const DEFAULT_ACTIVE_WINDOW_SECS: i64 = 60;
const DEFAULT_GC_RETENTION_HOURS: i64 = 24;
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 5;
const DEFAULT_SYSINFO_EVERY_N_HEARTBEATS: u32 = 12;
const DEFAULT_INITIAL_BACKOFF_SECS: u64 = 5;
const DEFAULT_MAX_BACKOFF_SECS: u64 = 60;
const DEFAULT_MAX_CONSECUTIVE_HEARTBEAT_FAILURES: u32 = 3;
const DEFAULT_MAX_CONCURRENT_DISPATCHES: u32 = 32;

/// Log output format, switchable at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable compact output (the default).
    #[default]
    Human,
    /// Newline-delimited JSON, for machine consumption.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Invalid(format!(
                "unknown log format `{other}`, expected `human` or `json`"
            ))),
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config value failed validation (zero interval, empty required field, etc).
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Default, Deserialize)]
struct TomlMasterConfig {
    listen_port: Option<u16>,
    active_window_secs: Option<i64>,
    gc_retention_hours: Option<i64>,
    gc_periodic: Option<bool>,
    log_format: Option<String>,
    data_dir: Option<String>,
}

/// Startup parameters for the Master process.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// Port the Registry Service listens on.
    pub listen_port: u16,
    /// Window within which a heartbeat counts as Active.
    pub active_window_secs: i64,
    /// Hours of inactivity after which `GCInactive` evicts a record.
    pub gc_retention_hours: i64,
    /// Whether to run `GCInactive` on a recurring background tick, not just at startup.
    pub gc_periodic: bool,
    /// Log output format.
    pub log_format: LogFormat,
    /// Directory holding the durable registry store.
    pub data_dir: String,
}

/// CLI-supplied overrides for [`MasterConfig`]; `None` means "not passed on the command line".
#[derive(Debug, Default)]
pub struct MasterConfigArgs {
    /// `--port`.
    pub listen_port: Option<u16>,
    /// `--data-dir`.
    pub data_dir: Option<String>,
    /// `--log-format`.
    pub log_format: Option<String>,
}

impl MasterConfig {
    /// Loads configuration from `{config_path}` (if it exists), layering
    /// `TASKD_*` environment variables and then `args` on top, in that order
    /// of increasing priority.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if any resolved value fails validation.
    pub fn load(config_path: &Path, args: MasterConfigArgs) -> ConfigResult<Self> {
        let file = load_toml::<TomlMasterConfig>(config_path);

        let listen_port = args
            .listen_port
            .or_else(|| env_parsed("TASKD_MASTER_PORT"))
            .or(file.listen_port)
            .unwrap_or(DEFAULT_MASTER_PORT);

        let active_window_secs = env_parsed("TASKD_ACTIVE_WINDOW_SECS")
            .or(file.active_window_secs)
            .unwrap_or(DEFAULT_ACTIVE_WINDOW_SECS);

        let gc_retention_hours = env_parsed("TASKD_GC_RETENTION_HOURS")
            .or(file.gc_retention_hours)
            .unwrap_or(DEFAULT_GC_RETENTION_HOURS);

        let gc_periodic = env_parsed("TASKD_GC_PERIODIC")
            .or(file.gc_periodic)
            .unwrap_or(false);

        let log_format_raw = args
            .log_format
            .or_else(|| std::env::var("TASKD_LOG_FORMAT").ok())
            .or(file.log_format)
            .unwrap_or_else(|| "human".to_string());
        let log_format = log_format_raw.parse()?;

        let data_dir = args
            .data_dir
            .or_else(|| std::env::var("TASKD_DATA_DIR").ok())
            .or(file.data_dir)
            .unwrap_or_else(|| "./taskd-data".to_string());

        if active_window_secs <= 0 {
            return Err(ConfigError::Invalid(
                "active_window_secs must be positive".into(),
            ));
        }
        if gc_retention_hours < 0 {
            return Err(ConfigError::Invalid(
                "gc_retention_hours must not be negative".into(),
            ));
        }

        Ok(Self {
            listen_port,
            active_window_secs,
            gc_retention_hours,
            gc_periodic,
            log_format,
            data_dir,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct TomlAgentConfig {
    listen_port: Option<u16>,
    bind_address: Option<String>,
    report_address: Option<String>,
    master_address: Option<String>,
    heartbeat_interval_secs: Option<u64>,
    sysinfo_every_n_heartbeats: Option<u32>,
    initial_backoff_secs: Option<u64>,
    max_backoff_secs: Option<u64>,
    max_consecutive_heartbeat_failures: Option<u32>,
    max_concurrent_dispatches: Option<u32>,
    log_format: Option<String>,
}

/// Startup parameters for an Agent process.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Port the agent's own RPC listener binds to.
    pub listen_port: u16,
    /// Address to bind the listener on (defaults to all interfaces).
    pub bind_address: String,
    /// `host:port` the agent tells the Master to dial back; defaults to `bind_address:listen_port`.
    pub report_address: Option<String>,
    /// Unique agent name used at registration.
    pub agent_name: String,
    /// Master's `host:port`. `None` only when `standalone` is set.
    pub master_address: Option<String>,
    /// If true, the agent never attempts to dial a Master.
    pub standalone: bool,
    /// Heartbeat cadence.
    pub heartbeat_interval_secs: u64,
    /// Attach a system-info snapshot every N heartbeats.
    pub sysinfo_every_n_heartbeats: u32,
    /// Initial reconnect backoff.
    pub initial_backoff_secs: u64,
    /// Reconnect backoff ceiling.
    pub max_backoff_secs: u64,
    /// Consecutive heartbeat failures before the connection is torn down.
    pub max_consecutive_heartbeat_failures: u32,
    /// Upper bound on `RunCommand`/`ExecuteTask` dispatches served concurrently.
    pub max_concurrent_dispatches: u32,
    /// Log output format.
    pub log_format: LogFormat,
}

/// CLI-supplied overrides for [`AgentConfig`].
#[derive(Debug, Default)]
pub struct AgentConfigArgs {
    /// `--port`.
    pub listen_port: Option<u16>,
    /// `--bind`.
    pub bind_address: Option<String>,
    /// `--report-address`.
    pub report_address: Option<String>,
    /// Required positional/flag: this agent's unique name.
    pub agent_name: String,
    /// `--master`.
    pub master_address: Option<String>,
    /// `--standalone`.
    pub standalone: bool,
    /// `--log-format`.
    pub log_format: Option<String>,
}

impl AgentConfig {
    /// Loads configuration the same way [`MasterConfig::load`] does.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if any resolved value fails validation,
    /// including the required-Master-address rule from §9: an agent started
    /// without `--standalone` must resolve a non-empty `master_address`.
    pub fn load(config_path: &Path, args: AgentConfigArgs) -> ConfigResult<Self> {
        if args.agent_name.trim().is_empty() {
            return Err(ConfigError::Invalid("agent name must not be empty".into()));
        }

        let file = load_toml::<TomlAgentConfig>(config_path);

        let listen_port = args
            .listen_port
            .or_else(|| env_parsed("TASKD_AGENT_PORT"))
            .or(file.listen_port)
            .unwrap_or(DEFAULT_AGENT_PORT);

        let bind_address = args
            .bind_address
            .or_else(|| std::env::var("TASKD_BIND_ADDRESS").ok())
            .or(file.bind_address)
            .unwrap_or_else(|| "0.0.0.0".to_string());

        let report_address = args
            .report_address
            .or_else(|| std::env::var("TASKD_REPORT_ADDRESS").ok())
            .or(file.report_address);

        let master_address = args
            .master_address
            .or_else(|| std::env::var("TASKD_MASTER_ADDRESS").ok())
            .or(file.master_address);

        if !args.standalone && master_address.as_deref().unwrap_or("").trim().is_empty() {
            return Err(ConfigError::Invalid(
                "agent requires --master (or TASKD_MASTER_ADDRESS / config master_address) \
                 unless started with --standalone"
                    .into(),
            ));
        }

        let heartbeat_interval_secs = env_parsed("TASKD_HEARTBEAT_INTERVAL_SECS")
            .or(file.heartbeat_interval_secs)
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_SECS);

        let sysinfo_every_n_heartbeats = env_parsed("TASKD_SYSINFO_EVERY_N_HEARTBEATS")
            .or(file.sysinfo_every_n_heartbeats)
            .unwrap_or(DEFAULT_SYSINFO_EVERY_N_HEARTBEATS);

        let initial_backoff_secs = env_parsed("TASKD_INITIAL_BACKOFF_SECS")
            .or(file.initial_backoff_secs)
            .unwrap_or(DEFAULT_INITIAL_BACKOFF_SECS);

        let max_backoff_secs = env_parsed("TASKD_MAX_BACKOFF_SECS")
            .or(file.max_backoff_secs)
            .unwrap_or(DEFAULT_MAX_BACKOFF_SECS);

        let max_consecutive_heartbeat_failures =
            env_parsed("TASKD_MAX_CONSECUTIVE_HEARTBEAT_FAILURES")
                .or(file.max_consecutive_heartbeat_failures)
                .unwrap_or(DEFAULT_MAX_CONSECUTIVE_HEARTBEAT_FAILURES);

        let max_concurrent_dispatches = env_parsed("TASKD_MAX_CONCURRENT_DISPATCHES")
            .or(file.max_concurrent_dispatches)
            .unwrap_or(DEFAULT_MAX_CONCURRENT_DISPATCHES);

        let log_format_raw = args
            .log_format
            .or_else(|| std::env::var("TASKD_LOG_FORMAT").ok())
            .or(file.log_format)
            .unwrap_or_else(|| "human".to_string());
        let log_format = log_format_raw.parse()?;

        if heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_secs must be positive".into(),
            ));
        }
        if initial_backoff_secs == 0 || max_backoff_secs < initial_backoff_secs {
            return Err(ConfigError::Invalid(
                "backoff bounds must be positive with max >= initial".into(),
            ));
        }
        if max_concurrent_dispatches == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_dispatches must be positive".into(),
            ));
        }

        Ok(Self {
            listen_port,
            bind_address,
            report_address,
            agent_name: args.agent_name,
            master_address,
            standalone: args.standalone,
            heartbeat_interval_secs,
            sysinfo_every_n_heartbeats,
            initial_backoff_secs,
            max_backoff_secs,
            max_consecutive_heartbeat_failures,
            max_concurrent_dispatches,
            log_format,
        })
    }
}

fn load_toml<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> T {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return T::default();
    };
    match toml::from_str(&contents) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(path = %path.display(), %err, "failed to parse config file, using defaults");
            T::default()
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_defaults_apply_when_nothing_overrides() {
        let missing = Path::new("/nonexistent/master.toml");
        let cfg = MasterConfig::load(missing, MasterConfigArgs::default()).unwrap();
        assert_eq!(cfg.listen_port, DEFAULT_MASTER_PORT);
        assert_eq!(cfg.gc_retention_hours, DEFAULT_GC_RETENTION_HOURS);
    }

    #[test]
    fn master_cli_overrides_file_and_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.toml");
        std::fs::write(&path, "listen_port = 9000\n").unwrap();

        let args = MasterConfigArgs {
            listen_port: Some(9999),
            ..Default::default()
        };
        let cfg = MasterConfig::load(&path, args).unwrap();
        assert_eq!(cfg.listen_port, 9999);
    }

    #[test]
    fn master_file_overrides_default_when_no_cli() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.toml");
        std::fs::write(&path, "listen_port = 9000\n").unwrap();

        let cfg = MasterConfig::load(&path, MasterConfigArgs::default()).unwrap();
        assert_eq!(cfg.listen_port, 9000);
    }

    #[test]
    fn agent_without_master_or_standalone_is_rejected() {
        let missing = Path::new("/nonexistent/agent.toml");
        let args = AgentConfigArgs {
            agent_name: "alpha".into(),
            ..Default::default()
        };
        let err = AgentConfig::load(missing, args).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn agent_standalone_does_not_require_master_address() {
        let missing = Path::new("/nonexistent/agent.toml");
        let args = AgentConfigArgs {
            agent_name: "alpha".into(),
            standalone: true,
            ..Default::default()
        };
        let cfg = AgentConfig::load(missing, args).unwrap();
        assert!(cfg.master_address.is_none());
    }

    #[test]
    fn agent_empty_name_is_rejected() {
        let missing = Path::new("/nonexistent/agent.toml");
        let args = AgentConfigArgs {
            agent_name: "   ".into(),
            standalone: true,
            ..Default::default()
        };
        assert!(AgentConfig::load(missing, args).is_err());
    }
}
