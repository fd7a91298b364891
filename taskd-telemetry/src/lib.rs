//! Logging & Diagnostics (A2): a single global tracing subscriber installed
//! once at process startup, human-readable by default and switchable to
//! newline-delimited JSON.

#![warn(missing_docs, clippy::pedantic)]

use taskd_config::LogFormat;
use tracing_subscriber::EnvFilter;

/// Builds the effective filter directive from `RUST_LOG` (if set) or a
/// verbosity count (`-v`, `-vv`, ...), defaulting to `info`.
fn filter_directive(verbosity: u8) -> String {
    if let Ok(from_env) = std::env::var("RUST_LOG") {
        return from_env;
    }
    match verbosity {
        0 => "info".to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Installs the global tracing subscriber. Must be called exactly once, as
/// early as possible in `main`.
pub fn init(format: LogFormat, verbosity: u8) {
    let filter = EnvFilter::new(filter_directive(verbosity));

    match format {
        LogFormat::Human => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .compact()
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_zero_defaults_to_info_without_rust_log() {
        std::env::remove_var("RUST_LOG");
        assert_eq!(filter_directive(0), "info");
        assert_eq!(filter_directive(1), "debug");
        assert_eq!(filter_directive(5), "trace");
    }
}
