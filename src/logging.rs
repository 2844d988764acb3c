// src/logging.rs

//! Logging setup for `procwarden` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `PROCWARDEN_LOG` environment variable, either a bare level ("debug")
//!    or a full directive ("procwarden=debug,procwarden::registry=trace")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that a worker running with an inherited console
//! keeps STDOUT to itself.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "PROCWARDEN_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    fmt()
        .with_env_filter(resolve_filter(cli_level))
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

/// Filter for the given CLI level, falling back to `PROCWARDEN_LOG`.
pub fn resolve_filter(cli_level: Option<LogLevel>) -> EnvFilter {
    if let Some(lvl) = cli_level {
        return EnvFilter::new(level_from_log_level(lvl).as_str());
    }
    match std::env::var(LOG_ENV_VAR) {
        Ok(s) if !s.trim().is_empty() => EnvFilter::try_new(normalize(&s))
            .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.as_str())),
        _ => EnvFilter::new(tracing::Level::INFO.as_str()),
    }
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

// "warning" is accepted as an alias for "warn".
fn normalize(s: &str) -> String {
    match s.trim().to_lowercase().as_str() {
        "warning" => "warn".to_string(),
        other => other.to_string(),
    }
}
