// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `procwarden`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "procwarden",
    version,
    about = "Start a long-running worker, wait until it is ready, and tear it down cleanly.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the worker file (TOML).
    ///
    /// Default: `Procwarden.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Procwarden.toml")]
    pub config: String,

    /// Stop the worker right after a successful start.
    #[arg(long)]
    pub once: bool,

    /// Extra runtime parameter appended to the command line (repeatable).
    #[arg(long, value_name = "PARAM", allow_hyphen_values = true)]
    pub param: Vec<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROCWARDEN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the launch plan, but don't spawn anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
