// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Startup errors are returned to the caller of `Supervisor::start`.
//! Shutdown problems never surface here as `Err`; they are folded into the
//! `ShutdownReport` and logged (see [`crate::shutdown`]).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The worker directory is missing or unreadable.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Something already answers on the liveness port.
    #[error("Another process already uses {host}:{port}")]
    PortConflict { host: String, port: u16 },

    /// The OS refused to spawn the worker.
    #[error("Failed to launch '{program}': {source}")]
    LaunchFailure {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The liveness port never became connectable.
    #[error("Worker was not started: {host}:{port} not reachable after {attempts} attempts")]
    StartupTimeout {
        host: String,
        port: u16,
        attempts: u32,
    },

    /// The control plane never accepted the handshake command.
    #[error("Client was not connected to worker after {attempts} attempts: {last_error}")]
    ClientHandshakeFailure { attempts: u32, last_error: String },

    /// One or more shutdown hooks failed or did not finish in time.
    #[error("Shutdown did not complete cleanly; unfinished hooks: {hooks:?}")]
    ShutdownIncomplete { hooks: Vec<String> },

    /// No OS process carries the requested instance marker.
    #[error("No process found for instance {0}")]
    PidResolutionFailure(String),

    #[error("Worker is not running")]
    NotRunning,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Log directory was not found: {0:?}")]
    LogDirMissing(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SupervisorError>;
