// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually starting the worker process,
//! using `tokio::process::Command`, and for keeping its output flowing.
//!
//! - [`launcher`] builds the argument vector and environment, tags the
//!   process with its instance marker and spawns it.
//! - [`pump`] drains stdout/stderr into a [`Sink`] on background tasks.
//! - [`command`] runs short helper commands (stop scripts, CLI adapters)
//!   to completion with a bounded wait.

pub mod command;
pub mod launcher;
pub mod pump;

pub use command::{CommandOutput, run_to_completion, shell_command};
pub use launcher::{LaunchedProcess, ProcessLauncher};
pub use pump::{MemoryBuffer, SharedWriter, Sink, StreamPump};
