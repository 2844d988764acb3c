// src/exec/command.rs

//! Run short-lived helper commands to completion.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::process::Command;
use tracing::{debug, info};

/// Captured result of a helper command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Build a shell command appropriate for the platform.
pub fn shell_command(script: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(script);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(script);
        c
    }
}

/// Run `argv` and wait at most `timeout` for it to finish.
///
/// A timed-out command is killed (kill_on_drop) and reported as an error.
pub async fn run_to_completion(
    argv: &[String],
    dir: Option<&Path>,
    timeout: Duration,
) -> Result<CommandOutput> {
    let Some((program, args)) = argv.split_first() else {
        bail!("cannot run an empty command");
    };

    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    run_command(cmd, &argv.join(" "), timeout).await
}

/// Same as [`run_to_completion`] for an already prepared `Command`.
pub async fn run_command(
    mut cmd: Command,
    shown: &str,
    timeout: Duration,
) -> Result<CommandOutput> {
    info!(cmd = %shown, "running helper command");

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd
        .spawn()
        .with_context(|| format!("spawning helper command '{shown}'"))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .with_context(|| format!("helper command '{shown}' did not finish in {timeout:?}"))?
        .with_context(|| format!("waiting for helper command '{shown}'"))?;

    let code = output.status.code().unwrap_or(-1);
    debug!(cmd = %shown, exit_code = code, "helper command exited");

    Ok(CommandOutput {
        code,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
