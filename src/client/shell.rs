// src/client/shell.rs

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

use crate::client::{Client, ClientFuture};
use crate::exec::command::{run_command, run_to_completion, shell_command};

const PLACEHOLDER: &str = "{}";

/// Control plane backed by an external CLI tool.
///
/// Each `execute` runs the configured template with every `{}` replaced by
/// the command, e.g. `["bin/cli.sh", "--connect", "--command={}"]`. A
/// single-element template is a script line for the platform shell
/// (`sh -c` / `cmd /C`). A non-zero exit status is a failed command.
#[derive(Debug, Clone)]
pub struct ShellClient {
    template: Vec<String>,
    dir: Option<PathBuf>,
    timeout: Duration,
    connected: bool,
}

impl ShellClient {
    pub fn new(template: Vec<String>) -> Self {
        Self {
            template,
            dir: None,
            timeout: Duration::from_secs(60),
            connected: false,
        }
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Argument vector for one command.
    pub fn render(&self, command: &str) -> Vec<String> {
        if self.template.iter().any(|a| a.contains(PLACEHOLDER)) {
            self.template
                .iter()
                .map(|a| a.replace(PLACEHOLDER, command))
                .collect()
        } else {
            let mut argv = self.template.clone();
            argv.push(command.to_string());
            argv
        }
    }
}

impl Client for ShellClient {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn connect(&mut self) -> ClientFuture<'_, ()> {
        Box::pin(async move {
            if self.template.is_empty() {
                bail!("no control-plane command template configured");
            }
            self.connected = true;
            Ok(())
        })
    }

    fn execute<'a>(&'a mut self, command: &'a str) -> ClientFuture<'a, String> {
        Box::pin(async move {
            let argv = self.render(command);
            let output = match argv.as_slice() {
                [script] => {
                    let mut cmd = shell_command(script);
                    if let Some(dir) = &self.dir {
                        cmd.current_dir(dir);
                    }
                    run_command(cmd, script, self.timeout).await
                }
                _ => run_to_completion(&argv, self.dir.as_deref(), self.timeout).await,
            }
            .with_context(|| format!("running control-plane command '{command}'"))?;

            if !output.success() {
                bail!(
                    "control-plane command '{}' exited with {}: {}",
                    command,
                    output.code,
                    output.stderr.trim()
                );
            }
            Ok(output.stdout)
        })
    }

    fn close(&mut self) -> ClientFuture<'_, ()> {
        Box::pin(async move {
            self.connected = false;
            Ok(())
        })
    }
}
