// src/exec/launcher.rs

//! Spawning of the supervised worker process.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::SystemTime;

use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::config::Configuration;
use crate::errors::{Result, SupervisorError};
use crate::exec::pump::{Sink, StreamPump};
use crate::registry::marker::{INSTANCE_ID_ENV, Marker};
use crate::types::{InstanceId, OutputTarget, Pid};

/// A freshly spawned worker, already bound to its stream pump.
#[derive(Debug)]
pub struct LaunchedProcess {
    pub id: InstanceId,
    pub marker: Marker,
    pub child: Child,
    pub pid: Option<Pid>,
    pub log_file: PathBuf,
    pub started_at: SystemTime,
    pub pump: StreamPump,
}

/// Builds the final command line and environment and starts the worker.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub fn new() -> Self {
        Self
    }

    /// `stdout-<id>.log` inside the worker directory.
    pub fn stdout_log_path(config: &Configuration, id: InstanceId) -> PathBuf {
        config.directory().join(format!("stdout-{id}.log"))
    }

    /// Variables set on top of the inherited environment.
    ///
    /// The configuration overlay first, then the instance marker, appended to
    /// the options channel (configured or `inherited_options`) rather than
    /// replacing it.
    pub fn build_environment(
        config: &Configuration,
        marker: &Marker,
        inherited_options: Option<&str>,
    ) -> BTreeMap<String, String> {
        let mut env = config.environment().clone();

        let options_var = config.options_env_var().to_string();
        let existing = env.get(&options_var).map(String::as_str).or(inherited_options);
        let options = marker.append_to(existing);
        env.insert(options_var, options);
        env.insert(INSTANCE_ID_ENV.to_string(), marker.env_value());
        env
    }

    /// Fail with `InvalidConfiguration` unless the worker directory exists
    /// and can be listed.
    pub fn ensure_directory(config: &Configuration) -> Result<()> {
        let dir = config.directory();
        if dir.as_os_str().is_empty() {
            return Err(SupervisorError::InvalidConfiguration(
                "directory of worker must be set".to_string(),
            ));
        }
        if !dir.is_dir() {
            return Err(SupervisorError::InvalidConfiguration(format!(
                "directory of worker must exist: {}",
                dir.display()
            )));
        }
        fs::read_dir(dir).map_err(|e| {
            SupervisorError::InvalidConfiguration(format!(
                "directory of worker is not readable: {}: {e}",
                dir.display()
            ))
        })?;
        Ok(())
    }

    /// Spawn the worker described by `config`.
    ///
    /// `sink` overrides the configured output target. Nothing is spawned when
    /// the directory check or the log file creation fails.
    pub fn launch(&self, config: &Configuration, sink: Option<Sink>) -> Result<LaunchedProcess> {
        Self::ensure_directory(config)?;

        let id = InstanceId::next();
        let marker = Marker::new(id);
        let log_file = Self::stdout_log_path(config, id);

        // Truncate up front so the pump always appends to a fresh file.
        File::create(&log_file)?;

        let sink = sink.unwrap_or_else(|| match config.output() {
            OutputTarget::File => Sink::File(log_file.clone()),
            OutputTarget::Inherit => Sink::Inherit,
            OutputTarget::Discard => Sink::Discard,
        });

        let argv = config.command_line();
        let inherited_options = std::env::var_os(config.options_env_var())
            .map(|v| v.to_string_lossy().into_owned());
        let env = Self::build_environment(config, &marker, inherited_options.as_deref());
        debug!(instance = %id, ?argv, "process arguments");

        let mut cmd = command_for(&argv, config.directory());
        cmd.envs(&env)
            .stdin(Stdio::null())
            .stdout(sink.stdio())
            .stderr(sink.stdio())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| SupervisorError::LaunchFailure {
            program: argv[0].clone(),
            source,
        })?;

        let pid = child.id().map(Pid);
        // On failure the child is dropped here and killed (kill_on_drop).
        let pump = StreamPump::attach(&mut child, &sink)?;

        info!(
            instance = %id,
            pid = ?pid,
            log = %log_file.display(),
            "worker process started"
        );

        Ok(LaunchedProcess {
            id,
            marker,
            child,
            pid,
            log_file,
            started_at: SystemTime::now(),
            pump,
        })
    }
}

fn command_for(argv: &[String], dir: &Path) -> Command {
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..]).current_dir(dir);
    cmd
}
