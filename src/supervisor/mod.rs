// src/supervisor/mod.rs

//! The supervisor façade.
//!
//! A [`Supervisor`] owns at most one worker process at a time and walks it
//! through `Stopped → Starting → Running → Stopping → Stopped`. A worker
//! that never became ready sits in `Failed` until it is stopped or a later
//! `start` finds it ready.
//!
//! Responsibilities:
//! - Serialize `start` / `stop` behind a single async lock.
//! - Refuse to start when the liveness port already answers.
//! - Launch, probe and handshake in that order, failing fast.
//! - Close the control session strictly before the shutdown hooks run.
//! - Always finish `stop`, folding hook failures into the report.

use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::client::{Client, ControlSession};
use crate::config::{Configuration, SupervisorPolicy};
use crate::errors::{Result, SupervisorError};
use crate::exec::launcher::ProcessLauncher;
use crate::exec::pump::Sink;
use crate::readiness::{ReadinessProbe, await_client, is_port_open};
use crate::registry::ProcessRegistry;
use crate::shutdown::{ShutdownHook, ShutdownReport};
use crate::types::{InstanceId, Pid, SupervisorState};

mod instance;

pub use instance::InstanceInfo;
use instance::Instance;

const SESSION_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
struct Status {
    state: SupervisorState,
    current: Option<InstanceInfo>,
}

/// Lifecycle manager for one external worker process.
pub struct Supervisor<C: Client> {
    configuration: Arc<Configuration>,
    policy: SupervisorPolicy,
    launcher: ProcessLauncher,
    registry: Arc<ProcessRegistry>,
    session: Arc<Mutex<ControlSession<C>>>,
    lifecycle: Mutex<Option<Instance>>,
    status: StdMutex<Status>,
    sink: Option<Sink>,
}

impl<C: Client + 'static> std::fmt::Debug for Supervisor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("Supervisor")
            .field("host", &self.configuration.host())
            .field("port", &self.configuration.liveness_port())
            .field("state", &status.state)
            .field("instance", &status.current.as_ref().map(|i| i.id))
            .finish_non_exhaustive()
    }
}

impl<C: Client + 'static> Supervisor<C> {
    /// Build a supervisor; `factory` produces the control-plane client for
    /// this configuration.
    pub fn new<F>(configuration: Configuration, policy: SupervisorPolicy, factory: F) -> Self
    where
        F: FnOnce(&Configuration) -> C,
    {
        let client = factory(&configuration);
        let registry = ProcessRegistry::default().with_settle(policy.kill_settle);

        Self {
            configuration: Arc::new(configuration),
            policy,
            launcher: ProcessLauncher::new(),
            registry: Arc::new(registry),
            session: Arc::new(Mutex::new(ControlSession::new(client))),
            lifecycle: Mutex::new(None),
            status: StdMutex::new(Status::default()),
            sink: None,
        }
    }

    /// Send worker output to `sink` instead of the configured target.
    pub fn with_sink(mut self, sink: Sink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_registry(mut self, registry: ProcessRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn policy(&self) -> &SupervisorPolicy {
        &self.policy
    }

    pub fn state(&self) -> SupervisorState {
        self.status().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == SupervisorState::Running
    }

    pub fn instance(&self) -> Option<InstanceInfo> {
        self.status().current.clone()
    }

    pub fn instance_id(&self) -> Option<InstanceId> {
        self.status().current.as_ref().map(|i| i.id)
    }

    pub fn pid(&self) -> Option<Pid> {
        self.status().current.as_ref().and_then(|i| i.pid)
    }

    /// Captured stdout/stderr of the current instance.
    pub fn stdout_log_file(&self) -> Option<PathBuf> {
        self.status().current.as_ref().map(|i| i.log_file.clone())
    }

    /// The worker's own log file inside its log directory.
    ///
    /// Fails when the log directory is missing; a missing file is only
    /// reported with a warning since the worker may not have written yet.
    pub fn default_log_file(&self) -> Result<PathBuf> {
        let dir = self.configuration.log_dir();
        if !dir.is_dir() {
            return Err(SupervisorError::LogDirMissing(dir));
        }
        let file = dir.join(self.configuration.log_file_name());
        if !file.is_file() {
            warn!(file = %file.display(), "log file does not exist yet");
        }
        Ok(file)
    }

    /// Shared handle to the control session.
    pub fn session(&self) -> Arc<Mutex<ControlSession<C>>> {
        Arc::clone(&self.session)
    }

    /// Run one control-plane command against the running worker.
    pub async fn execute(&self, command: &str) -> Result<String> {
        if !self.is_running() {
            return Err(SupervisorError::NotRunning);
        }
        let mut session = self.session.lock().await;
        Ok(session.execute(command).await?)
    }

    /// Register an extra hook for the current instance.
    pub async fn add_shutdown_hook(&self, hook: impl ShutdownHook + 'static) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        match lifecycle.as_mut() {
            Some(instance) => {
                instance.coordinator.register_hook(hook);
                Ok(())
            }
            None => Err(SupervisorError::NotRunning),
        }
    }

    /// Start the worker and wait until it is ready.
    ///
    /// A second `start` while a ready instance exists is a no-op. When the
    /// probe or a mandatory handshake fails, the process is left running in
    /// `Failed` and remains owned so that `stop` can reclaim it; a later
    /// `start` probes that process again instead of spawning another.
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if let Some(instance) = lifecycle.as_ref() {
            let id = instance.info.id;
            if self.state() == SupervisorState::Running {
                warn!(instance = %id, "worker is already running");
                return Ok(());
            }
            info!(instance = %id, "worker did not come up earlier; probing it again");
            self.set_state(SupervisorState::Starting);
            return self.finish_start(id).await;
        }

        let config = &self.configuration;
        let (host, port) = (config.host(), config.liveness_port());

        if is_port_open(host, port, self.policy.connect_timeout).await {
            error!(host, port, "liveness port is already in use");
            return Err(SupervisorError::PortConflict {
                host: host.to_string(),
                port,
            });
        }

        self.set_state(SupervisorState::Starting);
        let launched = match self.launcher.launch(config, self.sink.clone()) {
            Ok(launched) => launched,
            Err(e) => {
                self.set_state(SupervisorState::Stopped);
                return Err(e);
            }
        };

        let instance = Instance::new(launched, config, &self.policy, &self.registry);
        let id = instance.info.id;
        self.status().current = Some(instance.info.clone());
        *lifecycle = Some(instance);

        self.finish_start(id).await
    }

    /// Stop with the configured shutdown timeout.
    pub async fn stop(&self) -> Option<ShutdownReport> {
        self.stop_with_timeout(self.policy.stop_timeout).await
    }

    /// Stop the worker within `timeout`, session close included.
    ///
    /// Returns `None` when nothing was running. Always leaves the supervisor
    /// `Stopped`, whatever the hooks did.
    pub async fn stop_with_timeout(&self, timeout: Duration) -> Option<ShutdownReport> {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(mut instance) = lifecycle.take() else {
            debug!("stop requested but worker is not running");
            return None;
        };

        let id = instance.info.id;
        info!(instance = %id, "stopping worker");
        self.set_state(SupervisorState::Stopping);

        let deadline = tokio::time::Instant::now() + timeout;
        self.close_session(timeout.min(SESSION_CLOSE_TIMEOUT)).await;

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let report = instance.coordinator.run_all(remaining).await;
        if !report.is_complete() {
            let err = SupervisorError::ShutdownIncomplete {
                hooks: report.incomplete().into_iter().map(String::from).collect(),
            };
            error!(instance = %id, error = %err, "shutdown was not completed");
        }

        debug!(instance = %id, marker = %instance.marker.option_token(), "instance released");
        drop(instance);

        let mut status = self.status();
        status.current = None;
        status.state = SupervisorState::Stopped;
        info!(instance = %id, elapsed = ?report.elapsed, "worker was stopped");

        Some(report)
    }

    async fn finish_start(&self, id: InstanceId) -> Result<()> {
        let result = self.bring_up(id).await;
        match &result {
            Ok(()) => {
                self.set_state(SupervisorState::Running);
                info!(instance = %id, "worker is running");
            }
            Err(e) => {
                self.set_state(SupervisorState::Failed);
                error!(
                    instance = %id,
                    error = %e,
                    "worker did not come up; stop() to reclaim it"
                );
            }
        }
        result
    }

    async fn bring_up(&self, id: InstanceId) -> Result<()> {
        let config = &self.configuration;
        let probe =
            ReadinessProbe::new(config.host(), config.liveness_port(), self.policy.readiness)
                .with_connect_timeout(self.policy.connect_timeout);

        if !probe.await_ready().await {
            return Err(SupervisorError::StartupTimeout {
                host: config.host().to_string(),
                port: config.liveness_port(),
                attempts: self.policy.readiness.attempts,
            });
        }

        let Some(command) = config.handshake_command() else {
            debug!(instance = %id, "worker has no control plane; skipping handshake");
            return Ok(());
        };

        let mut session = self.session.lock().await;
        match await_client(&mut *session, command, self.policy.handshake).await {
            Ok(()) => Ok(()),
            Err(e) if config.client_required() => Err(e),
            Err(e) => {
                warn!(
                    instance = %id,
                    error = %e,
                    "control plane is not usable; continuing without it"
                );
                Ok(())
            }
        }
    }

    async fn close_session(&self, limit: Duration) {
        let closing = async {
            let mut session = self.session.lock().await;
            session.close().await
        };
        match tokio::time::timeout(limit, closing).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %format!("{e:#}"), "closing control session failed"),
            Err(_) => warn!(timeout = ?limit, "closing control session timed out"),
        }
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, state: SupervisorState) {
        let mut status = self.status();
        debug!(from = ?status.state, to = ?state, "state transition");
        status.state = state;
    }
}
