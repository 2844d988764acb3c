// src/shutdown/hooks.rs

//! Built-in shutdown hooks.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::exec::command::run_to_completion;
use crate::exec::pump::StreamPump;
use crate::registry::{Marker, ProcessRegistry};
use crate::shutdown::{HookFuture, ShutdownHook};

pub const DESTROY_PROCESS: &str = "destroy-process";
pub const STOP_STREAM_PUMP: &str = "stop-stream-pump";
pub const REAP_ORPHANS: &str = "reap-orphans";
pub const STOP_COMMAND: &str = "stop-command";

/// Terminate the worker: polite signal first, forced kill after
/// `grace`.
///
/// Safe to run on an already exited child.
pub struct DestroyProcessHook {
    child: Arc<Mutex<Child>>,
    grace: Duration,
}

impl DestroyProcessHook {
    pub fn new(child: Arc<Mutex<Child>>, grace: Duration) -> Self {
        Self { child, grace }
    }
}

impl ShutdownHook for DestroyProcessHook {
    fn name(&self) -> &str {
        DESTROY_PROCESS
    }

    fn run(&self) -> HookFuture<'_> {
        Box::pin(async move {
            let mut child = self.child.lock().await;

            if let Some(status) = child.try_wait()? {
                debug!(?status, "worker already exited");
                return Ok(());
            }

            if request_termination(&child) {
                match tokio::time::timeout(self.grace, child.wait()).await {
                    Ok(status) => {
                        let status = status.context("waiting for worker to exit")?;
                        info!(?status, "worker exited after termination request");
                        return Ok(());
                    }
                    Err(_) => {
                        warn!(grace = ?self.grace, "worker ignored termination request; killing");
                    }
                }
            }

            child.kill().await.context("killing worker process")?;
            info!("worker process was killed");
            Ok(())
        })
    }
}

#[cfg(unix)]
fn request_termination(child: &Child) -> bool {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(raw) = child.id() else {
        return false;
    };
    match kill(Pid::from_raw(raw as i32), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            debug!(pid = raw, error = %e, "SIGTERM could not be delivered");
            false
        }
    }
}

#[cfg(not(unix))]
fn request_termination(_child: &Child) -> bool {
    false
}

/// Flush and join the output readers.
pub struct StopPumpHook {
    pump: Arc<StreamPump>,
    drain_timeout: Duration,
}

impl StopPumpHook {
    pub fn new(pump: Arc<StreamPump>, drain_timeout: Duration) -> Self {
        Self {
            pump,
            drain_timeout,
        }
    }
}

impl ShutdownHook for StopPumpHook {
    fn name(&self) -> &str {
        STOP_STREAM_PUMP
    }

    fn run(&self) -> HookFuture<'_> {
        Box::pin(async move {
            // Readers normally see end-of-input once the worker dies.
            if !self.pump.join(self.drain_timeout).await {
                debug!("output readers were stopped before end of input");
            }
            debug!(lines = self.pump.lines_written(), "output pump stopped");
            Ok(())
        })
    }
}

/// Force-kill processes still carrying the instance marker once the
/// orderly part of the shutdown had `grace` to finish.
pub struct ReapOrphansHook {
    registry: Arc<ProcessRegistry>,
    marker: Marker,
    grace: Duration,
    poll: Duration,
}

impl ReapOrphansHook {
    pub fn new(registry: Arc<ProcessRegistry>, marker: Marker, grace: Duration) -> Self {
        Self {
            registry,
            marker,
            grace,
            poll: Duration::from_secs(1),
        }
    }
}

impl ShutdownHook for ReapOrphansHook {
    fn name(&self) -> &str {
        REAP_ORPHANS
    }

    fn run(&self) -> HookFuture<'_> {
        Box::pin(async move {
            let deadline = tokio::time::Instant::now() + self.grace;

            loop {
                let pids = self.registry.find_pids(&self.marker).await;
                if pids.is_empty() {
                    debug!(instance = %self.marker.id(), "no processes left for instance");
                    return Ok(());
                }
                if tokio::time::Instant::now() >= deadline {
                    warn!(
                        instance = %self.marker.id(),
                        ?pids,
                        "instance processes survived shutdown; force-killing"
                    );
                    let killed = self.registry.kill_all(&pids).await;
                    if killed < pids.len() {
                        bail!(
                            "{} of {} orphaned processes could not be killed",
                            pids.len() - killed,
                            pids.len()
                        );
                    }
                    return Ok(());
                }
                tokio::time::sleep(self.poll).await;
            }
        })
    }
}

/// Ask the worker to stop itself through a product-specific script.
pub struct StopCommandHook {
    argv: Vec<String>,
    dir: Option<PathBuf>,
    timeout: Duration,
}

impl StopCommandHook {
    pub fn new(argv: Vec<String>, dir: Option<PathBuf>, timeout: Duration) -> Self {
        Self { argv, dir, timeout }
    }
}

impl ShutdownHook for StopCommandHook {
    fn name(&self) -> &str {
        STOP_COMMAND
    }

    fn run(&self) -> HookFuture<'_> {
        Box::pin(async move {
            let output = run_to_completion(&self.argv, self.dir.as_deref(), self.timeout).await?;
            if !output.success() {
                bail!(
                    "stop command exited with {}: {}",
                    output.code,
                    output.stderr.trim()
                );
            }
            Ok(())
        })
    }
}

/// Named hook built from a closure returning a future.
pub struct FnHook<F> {
    name: String,
    f: F,
}

impl<F, Fut> FnHook<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F, Fut> ShutdownHook for FnHook<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self) -> HookFuture<'_> {
        Box::pin((self.f)())
    }
}
