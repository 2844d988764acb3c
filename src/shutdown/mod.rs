// src/shutdown/mod.rs

//! Bounded, concurrent shutdown.
//!
//! The coordinator owns an ordered list of [`ShutdownHook`]s registered
//! during a start. `run_all` launches every hook on its own task, waits for
//! all of them against one shared deadline, and returns a [`ShutdownReport`]
//! naming the hooks that failed or were still running when the deadline hit.
//!
//! Hooks are consumed by a run: a second `run_all` without new registrations
//! is a no-op that reports nothing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub mod hooks;

pub use hooks::{DestroyProcessHook, FnHook, ReapOrphansHook, StopCommandHook, StopPumpHook};

/// Boxed future returned by [`ShutdownHook::run`].
pub type HookFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// One unit of cleanup work.
pub trait ShutdownHook: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self) -> HookFuture<'_>;
}

/// How a single hook ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Completed,
    Failed(String),
    /// Still running when the deadline elapsed; the task was aborted.
    Incomplete,
}

/// Result of one [`ShutdownCoordinator::run_all`].
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub outcomes: Vec<(String, HookOutcome)>,
    pub elapsed: Duration,
}

impl ShutdownReport {
    /// `true` when no hook was cut off by the deadline.
    ///
    /// Failed hooks still count as complete: they finished, just not well.
    pub fn is_complete(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, o)| !matches!(o, HookOutcome::Incomplete))
    }

    pub fn incomplete(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, HookOutcome::Incomplete))
            .map(|(n, _)| n.as_str())
            .collect()
    }

    pub fn failed(&self) -> Vec<(&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(n, o)| match o {
                HookOutcome::Failed(e) => Some((n.as_str(), e.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn outcome(&self, name: &str) -> Option<&HookOutcome> {
        self.outcomes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, o)| o)
    }
}

/// Ordered set of hooks run together at stop time.
#[derive(Default)]
pub struct ShutdownCoordinator {
    hooks: Vec<Arc<dyn ShutdownHook>>,
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("hooks", &self.hook_names())
            .finish()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_hook(&mut self, hook: impl ShutdownHook + 'static) {
        self.register_shared(Arc::new(hook));
    }

    pub fn register_shared(&mut self, hook: Arc<dyn ShutdownHook>) {
        debug!(hook = hook.name(), "shutdown hook registered");
        self.hooks.push(hook);
    }

    pub fn hook_names(&self) -> Vec<String> {
        self.hooks.iter().map(|h| h.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every registered hook concurrently and wait at most `timeout`.
    ///
    /// Hooks that do not finish in time are aborted and reported as
    /// [`HookOutcome::Incomplete`]; a failing hook never prevents the others
    /// from running.
    pub async fn run_all(&mut self, timeout: Duration) -> ShutdownReport {
        let hooks = std::mem::take(&mut self.hooks);
        let started = Instant::now();
        let deadline = started + timeout;

        if hooks.is_empty() {
            return ShutdownReport::default();
        }
        info!(hooks = hooks.len(), ?timeout, "running shutdown hooks");

        let handles: Vec<(String, JoinHandle<anyhow::Result<()>>)> = hooks
            .into_iter()
            .map(|hook| {
                let name = hook.name().to_string();
                let handle = tokio::spawn(async move { hook.run().await });
                (name, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (name, mut handle) in handles {
            let outcome = match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(Ok(()))) => {
                    debug!(hook = %name, "shutdown hook completed");
                    HookOutcome::Completed
                }
                Ok(Ok(Err(e))) => {
                    warn!(hook = %name, error = %format!("{e:#}"), "shutdown hook failed");
                    HookOutcome::Failed(format!("{e:#}"))
                }
                Ok(Err(join_err)) => {
                    error!(hook = %name, error = %join_err, "shutdown hook panicked");
                    HookOutcome::Failed(join_err.to_string())
                }
                Err(_) => {
                    handle.abort();
                    warn!(hook = %name, "shutdown hook did not finish in time");
                    HookOutcome::Incomplete
                }
            };
            outcomes.push((name, outcome));
        }

        let report = ShutdownReport {
            outcomes,
            elapsed: started.elapsed(),
        };
        info!(
            elapsed = ?report.elapsed,
            complete = report.is_complete(),
            "shutdown hooks finished"
        );
        report
    }
}
