// src/registry/mod.rs

//! Correlation of logical instances with OS processes.
//!
//! The registry enumerates live processes through a [`ProcessTable`], looks
//! for the instance [`Marker`] in each candidate's environment and command
//! line, and force-kills matches. It is used at shutdown time only; nothing
//! it finds is cached across attempts.
//!
//! Rules:
//! - The hosting process is always skipped, even if it carries the marker.
//! - Lookups never fail: tool errors and misses are logged and yield nothing.
//! - `kill` is forceful; grace periods belong to the shutdown hooks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::errors::SupervisorError;
use crate::types::Pid;

pub mod marker;
pub mod sysinfo_table;

pub use marker::Marker;
pub use sysinfo_table::SysinfoProcessTable;

/// What the registry knows about one live process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    pub cmd: Vec<String>,
    /// `KEY=value` entries.
    pub environ: Vec<String>,
}

/// Source of process information and forced termination.
pub trait ProcessTable: Send + Sync {
    /// Enumerate the processes visible to the supervisor.
    fn snapshot(&self) -> Result<Vec<ProcessSnapshot>>;

    /// Forcefully terminate `pid` (SIGKILL / TerminateProcess).
    fn kill(&self, pid: Pid) -> Result<()>;

    /// Pid of the hosting process.
    fn current_pid(&self) -> Option<Pid>;
}

/// Finds and kills processes tagged with an instance marker.
#[derive(Clone)]
pub struct ProcessRegistry {
    table: Arc<dyn ProcessTable>,
    settle: Duration,
}

impl std::fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRegistry")
            .field("settle", &self.settle)
            .finish_non_exhaustive()
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new(Arc::new(SysinfoProcessTable), Duration::from_secs(15))
    }
}

impl ProcessRegistry {
    pub fn new(table: Arc<dyn ProcessTable>, settle: Duration) -> Self {
        Self { table, settle }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// First live process carrying `marker`.
    pub async fn find_pid(&self, marker: &Marker) -> Option<Pid> {
        let pid = self.find_pids(marker).await.into_iter().next();
        if pid.is_none() {
            debug!(
                error = %SupervisorError::PidResolutionFailure(marker.id().to_string()),
                "nothing to force-kill"
            );
        }
        pid
    }

    /// Every live process carrying `marker`, hosting process excluded.
    pub async fn find_pids(&self, marker: &Marker) -> Vec<Pid> {
        let marker = *marker;
        self.scan(move |p| marker.matches(p)).await
    }

    /// Processes whose command line contains `needle`.
    pub async fn find_pids_by_name(&self, needle: &str) -> Vec<Pid> {
        let needle = needle.to_string();
        self.scan(move |p| p.name.contains(&needle) || p.cmd.iter().any(|a| a.contains(&needle)))
            .await
    }

    /// Force-kill `pid`, then wait for the settle delay.
    ///
    /// Returns whether the kill itself succeeded; failures are logged.
    pub async fn kill(&self, pid: Pid) -> bool {
        let killed = self.kill_now(pid).await;
        self.wait_settle().await;
        killed
    }

    /// Force-kill a batch of processes with a single settle delay.
    ///
    /// Returns the number of successful kills.
    pub async fn kill_all(&self, pids: &[Pid]) -> usize {
        if pids.is_empty() {
            return 0;
        }
        let mut killed = 0;
        for pid in pids {
            if self.kill_now(*pid).await {
                killed += 1;
            }
        }
        self.wait_settle().await;
        killed
    }

    /// Force-kill the process carrying `marker`, if any.
    pub async fn kill_by_marker(&self, marker: &Marker) -> bool {
        match self.find_pid(marker).await {
            Some(pid) => {
                debug!(instance = %marker.id(), %pid, "instance resolved to pid");
                self.kill(pid).await
            }
            None => {
                error!(instance = %marker.id(), "process representing instance was not found");
                false
            }
        }
    }

    /// Force-kill every process whose command line contains `needle`.
    pub async fn kill_by_name(&self, needle: &str) -> usize {
        let pids = self.find_pids_by_name(needle).await;
        self.kill_all(&pids).await
    }

    async fn scan<F>(&self, predicate: F) -> Vec<Pid>
    where
        F: Fn(&ProcessSnapshot) -> bool + Send + 'static,
    {
        let table = Arc::clone(&self.table);
        let joined = tokio::task::spawn_blocking(move || {
            let own = table.current_pid();
            table.snapshot().map(|procs| {
                procs
                    .iter()
                    .filter(|p| Some(Pid(p.pid)) != own)
                    .filter(|p| predicate(p))
                    .map(|p| Pid(p.pid))
                    .collect::<Vec<_>>()
            })
        })
        .await;

        match joined {
            Ok(Ok(pids)) => pids,
            Ok(Err(e)) => {
                warn!(error = %format!("{e:#}"), "process table unavailable");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "process table scan panicked or was cancelled");
                Vec::new()
            }
        }
    }

    async fn kill_now(&self, pid: Pid) -> bool {
        let table = Arc::clone(&self.table);
        match tokio::task::spawn_blocking(move || table.kill(pid)).await {
            Ok(Ok(())) => {
                info!(%pid, "process was killed");
                true
            }
            Ok(Err(e)) => {
                error!(%pid, error = %format!("{e:#}"), "process was not killed");
                false
            }
            Err(e) => {
                error!(%pid, error = %e, "kill task failed");
                false
            }
        }
    }

    async fn wait_settle(&self) {
        // The OS may still hold the listening port for a moment after a kill.
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
    }
}
