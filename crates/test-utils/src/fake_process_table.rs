use std::sync::Mutex;

use anyhow::bail;
use procwarden::Pid;
use procwarden::registry::{ProcessSnapshot, ProcessTable};

/// In-memory process table.
///
/// `kill` removes the process and records its pid; `unavailable()` makes
/// every snapshot fail, like a missing introspection tool.
#[derive(Debug, Default)]
pub struct FakeProcessTable {
    processes: Mutex<Vec<ProcessSnapshot>>,
    killed: Mutex<Vec<Pid>>,
    current: Option<Pid>,
    unavailable: bool,
    refuse_kills: bool,
}

impl FakeProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_current(mut self, pid: u32) -> Self {
        self.current = Some(Pid(pid));
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn refusing_kills(mut self) -> Self {
        self.refuse_kills = true;
        self
    }

    /// Add a process with the given command line and `KEY=value` env.
    pub fn with_process(self, pid: u32, cmd: &[&str], environ: &[&str]) -> Self {
        self.processes.lock().unwrap().push(ProcessSnapshot {
            pid,
            name: cmd.first().map(|s| s.to_string()).unwrap_or_default(),
            cmd: cmd.iter().map(|s| s.to_string()).collect(),
            environ: environ.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn killed(&self) -> Vec<Pid> {
        self.killed.lock().unwrap().clone()
    }

    pub fn alive(&self) -> Vec<u32> {
        self.processes.lock().unwrap().iter().map(|p| p.pid).collect()
    }
}

impl ProcessTable for FakeProcessTable {
    fn snapshot(&self) -> anyhow::Result<Vec<ProcessSnapshot>> {
        if self.unavailable {
            bail!("process listing tool not found");
        }
        Ok(self.processes.lock().unwrap().clone())
    }

    fn kill(&self, pid: Pid) -> anyhow::Result<()> {
        if self.refuse_kills {
            bail!("termination of process {pid} exited with status 1");
        }
        let mut processes = self.processes.lock().unwrap();
        let before = processes.len();
        processes.retain(|p| p.pid != pid.0);
        if processes.len() == before {
            bail!("process {pid} does not exist");
        }
        self.killed.lock().unwrap().push(pid);
        Ok(())
    }

    fn current_pid(&self) -> Option<Pid> {
        self.current
    }
}
