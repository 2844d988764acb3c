// src/registry/sysinfo_table.rs

use anyhow::{Result, anyhow, bail};
use sysinfo::{ProcessRefreshKind, Signal, System, UpdateKind};

use crate::registry::{ProcessSnapshot, ProcessTable};
use crate::types::Pid;

/// [`ProcessTable`] backed by `sysinfo`.
///
/// Works on Linux, macOS and Windows. Processes owned by other users may show
/// an empty environment; they simply never match a marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoProcessTable;

impl ProcessTable for SysinfoProcessTable {
    fn snapshot(&self) -> Result<Vec<ProcessSnapshot>> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            bail!("process enumeration is not supported on this platform");
        }

        let mut system = System::new();
        system.refresh_processes_specifics(matching_kind());

        Ok(system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessSnapshot {
                pid: pid.as_u32(),
                name: process.name().to_string(),
                cmd: process.cmd().to_vec(),
                environ: process.environ().to_vec(),
            })
            .collect())
    }

    fn kill(&self, pid: Pid) -> Result<()> {
        let target = sysinfo::Pid::from_u32(pid.0);
        let mut system = System::new();
        if !system.refresh_process_specifics(target, ProcessRefreshKind::new()) {
            bail!("process {pid} does not exist");
        }
        let process = system
            .process(target)
            .ok_or_else(|| anyhow!("process {pid} does not exist"))?;

        let sent = process
            .kill_with(Signal::Kill)
            .unwrap_or_else(|| process.kill());
        if !sent {
            bail!("termination of process {pid} was refused");
        }
        Ok(())
    }

    fn current_pid(&self) -> Option<Pid> {
        sysinfo::get_current_pid().ok().map(|p| Pid(p.as_u32()))
    }
}

/// A plain refresh leaves cmd and environ empty; markers live there.
fn matching_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::new()
        .with_cmd(UpdateKind::Always)
        .with_environ(UpdateKind::Always)
}
