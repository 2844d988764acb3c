// src/supervisor/instance.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::process::Child;
use tokio::sync::Mutex;

use crate::config::{Configuration, SupervisorPolicy};
use crate::exec::launcher::LaunchedProcess;
use crate::exec::pump::StreamPump;
use crate::registry::{Marker, ProcessRegistry};
use crate::shutdown::{
    DestroyProcessHook, ReapOrphansHook, ShutdownCoordinator, StopCommandHook, StopPumpHook,
};
use crate::types::{InstanceId, Pid};

/// Public view of the running instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub id: InstanceId,
    pub pid: Option<Pid>,
    pub log_file: PathBuf,
    pub started_at: SystemTime,
}

/// Runtime state of the one process a supervisor owns.
///
/// The child handle and the pump are shared with the hooks that tear them
/// down; nothing else holds on to them.
pub(crate) struct Instance {
    pub(crate) info: InstanceInfo,
    pub(crate) marker: Marker,
    pub(crate) coordinator: ShutdownCoordinator,
}

impl Instance {
    /// Take ownership of a launched process and register its mandatory
    /// hooks.
    pub(crate) fn new(
        launched: LaunchedProcess,
        config: &Configuration,
        policy: &SupervisorPolicy,
        registry: &Arc<ProcessRegistry>,
    ) -> Self {
        let LaunchedProcess {
            id,
            marker,
            child,
            pid,
            log_file,
            started_at,
            pump,
        } = launched;

        let child: Arc<Mutex<Child>> = Arc::new(Mutex::new(child));
        let pump: Arc<StreamPump> = Arc::new(pump);

        let mut coordinator = ShutdownCoordinator::new();
        coordinator.register_hook(DestroyProcessHook::new(child, policy.destroy_timeout));
        coordinator.register_hook(StopPumpHook::new(pump, policy.drain_timeout));

        if policy.reap_orphans {
            // Reaping starts only once the polite destroy has had its chance.
            coordinator.register_hook(ReapOrphansHook::new(
                Arc::clone(registry),
                marker,
                policy.destroy_timeout + policy.orphan_grace,
            ));
        }

        if let Some(argv) = config.stop_command() {
            coordinator.register_hook(StopCommandHook::new(
                argv.to_vec(),
                Some(config.directory().to_path_buf()),
                policy.destroy_timeout,
            ));
        }

        Self {
            info: InstanceInfo {
                id,
                pid,
                log_file,
                started_at,
            },
            marker,
            coordinator,
        }
    }
}
