use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use procwarden::config::{ConfigurationBuilder, RetryPolicy, SupervisorPolicy};
use procwarden::Configuration;
use tempfile::TempDir;

/// File a worker script touches once it is up.
pub const READY_FLAG: &str = "ready.flag";

/// Temporary worker directory with helpers to drop scripts into it.
pub struct WorkerDir {
    dir: TempDir,
}

impl WorkerDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp worker dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn ready_flag(&self) -> PathBuf {
        self.path().join(READY_FLAG)
    }

    pub fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, contents).expect("write file");
        path
    }

    /// Write an executable `/bin/sh` script.
    pub fn write_script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.write_file(name, &format!("#!/bin/sh\n{body}\n"));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .expect("chmod script");
        }
        path
    }

    /// Builder preset for a worker in this directory listening on
    /// `127.0.0.1:port`, with options inherited from the environment off.
    pub fn builder(&self, port: u16) -> ConfigurationBuilder {
        Configuration::builder()
            .directory(self.path())
            .host("127.0.0.1")
            .liveness_port(port)
            .inherit_options_from_env(false)
    }

    /// Stdout/stderr capture files created by the launcher so far.
    pub fn stdout_logs(&self) -> Vec<PathBuf> {
        let mut logs: Vec<PathBuf> = fs::read_dir(self.path())
            .expect("list worker dir")
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("stdout-") && n.ends_with(".log"))
            })
            .collect();
        logs.sort();
        logs
    }
}

impl Default for WorkerDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Policy with every wait shrunk to test scale.
pub fn fast_policy() -> SupervisorPolicy {
    SupervisorPolicy {
        readiness: RetryPolicy::new(50, Duration::from_millis(100)),
        handshake: RetryPolicy::new(3, Duration::from_millis(50)),
        connect_timeout: Duration::from_millis(200),
        stop_timeout: Duration::from_secs(5),
        destroy_timeout: Duration::from_millis(500),
        reap_orphans: false,
        orphan_grace: Duration::from_millis(200),
        kill_settle: Duration::ZERO,
        drain_timeout: Duration::from_millis(500),
    }
}
