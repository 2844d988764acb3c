// src/config/validate.rs

use std::path::Path;

use crate::config::model::{
    Configuration, RawWorkerFile, RetryPolicy, RetrySection, SupervisorPolicy, WorkerFile,
};
use crate::config::options::HeapOptions;
use crate::errors::{Result, SupervisorError};

/// Check the invariants every built `Configuration` must satisfy.
///
/// Directory existence is not checked here; `start` checks it.
pub fn validate_configuration(cfg: &Configuration) -> Result<()> {
    if cfg.host.trim().is_empty() {
        return Err(SupervisorError::ConfigError(
            "host must not be empty".to_string(),
        ));
    }
    if cfg.liveness_port == 0 {
        return Err(SupervisorError::ConfigError(
            "liveness_port must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.command.is_empty() || cfg.command[0].trim().is_empty() {
        return Err(SupervisorError::ConfigError(
            "command must contain at least the program to run".to_string(),
        ));
    }
    if cfg.log_file_name.trim().is_empty() {
        return Err(SupervisorError::ConfigError(
            "log_file_name must not be empty".to_string(),
        ));
    }
    validate_env_name(&cfg.options_env_var)?;
    for key in cfg.environment.keys() {
        validate_env_name(key)?;
    }
    if let Some(stop) = &cfg.stop_command {
        if stop.is_empty() {
            return Err(SupervisorError::ConfigError(
                "stop_command must not be empty when present".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_env_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('=') || name.contains('\0') {
        return Err(SupervisorError::ConfigError(format!(
            "invalid environment variable name '{name}'"
        )));
    }
    Ok(())
}

fn validate_retry(section: &str, policy: &RetryPolicy) -> Result<()> {
    if policy.attempts == 0 {
        return Err(SupervisorError::ConfigError(format!(
            "[{section}].attempts must be >= 1 (got 0)"
        )));
    }
    Ok(())
}

fn retry_from_section(section: &RetrySection, default: RetryPolicy) -> RetryPolicy {
    RetryPolicy {
        attempts: section.attempts.unwrap_or(default.attempts),
        interval: section.interval.unwrap_or(default.interval),
    }
}

impl WorkerFile {
    /// Validate a raw file, resolving relative paths against `base_dir`.
    pub fn from_raw(raw: RawWorkerFile, base_dir: &Path) -> Result<Self> {
        let worker = raw.worker;

        let directory = if worker.directory.is_relative() {
            base_dir.join(&worker.directory)
        } else {
            worker.directory.clone()
        };

        let mut builder = Configuration::builder()
            .directory(directory)
            .host(worker.host)
            .liveness_port(worker.liveness_port)
            .command(worker.command)
            .params(worker.params)
            .envs(worker.env)
            .options_env_var(worker.options_env_var)
            .inherit_options_from_env(worker.inherit_options_from_env)
            .log_file_name(worker.log_file_name)
            .client_required(worker.client_required)
            .output(worker.output);

        if let Some(heap) = worker.heap {
            builder = builder.contributor(HeapOptions {
                initial: heap.initial,
                max: heap.max,
            });
        }
        for token in worker.options {
            builder = builder.option(token);
        }
        if let Some(dir) = worker.log_dir {
            builder = builder.log_dir(if dir.is_relative() {
                base_dir.join(dir)
            } else {
                dir
            });
        }
        if let Some(cmd) = worker.handshake_command {
            builder = builder.handshake_command(cmd);
        }
        if let Some(stop) = worker.stop_command {
            builder = builder.stop_command(stop);
        }

        let configuration = builder.build()?;

        let defaults = SupervisorPolicy::default();
        let shutdown = raw.shutdown;
        let policy = SupervisorPolicy {
            readiness: retry_from_section(&raw.readiness, defaults.readiness),
            handshake: retry_from_section(&raw.handshake, defaults.handshake),
            connect_timeout: defaults.connect_timeout,
            stop_timeout: shutdown.timeout.unwrap_or(defaults.stop_timeout),
            destroy_timeout: shutdown.destroy_timeout.unwrap_or(defaults.destroy_timeout),
            reap_orphans: shutdown.reap_orphans.unwrap_or(defaults.reap_orphans),
            orphan_grace: shutdown.orphan_grace.unwrap_or(defaults.orphan_grace),
            kill_settle: shutdown.kill_settle.unwrap_or(defaults.kill_settle),
            drain_timeout: shutdown.drain_timeout.unwrap_or(defaults.drain_timeout),
        };
        validate_retry("readiness", &policy.readiness)?;
        validate_retry("handshake", &policy.handshake)?;
        if policy.stop_timeout.is_zero() {
            return Err(SupervisorError::ConfigError(
                "[shutdown].timeout must be greater than zero".to_string(),
            ));
        }

        if let Some(client) = &raw.client {
            if client.command.is_empty() {
                return Err(SupervisorError::ConfigError(
                    "[client].command must not be empty".to_string(),
                ));
            }
        }

        Ok(WorkerFile {
            configuration,
            policy,
            client: raw.client,
        })
    }
}
