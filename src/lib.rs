// src/lib.rs

pub mod cli;
pub mod client;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod readiness;
pub mod registry;
pub mod shutdown;
pub mod supervisor;
pub mod types;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info};

pub use crate::client::{Client, ControlSession, NoClient, ShellClient};
pub use crate::config::{Configuration, ConfigurationBuilder, RetryPolicy, SupervisorPolicy};
pub use crate::errors::SupervisorError;
pub use crate::shutdown::{HookOutcome, ShutdownHook, ShutdownReport};
pub use crate::supervisor::Supervisor;
pub use crate::types::{InstanceId, Pid, SupervisorState};

use crate::cli::CliArgs;
use crate::config::loader::{config_root_dir, load_from_path};
use crate::config::{ClientSection, WorkerFile};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - worker file loading (+ `--param` overrides)
/// - control-plane client selection
/// - supervisor start / stop
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let mut raw = load_from_path(&config_path)
        .with_context(|| format!("loading worker file {}", config_path.display()))?;
    raw.worker.params.extend(args.param.iter().cloned());

    let file = WorkerFile::from_raw(raw, &config_root_dir(&config_path))?;

    if args.dry_run {
        print_dry_run(&file);
        return Ok(());
    }

    let WorkerFile {
        configuration,
        policy,
        client,
    } = file;

    let supervisor = Supervisor::new(configuration, policy, |cfg| client_for(cfg, client.as_ref()));

    if let Err(e) = supervisor.start().await {
        // The process may still be alive after a failed probe or handshake.
        if let Some(report) = supervisor.stop().await {
            print_report(&report);
        }
        return Err(e.into());
    }

    if let Some(pid) = supervisor.pid() {
        info!(%pid, "worker started");
    }

    if !args.once {
        info!("press Ctrl-C to stop the worker");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl+C")?;
    }

    if let Some(report) = supervisor.stop().await {
        print_report(&report);
    }
    Ok(())
}

fn client_for(cfg: &Configuration, section: Option<&ClientSection>) -> Box<dyn Client> {
    match section {
        Some(section) => {
            let mut client = ShellClient::new(section.command.clone()).with_dir(cfg.directory());
            if let Some(timeout) = section.timeout {
                client = client.with_timeout(timeout);
            }
            Box::new(client)
        }
        None => Box::new(NoClient),
    }
}

fn print_report(report: &ShutdownReport) {
    println!("shutdown finished in {:?}", report.elapsed);
    for (hook, outcome) in &report.outcomes {
        match outcome {
            HookOutcome::Completed => println!("  {hook}: completed"),
            HookOutcome::Failed(e) => println!("  {hook}: failed ({e})"),
            HookOutcome::Incomplete => println!("  {hook}: incomplete"),
        }
    }
}

/// Print the resolved launch plan without spawning anything.
fn print_dry_run(file: &WorkerFile) {
    let cfg = &file.configuration;
    let policy = &file.policy;

    println!("procwarden dry-run");
    println!("  directory = {}", cfg.directory().display());
    println!("  liveness  = {}:{}", cfg.host(), cfg.liveness_port());
    println!("  command   = {:?}", cfg.command_line());
    println!("  output    = {:?}", cfg.output());
    println!();

    println!("environment overlay ({}):", cfg.environment().len());
    for (key, value) in cfg.environment() {
        println!("  {key}={value}");
    }
    println!();

    println!("policy:");
    println!(
        "  readiness = {} x {:?}",
        policy.readiness.attempts, policy.readiness.interval
    );
    if let Some(cmd) = cfg.handshake_command() {
        println!(
            "  handshake = {} x {:?} (command: {cmd}, required: {})",
            policy.handshake.attempts,
            policy.handshake.interval,
            cfg.client_required()
        );
    }
    println!("  stop timeout    = {:?}", policy.stop_timeout);
    println!("  destroy timeout = {:?}", policy.destroy_timeout);
    if policy.reap_orphans {
        println!("  reap orphans after {:?}", policy.orphan_grace);
    }
    if let Some(stop) = cfg.stop_command() {
        println!("  stop command    = {stop:?}");
    }
    if let Some(client) = &file.client {
        println!("  client command  = {:?}", client.command);
    }

    debug!("dry-run complete (nothing spawned)");
}
