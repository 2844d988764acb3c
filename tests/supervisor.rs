#![cfg(unix)]

mod common;
use crate::common::{
    FakeClient, TestResult, WorkerDir, fast_policy, free_port, idle_worker, init_tracing,
    liveness_on_flag, occupy_port, stubborn_worker, with_timeout_secs,
};

use std::time::{Duration, Instant};

use procwarden::shutdown::FnHook;
use procwarden::shutdown::hooks::{DESTROY_PROCESS, REAP_ORPHANS, STOP_STREAM_PUMP};
use procwarden::{
    Configuration, HookOutcome, NoClient, Supervisor, SupervisorError, SupervisorPolicy,
    SupervisorState,
};
use procwarden_test_utils::ClientLog;

struct Fixture {
    dir: WorkerDir,
    port: u16,
}

impl Fixture {
    fn new(script: &str) -> Self {
        let dir = WorkerDir::new();
        dir.write_script("run.sh", script);
        Self {
            dir,
            port: free_port(),
        }
    }

    fn config(&self) -> Configuration {
        self.dir
            .builder(self.port)
            .command(["./run.sh"])
            .handshake_command("version")
            .build()
            .expect("valid configuration")
    }

    fn liveness(&self) -> tokio::task::JoinHandle<()> {
        liveness_on_flag(self.dir.ready_flag(), self.port)
    }
}

fn supervised(
    cfg: Configuration,
    policy: SupervisorPolicy,
    client: FakeClient,
) -> Supervisor<FakeClient> {
    Supervisor::new(cfg, policy, move |_| client)
}

/// Polls until `pid` no longer exists; false if it is still there after 5s.
///
/// A zombie counts as gone: it is dead, only its reaper may be slow.
async fn process_gone(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if kill(Pid::from_raw(pid as i32), None).is_err() {
            return true;
        }
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).unwrap_or_default();
        if stat.contains(") Z ") {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn start_execute_stop_lifecycle() -> TestResult {
    init_tracing();
    let fx = Fixture::new(&idle_worker());
    let liveness = fx.liveness();
    let (client, log): (FakeClient, ClientLog) = FakeClient::new();
    let supervisor = supervised(fx.config(), fast_policy(), client);

    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    with_timeout_secs(10, supervisor.start()).await?;

    assert!(supervisor.is_running());
    let id = supervisor.instance_id().expect("instance id");
    assert!(supervisor.pid().is_some());
    assert_eq!(log.commands(), vec!["version"]);

    let output = with_timeout_secs(5, supervisor.execute("status")).await?;
    assert_eq!(output, "ok: status");

    let stdout_log = supervisor.stdout_log_file().expect("stdout log");
    assert_eq!(stdout_log, fx.dir.path().join(format!("stdout-{id}.log")));

    let report = with_timeout_secs(10, supervisor.stop())
        .await
        .expect("a running worker produces a report");

    assert!(report.is_complete(), "{report:?}");
    assert_eq!(report.outcome(DESTROY_PROCESS), Some(&HookOutcome::Completed));
    assert_eq!(report.outcome(STOP_STREAM_PUMP), Some(&HookOutcome::Completed));
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    assert!(supervisor.instance_id().is_none());
    assert_eq!(log.closes(), 1);

    let captured = std::fs::read_to_string(&stdout_log)?;
    assert!(captured.contains(&format!("worker up {id}")), "{captured}");

    liveness.abort();
    Ok(())
}

#[tokio::test]
async fn stop_twice_runs_hooks_once() -> TestResult {
    let fx = Fixture::new(&idle_worker());
    let liveness = fx.liveness();
    let (client, log) = FakeClient::new();
    let supervisor = supervised(fx.config(), fast_policy(), client);

    with_timeout_secs(10, supervisor.start()).await?;
    assert!(with_timeout_secs(10, supervisor.stop()).await.is_some());
    assert!(with_timeout_secs(10, supervisor.stop()).await.is_none());
    assert_eq!(log.closes(), 1);

    liveness.abort();
    Ok(())
}

#[tokio::test]
async fn occupied_port_is_a_conflict_and_spawns_nothing() -> TestResult {
    let fx = Fixture::new(&idle_worker());
    let other = occupy_port(fx.port).await;
    let (client, log) = FakeClient::new();
    let supervisor = supervised(fx.config(), fast_policy(), client);

    let err = with_timeout_secs(5, supervisor.start())
        .await
        .expect_err("port is taken");

    assert!(
        matches!(err, SupervisorError::PortConflict { port, .. } if port == fx.port),
        "{err:?}"
    );
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    assert!(fx.dir.stdout_logs().is_empty());
    assert!(log.commands().is_empty());

    other.abort();
    Ok(())
}

#[tokio::test]
async fn second_supervisor_on_same_port_conflicts() -> TestResult {
    let fx = Fixture::new(&idle_worker());
    let liveness = fx.liveness();
    let (first_client, _) = FakeClient::new();
    let (second_client, _) = FakeClient::new();
    let first = supervised(fx.config(), fast_policy(), first_client);
    let second = supervised(fx.config(), fast_policy(), second_client);

    with_timeout_secs(10, first.start()).await?;
    let err = with_timeout_secs(5, second.start())
        .await
        .expect_err("second start must conflict");
    assert!(matches!(err, SupervisorError::PortConflict { .. }), "{err:?}");
    assert_eq!(fx.dir.stdout_logs().len(), 1);

    with_timeout_secs(10, first.stop()).await;
    liveness.abort();
    Ok(())
}

#[tokio::test]
async fn missing_directory_is_rejected_before_spawning() -> TestResult {
    let fx = Fixture::new(&idle_worker());
    let missing = fx.dir.path().join("gone");
    let cfg = fx
        .dir
        .builder(fx.port)
        .directory(&missing)
        .command(["./run.sh"])
        .build()?;
    let supervisor = Supervisor::new(cfg, fast_policy(), |_| NoClient);

    let err = with_timeout_secs(5, supervisor.start())
        .await
        .expect_err("directory does not exist");

    assert!(matches!(err, SupervisorError::InvalidConfiguration(_)), "{err:?}");
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    assert!(fx.dir.stdout_logs().is_empty());
    assert!(!missing.exists());
    Ok(())
}

#[tokio::test]
async fn concurrent_starts_spawn_exactly_one_process() -> TestResult {
    let fx = Fixture::new(&idle_worker());
    let liveness = fx.liveness();
    let (client, log) = FakeClient::new();
    let supervisor = supervised(fx.config(), fast_policy(), client);

    let (a, b) = with_timeout_secs(10, async {
        tokio::join!(supervisor.start(), supervisor.start())
    })
    .await;
    a?;
    b?;

    assert!(supervisor.is_running());
    assert_eq!(fx.dir.stdout_logs().len(), 1);
    assert_eq!(log.commands(), vec!["version"]);

    with_timeout_secs(10, supervisor.stop()).await;
    liveness.abort();
    Ok(())
}

#[tokio::test]
async fn startup_timeout_leaves_process_for_stop() -> TestResult {
    // No liveness stub: the port never opens.
    let fx = Fixture::new(&idle_worker());
    let mut policy = fast_policy();
    policy.readiness.attempts = 3;
    policy.readiness.interval = Duration::from_millis(50);
    let (client, log) = FakeClient::new();
    let supervisor = supervised(fx.config(), policy, client);

    let err = with_timeout_secs(5, supervisor.start())
        .await
        .expect_err("port never opens");

    assert!(
        matches!(err, SupervisorError::StartupTimeout { attempts: 3, .. }),
        "{err:?}"
    );
    assert!(log.commands().is_empty(), "no command before readiness");
    assert_eq!(supervisor.state(), SupervisorState::Failed);
    assert!(!supervisor.is_running());
    let pid = supervisor.pid().expect("process kept").0;

    let report = with_timeout_secs(10, supervisor.stop()).await.expect("report");
    assert!(report.is_complete());
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    assert!(process_gone(pid).await);
    Ok(())
}

#[tokio::test]
async fn restart_after_startup_timeout_probes_the_same_process() -> TestResult {
    let fx = Fixture::new(&idle_worker());
    let mut policy = fast_policy();
    policy.readiness.attempts = 2;
    policy.readiness.interval = Duration::from_millis(50);
    let (client, _log) = FakeClient::new();
    let supervisor = supervised(fx.config(), policy, client);

    assert!(with_timeout_secs(5, supervisor.start()).await.is_err());
    let id = supervisor.instance_id().expect("instance kept");

    let again = with_timeout_secs(5, supervisor.start()).await;
    assert!(
        matches!(again, Err(SupervisorError::StartupTimeout { .. })),
        "{again:?}"
    );
    assert_eq!(supervisor.state(), SupervisorState::Failed);
    assert!(matches!(
        supervisor.execute("status").await,
        Err(SupervisorError::NotRunning)
    ));

    // Once the port answers, the owned process is adopted, not respawned.
    let liveness = fx.liveness();
    with_timeout_secs(10, supervisor.start()).await?;
    assert!(supervisor.is_running());
    assert_eq!(supervisor.instance_id(), Some(id));
    assert_eq!(fx.dir.stdout_logs().len(), 1);

    with_timeout_secs(10, supervisor.stop()).await;
    liveness.abort();
    Ok(())
}

#[tokio::test]
async fn optional_handshake_failure_still_starts() -> TestResult {
    let fx = Fixture::new(&idle_worker());
    let liveness = fx.liveness();
    let cfg = fx
        .dir
        .builder(fx.port)
        .command(["./run.sh"])
        .handshake_command("version")
        .client_required(false)
        .build()?;
    let (client, log) = FakeClient::new();
    let supervisor = supervised(cfg, fast_policy(), client.always_failing());

    with_timeout_secs(10, supervisor.start()).await?;
    assert!(supervisor.is_running());
    assert_eq!(log.commands().len(), fast_policy().handshake.attempts as usize);

    with_timeout_secs(10, supervisor.stop()).await;
    liveness.abort();
    Ok(())
}

#[tokio::test]
async fn required_handshake_failure_is_fatal() -> TestResult {
    let fx = Fixture::new(&idle_worker());
    let liveness = fx.liveness();
    let (client, _log) = FakeClient::new();
    let supervisor = supervised(fx.config(), fast_policy(), client.always_failing());

    let err = with_timeout_secs(10, supervisor.start())
        .await
        .expect_err("handshake is mandatory");
    assert!(
        matches!(err, SupervisorError::ClientHandshakeFailure { .. }),
        "{err:?}"
    );
    assert!(supervisor.pid().is_some());

    assert!(with_timeout_secs(10, supervisor.stop()).await.is_some());
    liveness.abort();
    Ok(())
}

#[tokio::test]
async fn stubborn_worker_is_force_killed() -> TestResult {
    let fx = Fixture::new(&stubborn_worker());
    let liveness = fx.liveness();
    let (client, _log) = FakeClient::new();
    let policy = fast_policy();
    let supervisor = supervised(fx.config(), policy.clone(), client);

    with_timeout_secs(10, supervisor.start()).await?;
    let pid = supervisor.pid().expect("pid").0;

    let started = Instant::now();
    let report = with_timeout_secs(10, supervisor.stop()).await.expect("report");

    assert!(report.is_complete(), "{report:?}");
    assert!(started.elapsed() >= policy.destroy_timeout);
    assert!(started.elapsed() < policy.stop_timeout + Duration::from_secs(1));
    assert!(process_gone(pid).await);

    liveness.abort();
    Ok(())
}

#[tokio::test]
async fn orphaned_children_are_reaped() -> TestResult {
    let fx = Fixture::new(&format!("sleep 60 &\necho $! > orphan.pid\n{}", idle_worker()));
    let liveness = fx.liveness();
    let mut policy = fast_policy();
    policy.reap_orphans = true;
    let supervisor = Supervisor::new(fx.config(), policy, |_| NoClient);

    with_timeout_secs(10, supervisor.start()).await?;
    let orphan: u32 = std::fs::read_to_string(fx.dir.path().join("orphan.pid"))?
        .trim()
        .parse()?;

    let report = with_timeout_secs(10, supervisor.stop()).await.expect("report");

    assert_eq!(report.outcome(REAP_ORPHANS), Some(&HookOutcome::Completed));
    assert!(process_gone(orphan).await, "orphan {orphan} survived stop");

    liveness.abort();
    Ok(())
}

#[tokio::test]
async fn hanging_hook_does_not_block_stop() -> TestResult {
    let fx = Fixture::new(&idle_worker());
    let liveness = fx.liveness();
    let (client, _log) = FakeClient::new();
    let supervisor = supervised(fx.config(), fast_policy(), client);

    with_timeout_secs(10, supervisor.start()).await?;
    supervisor
        .add_shutdown_hook(FnHook::new(
            "hangs",
            std::future::pending::<anyhow::Result<()>>,
        ))
        .await?;

    let timeout = Duration::from_millis(1500);
    let started = Instant::now();
    let report = with_timeout_secs(10, supervisor.stop_with_timeout(timeout))
        .await
        .expect("report");

    assert!(started.elapsed() < timeout + Duration::from_secs(1));
    assert_eq!(report.incomplete(), vec!["hangs"]);
    assert_eq!(report.outcome(DESTROY_PROCESS), Some(&HookOutcome::Completed));
    assert_eq!(supervisor.state(), SupervisorState::Stopped);

    liveness.abort();
    Ok(())
}

#[tokio::test]
async fn slow_session_close_is_bounded_and_precedes_hooks() -> TestResult {
    let fx = Fixture::new(&idle_worker());
    let liveness = fx.liveness();
    let (client, log) = FakeClient::new();
    let supervisor = supervised(
        fx.config(),
        fast_policy(),
        client.slow_close(Duration::from_millis(300)),
    );

    with_timeout_secs(10, supervisor.start()).await?;

    let closes_seen = log.clone();
    supervisor
        .add_shutdown_hook(FnHook::new("observe-close", move || {
            let closes = closes_seen.closes();
            async move {
                anyhow::ensure!(closes == 1, "session still open when hooks ran");
                Ok(())
            }
        }))
        .await?;

    let report = with_timeout_secs(20, supervisor.stop()).await.expect("report");
    assert_eq!(report.outcome("observe-close"), Some(&HookOutcome::Completed));
    assert_eq!(log.closes(), 1);

    liveness.abort();
    Ok(())
}

#[tokio::test]
async fn session_close_counts_against_stop_timeout() -> TestResult {
    let fx = Fixture::new(&idle_worker());
    let liveness = fx.liveness();
    let (client, _log) = FakeClient::new();
    let supervisor = supervised(
        fx.config(),
        fast_policy(),
        client.slow_close(Duration::from_secs(5)),
    );

    with_timeout_secs(10, supervisor.start()).await?;

    let timeout = Duration::from_secs(1);
    let started = Instant::now();
    let report = with_timeout_secs(10, supervisor.stop_with_timeout(timeout))
        .await
        .expect("report");

    assert!(started.elapsed() < timeout + Duration::from_millis(500), "{:?}", started.elapsed());
    assert_eq!(supervisor.state(), SupervisorState::Stopped);

    liveness.abort();
    Ok(())
}

#[tokio::test]
async fn operations_on_idle_supervisor() -> TestResult {
    let fx = Fixture::new(&idle_worker());
    let supervisor = Supervisor::new(fx.config(), fast_policy(), |_| NoClient);

    assert!(matches!(
        supervisor.execute("status").await,
        Err(SupervisorError::NotRunning)
    ));
    assert!(matches!(
        supervisor
            .add_shutdown_hook(FnHook::new("late", || async { Ok::<(), anyhow::Error>(()) }))
            .await,
        Err(SupervisorError::NotRunning)
    ));
    assert!(supervisor.stop().await.is_none());
    assert!(supervisor.pid().is_none());
    assert!(supervisor.stdout_log_file().is_none());
    Ok(())
}

#[tokio::test]
async fn default_log_file_requires_log_directory() -> TestResult {
    let fx = Fixture::new(&idle_worker());
    let supervisor = Supervisor::new(fx.config(), fast_policy(), |_| NoClient);

    assert!(matches!(
        supervisor.default_log_file(),
        Err(SupervisorError::LogDirMissing(_))
    ));

    std::fs::create_dir_all(fx.dir.path().join("log"))?;
    assert_eq!(
        supervisor.default_log_file()?,
        fx.dir.path().join("log").join("server.log")
    );
    Ok(())
}
