#![cfg(unix)]

mod common;
use crate::common::{TestResult, WorkerDir, init_tracing, with_timeout};

use std::time::Duration;

use procwarden::errors::SupervisorError;
use procwarden::exec::{ProcessLauncher, Sink};
use procwarden::registry::Marker;
use procwarden::types::{InstanceId, OutputTarget};

#[tokio::test]
async fn launch_injects_marker_and_captures_output() -> TestResult {
    init_tracing();
    let dir = WorkerDir::new();
    dir.write_script(
        "run.sh",
        "echo \"id=$INSTANCE_ID\"\necho \"opts=$JAVA_OPTS\"\necho \"extra=$EXTRA\"\necho \"args=$*\"",
    );

    let cfg = dir
        .builder(1)
        .command(["./run.sh", "first"])
        .param("second")
        .env("EXTRA", "overlay")
        .option("-Dfoo=bar")
        .build()?;

    let mut launched = ProcessLauncher::new().launch(&cfg, None)?;
    let id = launched.id;

    assert_eq!(launched.log_file, dir.path().join(format!("stdout-{id}.log")));
    assert!(launched.pid.is_some());

    with_timeout(launched.child.wait()).await?;
    assert!(with_timeout(launched.pump.join(Duration::from_secs(2))).await);

    let log = std::fs::read_to_string(&launched.log_file)?;
    assert!(log.contains(&format!("id={id}")), "{log}");
    assert!(
        log.contains(&format!("opts=-Dfoo=bar -Dinstance.id={id}")),
        "{log}"
    );
    assert!(log.contains("extra=overlay"), "{log}");
    assert!(log.contains("args=first second"), "{log}");
    Ok(())
}

#[tokio::test]
async fn launch_fails_for_missing_directory() -> TestResult {
    let dir = WorkerDir::new();
    let missing = dir.path().join("nope");
    let cfg = dir.builder(1).directory(&missing).command(["./run.sh"]).build()?;

    let err = ProcessLauncher::new()
        .launch(&cfg, None)
        .expect_err("missing directory must fail");

    assert!(matches!(err, SupervisorError::InvalidConfiguration(_)), "{err:?}");
    assert!(!missing.exists());
    Ok(())
}

#[tokio::test]
async fn launch_failure_is_reported_for_missing_program() -> TestResult {
    let dir = WorkerDir::new();
    let cfg = dir.builder(1).command(["./does-not-exist.sh"]).build()?;

    let err = ProcessLauncher::new()
        .launch(&cfg, None)
        .expect_err("spawn must fail");

    match err {
        SupervisorError::LaunchFailure { program, .. } => {
            assert_eq!(program, "./does-not-exist.sh")
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn sink_override_wins_over_configured_output() -> TestResult {
    let dir = WorkerDir::new();
    dir.write_script("run.sh", "echo to-memory");
    let cfg = dir
        .builder(1)
        .command(["./run.sh"])
        .output(OutputTarget::Discard)
        .build()?;

    let (sink, buffer) = Sink::memory();
    let mut launched = ProcessLauncher::new().launch(&cfg, Some(sink))?;
    with_timeout(launched.child.wait()).await?;
    with_timeout(launched.pump.join(Duration::from_secs(2))).await;

    assert_eq!(buffer.lines(), vec!["to-memory"]);
    // The per-instance file is still created, just left empty.
    assert_eq!(std::fs::read_to_string(&launched.log_file)?, "");
    Ok(())
}

#[test]
fn environment_overlay_appends_marker_to_options() -> TestResult {
    let dir = WorkerDir::new();
    let cfg = dir
        .builder(1)
        .command(["./run.sh"])
        .env("SHARED", "from-config")
        .env("JAVA_OPTS", "-Xmx1g")
        .build()?;
    let marker = Marker::new(InstanceId::from_raw(42));

    let env = ProcessLauncher::build_environment(&cfg, &marker, Some("-Xms64m"));

    assert_eq!(env["SHARED"], "from-config");
    assert_eq!(env["JAVA_OPTS"], "-Xmx1g -Dinstance.id=42");
    assert_eq!(env["INSTANCE_ID"], "42");
    assert!(!env.contains_key("PATH"), "inherited variables are not copied");

    let bare = dir.builder(1).command(["./run.sh"]).build()?;
    let env = ProcessLauncher::build_environment(&bare, &marker, Some("-Xms64m"));
    assert_eq!(env["JAVA_OPTS"], "-Xms64m -Dinstance.id=42");
    Ok(())
}

#[tokio::test]
async fn non_utf8_parent_variables_reach_the_worker() -> TestResult {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    // Unique names; no other test reads them.
    unsafe {
        std::env::set_var("PROCWARDEN_TEST_PLAIN", "ok");
        std::env::set_var("PROCWARDEN_TEST_BYTES", OsStr::from_bytes(b"caf\xe9"));
    }

    let dir = WorkerDir::new();
    dir.write_script(
        "run.sh",
        "echo \"plain=${PROCWARDEN_TEST_PLAIN-unset}\"\n\
         [ -n \"${PROCWARDEN_TEST_BYTES+x}\" ] && echo bytes=set || echo bytes=unset",
    );
    let cfg = dir.builder(1).command(["./run.sh"]).build()?;

    let mut launched = ProcessLauncher::new().launch(&cfg, None)?;
    with_timeout(launched.child.wait()).await?;
    assert!(with_timeout(launched.pump.join(Duration::from_secs(2))).await);

    let log = std::fs::read_to_string(&launched.log_file)?;
    assert!(log.contains("plain=ok"), "{log}");
    assert!(log.contains("bytes=set"), "{log}");
    Ok(())
}

#[test]
fn instance_ids_are_strictly_increasing() {
    let ids: Vec<InstanceId> = (0..1000).map(|_| InstanceId::next()).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}
