pub mod fake_client;
pub mod fake_process_table;
pub mod worker_dir;

use std::net::TcpListener as StdTcpListener;
use std::path::PathBuf;
use std::sync::Once;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing_subscriber::{EnvFilter, fmt};

pub use fake_client::{ClientLog, FakeClient};
pub use fake_process_table::FakeProcessTable;
pub use worker_dir::{READY_FLAG, WorkerDir, fast_policy};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    with_timeout_secs(5, f).await
}

/// Run a future with a custom timeout.
pub async fn with_timeout_secs<F, T>(secs: u64, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(secs), f)
        .await
        .unwrap_or_else(|_| panic!("Test timed out after {secs} seconds"))
}

/// A TCP port on 127.0.0.1 that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = StdTcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

/// Stand-in for a worker's liveness endpoint.
///
/// Waits until `flag` exists (the worker script creates it once running),
/// then listens on `127.0.0.1:port` and accepts connections until aborted.
pub fn liveness_on_flag(flag: PathBuf, port: u16) -> JoinHandle<()> {
    tokio::spawn(async move {
        while !flag.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .expect("bind liveness port");
        loop {
            if listener.accept().await.is_err() {
                break;
            }
        }
    })
}

/// Listen on `127.0.0.1:port` right away, as if another worker owned it.
pub async fn occupy_port(port: u16) -> JoinHandle<()> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .expect("bind occupied port");
    tokio::spawn(async move {
        loop {
            if listener.accept().await.is_err() {
                break;
            }
        }
    })
}
