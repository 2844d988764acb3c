#![allow(dead_code)]

pub use procwarden_test_utils::{
    ClientLog, FakeClient, FakeProcessTable, READY_FLAG, WorkerDir, fast_policy, free_port,
    init_tracing, liveness_on_flag, occupy_port, with_timeout, with_timeout_secs,
};

use std::error::Error;

pub type TestResult = Result<(), Box<dyn Error>>;

/// Script body of a well-behaved worker: says hello, marks itself ready and
/// idles until terminated.
pub fn idle_worker() -> String {
    format!("echo \"worker up $INSTANCE_ID\"\ntouch {READY_FLAG}\nexec sleep 30")
}

/// Like [`idle_worker`] but ignores SIGTERM, so only a forced kill stops it.
pub fn stubborn_worker() -> String {
    // An ignored signal stays ignored across exec.
    format!("trap '' TERM\necho stubborn\ntouch {READY_FLAG}\nexec sleep 30")
}
