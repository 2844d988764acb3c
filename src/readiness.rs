// src/readiness.rs

//! Readiness detection.
//!
//! A worker counts as started once its liveness port accepts TCP
//! connections. Because "port open" and "application ready" are not the same
//! thing, a second bounded phase ([`await_client`]) keeps sending a trivial
//! control-plane command until the client succeeds.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::client::{Client, ControlSession};
use crate::config::RetryPolicy;
use crate::errors::{Result, SupervisorError};

/// Single connect attempt against `host:port`.
pub async fn is_port_open(host: &str, port: u16, connect_timeout: Duration) -> bool {
    match tokio::time::timeout(connect_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            debug!(host, port, error = %e, "liveness port not connectable");
            false
        }
        Err(_) => {
            debug!(host, port, "connect attempt timed out");
            false
        }
    }
}

/// Polls a liveness port with a fixed retry policy.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    host: String,
    port: u16,
    policy: RetryPolicy,
    connect_timeout: Duration,
}

impl ReadinessProbe {
    pub fn new(host: impl Into<String>, port: u16, policy: RetryPolicy) -> Self {
        Self {
            host: host.into(),
            port,
            policy,
            connect_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Returns `true` as soon as a connect succeeds, `false` once every
    /// attempt has failed. Sleeps `interval` between attempts, never after
    /// the last one.
    pub async fn await_ready(&self) -> bool {
        let attempts = self.policy.attempts.max(1);

        for attempt in 1..=attempts {
            if is_port_open(&self.host, self.port, self.connect_timeout).await {
                info!(host = %self.host, port = self.port, attempt, "liveness port is connectable");
                return true;
            }
            if attempt < attempts {
                info!(host = %self.host, port = self.port, attempt, "waiting for worker...");
                sleep(self.policy.interval).await;
            }
        }

        false
    }
}

/// Handshake phase: run `command` through the session until it succeeds.
///
/// Exhaustion yields `ClientHandshakeFailure` carrying the last client error.
pub async fn await_client<C: Client>(
    session: &mut ControlSession<C>,
    command: &str,
    policy: RetryPolicy,
) -> Result<()> {
    let attempts = policy.attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match session.execute(command).await {
            Ok(_) => {
                debug!(attempt, "client was connected to worker");
                return Ok(());
            }
            Err(e) => {
                debug!(attempt, error = %e, "waiting for client...");
                last_error = format!("{e:#}");
            }
        }
        if attempt < attempts {
            sleep(policy.interval).await;
        }
    }

    Err(SupervisorError::ClientHandshakeFailure {
        attempts,
        last_error,
    })
}
