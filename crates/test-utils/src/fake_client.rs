use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use procwarden::client::{Client, ClientFuture};

/// Everything a [`FakeClient`] was asked to do.
#[derive(Debug, Default, Clone)]
pub struct ClientCalls {
    pub connects: u32,
    pub commands: Vec<String>,
    pub closes: u32,
}

/// Shared read handle on a [`FakeClient`]'s call log.
#[derive(Debug, Default, Clone)]
pub struct ClientLog(Arc<Mutex<ClientCalls>>);

impl ClientLog {
    pub fn snapshot(&self) -> ClientCalls {
        self.0.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.snapshot().commands
    }

    pub fn closes(&self) -> u32 {
        self.snapshot().closes
    }
}

/// A fake control-plane client that:
/// - records connects, commands and closes
/// - fails the first `failing_executes` commands (or all of them)
/// - optionally hangs in `close`
pub struct FakeClient {
    log: ClientLog,
    connected: bool,
    failing_executes: u32,
    always_fail: bool,
    close_delay: Option<Duration>,
}

impl FakeClient {
    pub fn new() -> (Self, ClientLog) {
        let log = ClientLog::default();
        let client = Self {
            log: log.clone(),
            connected: false,
            failing_executes: 0,
            always_fail: false,
            close_delay: None,
        };
        (client, log)
    }

    pub fn failing_executes(mut self, n: u32) -> Self {
        self.failing_executes = n;
        self
    }

    pub fn always_failing(mut self) -> Self {
        self.always_fail = true;
        self
    }

    pub fn slow_close(mut self, delay: Duration) -> Self {
        self.close_delay = Some(delay);
        self
    }
}

impl Client for FakeClient {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn connect(&mut self) -> ClientFuture<'_, ()> {
        Box::pin(async move {
            self.log.0.lock().unwrap().connects += 1;
            self.connected = true;
            Ok(())
        })
    }

    fn execute<'a>(&'a mut self, command: &'a str) -> ClientFuture<'a, String> {
        Box::pin(async move {
            self.log.0.lock().unwrap().commands.push(command.to_string());
            if self.always_fail {
                return Err(anyhow!("worker refused '{command}'"));
            }
            if self.failing_executes > 0 {
                self.failing_executes -= 1;
                return Err(anyhow!("worker not ready for '{command}'"));
            }
            Ok(format!("ok: {command}"))
        })
    }

    fn close(&mut self) -> ClientFuture<'_, ()> {
        Box::pin(async move {
            if let Some(delay) = self.close_delay {
                tokio::time::sleep(delay).await;
            }
            self.log.0.lock().unwrap().closes += 1;
            self.connected = false;
            Ok(())
        })
    }
}
