// src/client/mod.rs

//! Pluggable control-plane client abstraction.
//!
//! The supervisor never knows which product it is talking to. It only calls
//! `connect` / `execute` / `close` on a [`Client`] produced by the factory it
//! was constructed with, wrapped in a [`ControlSession`] that tracks the
//! session state.
//!
//! - [`ShellClient`] is a CLI adapter that runs a command template through
//!   the platform shell.
//! - [`NoClient`] is for workers without a control plane.
//! - Tests provide their own `Client` that records calls.

use std::future::Future;
use std::pin::Pin;

use anyhow::{Result, anyhow};
use tracing::{debug, info};

use crate::types::SessionState;

pub mod shell;

pub use shell::ShellClient;

/// Boxed future returned by [`Client`] methods.
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Trait abstracting a product-specific command channel to the worker.
pub trait Client: Send {
    fn is_connected(&self) -> bool;

    fn connect(&mut self) -> ClientFuture<'_, ()>;

    /// Run one command and return its textual output.
    fn execute<'a>(&'a mut self, command: &'a str) -> ClientFuture<'a, String>;

    fn close(&mut self) -> ClientFuture<'_, ()>;
}

impl Client for Box<dyn Client> {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn connect(&mut self) -> ClientFuture<'_, ()> {
        (**self).connect()
    }

    fn execute<'a>(&'a mut self, command: &'a str) -> ClientFuture<'a, String> {
        (**self).execute(command)
    }

    fn close(&mut self) -> ClientFuture<'_, ()> {
        (**self).close()
    }
}

/// State-tracking wrapper around a [`Client`].
#[derive(Debug)]
pub struct ControlSession<C: Client> {
    client: C,
    state: SessionState,
}

impl<C: Client> ControlSession<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    pub async fn connect(&mut self) -> Result<()> {
        if self.state == SessionState::Connected && self.client.is_connected() {
            return Ok(());
        }

        self.state = SessionState::Connecting;
        match self.client.connect().await {
            Ok(()) => {
                self.state = SessionState::Connected;
                info!("client was connected");
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Execute a command, connecting first when needed.
    pub async fn execute(&mut self, command: &str) -> Result<String> {
        info!(command, "execute command");
        if self.state != SessionState::Connected || !self.client.is_connected() {
            self.connect().await?;
        }
        self.client.execute(command).await
    }

    /// Execute commands in order, stopping at the first failure.
    pub async fn execute_all<S: AsRef<str>>(&mut self, commands: &[S]) -> Result<Vec<String>> {
        for (i, cmd) in commands.iter().enumerate() {
            debug!(index = i + 1, command = cmd.as_ref(), "queued command");
        }

        let mut outputs = Vec::with_capacity(commands.len());
        for cmd in commands {
            outputs.push(self.execute(cmd.as_ref()).await?);
        }
        Ok(outputs)
    }

    /// Close the session. The client's `close` is only invoked when a
    /// connection is actually open.
    pub async fn close(&mut self) -> Result<()> {
        let result = if self.state == SessionState::Connected || self.client.is_connected() {
            self.client.close().await
        } else {
            Ok(())
        };
        self.state = SessionState::Closed;
        info!("client was disconnected");
        result
    }
}

/// Client for workers without a control plane.
#[derive(Debug, Clone, Default)]
pub struct NoClient;

impl Client for NoClient {
    fn is_connected(&self) -> bool {
        false
    }

    fn connect(&mut self) -> ClientFuture<'_, ()> {
        Box::pin(async { Err(anyhow!("worker has no control plane")) })
    }

    fn execute<'a>(&'a mut self, _command: &'a str) -> ClientFuture<'a, String> {
        Box::pin(async { Err(anyhow!("worker has no control plane")) })
    }

    fn close(&mut self) -> ClientFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}
