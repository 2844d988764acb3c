// src/exec/pump.rs

//! Concurrent draining of a worker's stdout/stderr.
//!
//! Each captured stream gets its own Tokio task. Both tasks write into the
//! same sink, one whole line at a time under the sink lock, and flush after
//! every line so output captured before a crash is never lost.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A writer shared between the stdout and stderr readers.
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// Destination for captured worker output.
#[derive(Clone)]
pub enum Sink {
    /// Append to a file (the launcher truncates it before spawning).
    File(PathBuf),
    /// Let the worker write straight to the supervisor's own console.
    Inherit,
    /// Throw the output away without capturing it.
    Discard,
    /// Caller-provided writer.
    Writer(SharedWriter),
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sink::File(path) => f.debug_tuple("File").field(path).finish(),
            Sink::Inherit => f.write_str("Inherit"),
            Sink::Discard => f.write_str("Discard"),
            Sink::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

impl Sink {
    pub fn writer(w: impl Write + Send + 'static) -> Self {
        Sink::Writer(Arc::new(Mutex::new(w)))
    }

    /// In-memory sink plus a handle to read back what was captured.
    pub fn memory() -> (Self, MemoryBuffer) {
        let buf = Arc::new(Mutex::new(Vec::<u8>::new()));
        let writer: SharedWriter = buf.clone();
        (Sink::Writer(writer), MemoryBuffer(buf))
    }

    /// Whether the streams must be piped into the supervisor.
    pub fn captures(&self) -> bool {
        matches!(self, Sink::File(_) | Sink::Writer(_))
    }

    pub(crate) fn stdio(&self) -> Stdio {
        match self {
            Sink::Inherit => Stdio::inherit(),
            Sink::Discard => Stdio::null(),
            Sink::File(_) | Sink::Writer(_) => Stdio::piped(),
        }
    }

    fn open(&self) -> io::Result<Option<SharedWriter>> {
        match self {
            Sink::File(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Ok(Some(Arc::new(Mutex::new(file))))
            }
            Sink::Writer(w) => Ok(Some(Arc::clone(w))),
            Sink::Inherit | Sink::Discard => Ok(None),
        }
    }
}

/// Read-back handle for [`Sink::memory`].
#[derive(Debug, Clone, Default)]
pub struct MemoryBuffer(Arc<Mutex<Vec<u8>>>);

impl MemoryBuffer {
    pub fn contents(&self) -> String {
        match self.0.lock() {
            Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

/// Background readers bound to one child process.
pub struct StreamPump {
    stop_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    lines: Arc<AtomicU64>,
}

impl fmt::Debug for StreamPump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamPump")
            .field("lines", &self.lines_written())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl StreamPump {
    /// Start draining the child's piped stdout/stderr into `sink`.
    ///
    /// Streams that were not piped (inherited or discarded sinks) are left
    /// alone, so the pump may own zero tasks.
    pub fn attach(child: &mut Child, sink: &Sink) -> io::Result<Self> {
        let (stop_tx, _) = watch::channel(false);
        let lines = Arc::new(AtomicU64::new(0));
        let mut tasks = Vec::new();

        if let Some(writer) = sink.open()? {
            if let Some(stdout) = child.stdout.take() {
                tasks.push(tokio::spawn(drain(
                    stdout,
                    "stdout",
                    Arc::clone(&writer),
                    stop_tx.subscribe(),
                    Arc::clone(&lines),
                )));
            }
            if let Some(stderr) = child.stderr.take() {
                tasks.push(tokio::spawn(drain(
                    stderr,
                    "stderr",
                    writer,
                    stop_tx.subscribe(),
                    Arc::clone(&lines),
                )));
            }
        }

        Ok(Self {
            stop_tx,
            tasks: Mutex::new(tasks),
            lines,
        })
    }

    /// Ask every reader to stop after the line it is currently reading.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        match self.tasks.lock() {
            Ok(tasks) => tasks.iter().all(|t| t.is_finished()),
            Err(_) => true,
        }
    }

    pub fn lines_written(&self) -> u64 {
        self.lines.load(Ordering::Relaxed)
    }

    /// Wait up to `timeout` for the readers to hit end-of-input; stop and
    /// abort whatever is still running afterwards.
    ///
    /// Returns `true` when every reader finished on its own.
    pub async fn join(&self, timeout: Duration) -> bool {
        let handles: Vec<JoinHandle<()>> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => return true,
        };

        let deadline = tokio::time::Instant::now() + timeout;
        let mut clean = true;
        for mut handle in handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                clean = false;
                self.stop();
                // Give the reader a chance to observe the stop signal.
                if tokio::time::timeout(Duration::from_millis(100), &mut handle)
                    .await
                    .is_err()
                {
                    handle.abort();
                }
            }
        }
        clean
    }
}

impl Drop for StreamPump {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}

async fn drain<R>(
    reader: R,
    stream: &'static str,
    writer: SharedWriter,
    mut stop_rx: watch::Receiver<bool>,
    lines: Arc<AtomicU64>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);
    let mut sink_ok = true;

    loop {
        buf.clear();
        let read = tokio::select! {
            res = reader.read_until(b'\n', &mut buf) => res,
            _ = stop_rx.changed() => {
                debug!(stream, "stop requested; stream reader exiting");
                break;
            }
        };

        match read {
            Ok(0) => {
                debug!(stream, "end of input");
                break;
            }
            Ok(_) => {
                if !buf.ends_with(b"\n") {
                    buf.push(b'\n');
                }
                // Keep consuming input even when the sink is broken, so the
                // worker never blocks on a full pipe.
                if sink_ok {
                    match write_line(&writer, &buf) {
                        Ok(()) => {
                            lines.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            warn!(
                                stream,
                                error = %e,
                                "failed writing worker output; discarding the rest"
                            );
                            sink_ok = false;
                        }
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_stream_closed(&e) => {
                debug!(stream, error = %e, "stream closed by terminating process");
                break;
            }
            Err(e) => {
                warn!(stream, error = %e, "failed reading worker output");
                break;
            }
        }
    }
}

fn write_line(writer: &SharedWriter, line: &[u8]) -> io::Result<()> {
    let mut guard = writer
        .lock()
        .map_err(|_| io::Error::other("output sink lock poisoned"))?;
    guard.write_all(line)?;
    guard.flush()
}

fn is_stream_closed(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_closing_errors_end_the_stream() {
        for kind in [
            io::ErrorKind::BrokenPipe,
            io::ErrorKind::UnexpectedEof,
            io::ErrorKind::ConnectionReset,
        ] {
            assert!(is_stream_closed(&io::Error::from(kind)), "{kind:?}");
        }
        for kind in [io::ErrorKind::Interrupted, io::ErrorKind::WouldBlock, io::ErrorKind::Other] {
            assert!(!is_stream_closed(&io::Error::from(kind)), "{kind:?}");
        }
    }
}
