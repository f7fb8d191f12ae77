//! Child-process transport speaking newline-delimited JSON-RPC over stdio.
//!
//! Three background tasks accompany each process: a stdout reader that feeds
//! the frame parser and resolves pending requests, a stderr reader that only
//! captures output, and a supervisor that owns the child handle, observes its
//! exit and rejects whatever is still inflight.

use super::capture::OutputCapture;
use super::framing::{Frame, FrameParser};
use super::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use super::multiplexer::PendingRequests;
use super::signal;
use super::{ProcessExit, TransportError, TransportResult};
use crate::tool_runtime::domain::{LogLevel, ProcessTransportConfig, RuntimeSettings};
use serde_json::Value;
use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// How long the supervisor waits for buffered stdout after the process exits.
const STDOUT_DRAIN: Duration = Duration::from_millis(250);

/// Lifecycle state of a process transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessTransportState {
    /// The process was spawned but the readers are not wired yet.
    Starting,
    /// Requests may be sent.
    Connected,
    /// `close` is terminating the process.
    Closing,
    /// The process has exited or was closed.
    Closed,
    /// The process handle could not be observed.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Lifecycle {
    state: ProcessTransportState,
    exit: Option<ProcessExit>,
}

impl Lifecycle {
    const fn settled(&self) -> bool {
        self.exit.is_some() || matches!(self.state, ProcessTransportState::Failed)
    }
}

#[derive(Debug)]
struct Shared {
    pending: PendingRequests,
    lifecycle: watch::Sender<Lifecycle>,
    closing: AtomicBool,
}

/// Transport backed by a locally spawned tool-server process.
#[derive(Debug)]
pub struct ProcessTransport {
    command_line: String,
    pid: u32,
    shared: Arc<Shared>,
    stdin: Mutex<Option<ChildStdin>>,
    kill_switch: StdMutex<Option<oneshot::Sender<()>>>,
    request_timeout: Duration,
    close_grace: Duration,
    reap_wait: Duration,
}

impl ProcessTransport {
    /// Spawns the configured process and wires its stdio.
    ///
    /// The process must still be alive after the spawn settle delay.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::SpawnFailure`] naming the command when the
    /// executable cannot be started or exits immediately.
    pub async fn spawn(
        config: &ProcessTransportConfig,
        settings: &RuntimeSettings,
        capture: OutputCapture,
    ) -> TransportResult<Self> {
        let command_line = config.command_line();
        let mut child = build_command(config)
            .spawn()
            .map_err(|err| spawn_error(config, &command_line, &err))?;
        let Some(pid) = child.id() else {
            return Err(TransportError::spawn_failure(
                command_line,
                "process exited before its id could be read",
            ));
        };

        tokio::time::sleep(settings.spawn_settle()).await;
        match child.try_wait() {
            Ok(None) => {}
            Ok(Some(status)) => {
                let reason = format!("process {} immediately", ProcessExit::from(status));
                return Err(TransportError::spawn_failure(command_line, reason));
            }
            Err(err) => return Err(TransportError::spawn_failure(command_line, err.to_string())),
        }
        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(TransportError::spawn_failure(
                command_line,
                "stdio pipes were not captured",
            ));
        };

        let (lifecycle, _) = watch::channel(Lifecycle {
            state: ProcessTransportState::Starting,
            exit: None,
        });
        let shared = Arc::new(Shared {
            pending: PendingRequests::new(),
            lifecycle,
            closing: AtomicBool::new(false),
        });
        let max_line_bytes = settings.max_line_bytes();
        let reader = tokio::spawn(read_stdout(
            stdout,
            Arc::clone(&shared),
            capture.clone(),
            max_line_bytes,
            pid,
        ));
        tokio::spawn(read_stderr(stderr, capture, max_line_bytes, pid));
        let (kill_switch, kill_signal) = oneshot::channel();
        tokio::spawn(supervise(child, Arc::clone(&shared), kill_signal, reader, pid));

        shared.lifecycle.send_modify(|current| {
            if current.state == ProcessTransportState::Starting {
                current.state = ProcessTransportState::Connected;
            }
        });
        info!(pid, command = %command_line, "tool server process started");

        Ok(Self {
            command_line,
            pid,
            shared,
            stdin: Mutex::new(Some(stdin)),
            kill_switch: StdMutex::new(Some(kill_switch)),
            request_timeout: settings.request_timeout(),
            close_grace: settings.close_grace(),
            reap_wait: settings.reap_wait(),
        })
    }

    /// Sends one request and waits for its correlated response.
    ///
    /// # Errors
    ///
    /// Fails when the transport is not connected, the write fails, the
    /// request times out, the process exits while the request is pending, or
    /// the tool server answers with an error envelope.
    pub async fn send(&self, method: &str, params: Value) -> TransportResult<Value> {
        if !self.is_connected() {
            return Err(self.disconnection());
        }
        let (id, receiver) = self.shared.pending.register()?;
        let written = async {
            let frame = JsonRpcRequest::new(id, method, params).to_frame()?;
            self.write_frame(&frame).await
        }
        .await;
        if let Err(err) = written {
            self.shared.pending.forget(id);
            return Err(err);
        }
        debug!(pid = self.pid, id, method, "sent request to tool server");
        self.shared
            .pending
            .await_response(id, receiver, method, self.request_timeout)
            .await
    }

    async fn write_frame(&self, frame: &str) -> TransportResult<()> {
        let mut stdin = self.stdin.lock().await;
        let Some(pipe) = stdin.as_mut() else {
            return Err(TransportError::Closed);
        };
        pipe.write_all(frame.as_bytes())
            .await
            .map_err(|err| self.write_error(err))?;
        pipe.flush().await.map_err(|err| self.write_error(err))
    }

    /// A failed write to a process that is gone is a lost transport, not an
    /// I/O fault.
    fn write_error(&self, err: io::Error) -> TransportError {
        if err.kind() == io::ErrorKind::BrokenPipe || !self.is_connected() {
            debug!(pid = self.pid, error = %err, "tool server stdin is gone");
            self.disconnection()
        } else {
            TransportError::io(err)
        }
    }

    /// Terminates the process and rejects every pending request.
    ///
    /// The process first gets SIGTERM and the close grace period; if it is
    /// still alive it is killed and reaped for up to the reap wait. Calling
    /// `close` again, or after the process already exited, is harmless.
    pub async fn close(&self) {
        self.shared.pending.reject_all(&TransportError::Closed);
        if self.shared.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.lifecycle.send_modify(|current| {
            if !current.settled() {
                current.state = ProcessTransportState::Closing;
            }
        });
        drop(self.stdin.lock().await.take());

        if !self.shared.lifecycle.borrow().settled() {
            info!(pid = self.pid, "stopping tool server process");
            self.request_termination();
            if !self.wait_settled(self.close_grace).await {
                warn!(
                    pid = self.pid,
                    grace_ms = self.close_grace.as_millis(),
                    "tool server ignored termination; killing"
                );
                self.trigger_kill();
                if !self.wait_settled(self.reap_wait).await {
                    warn!(pid = self.pid, "tool server did not exit after kill");
                }
            }
        }
        self.shared.lifecycle.send_modify(|current| {
            if current.state != ProcessTransportState::Failed {
                current.state = ProcessTransportState::Closed;
            }
        });
    }

    fn request_termination(&self) {
        if let Err(err) = signal::terminate_process(self.pid) {
            debug!(pid = self.pid, error = %err, "SIGTERM unavailable; killing");
            self.trigger_kill();
        }
    }

    fn trigger_kill(&self) {
        let switch = self
            .kill_switch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = switch
            && sender.send(()).is_err()
        {
            debug!(pid = self.pid, "supervisor already finished");
        }
    }

    async fn wait_settled(&self, limit: Duration) -> bool {
        let mut updates = self.shared.lifecycle.subscribe();
        tokio::time::timeout(limit, updates.wait_for(Lifecycle::settled))
            .await
            .is_ok_and(|outcome| outcome.is_ok())
    }

    fn disconnection(&self) -> TransportError {
        if let Some(exit) = self.exit() {
            TransportError::ProcessExited(exit)
        } else if self.shared.closing.load(Ordering::Acquire) {
            TransportError::Closed
        } else {
            TransportError::Disconnected
        }
    }

    /// Returns whether requests may currently be sent.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        let lifecycle = *self.shared.lifecycle.borrow();
        lifecycle.state == ProcessTransportState::Connected
            && lifecycle.exit.is_none()
            && !self.shared.closing.load(Ordering::Acquire)
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ProcessTransportState {
        self.shared.lifecycle.borrow().state
    }

    /// Returns how the process ended, once it has.
    #[must_use]
    pub fn exit(&self) -> Option<ProcessExit> {
        self.shared.lifecycle.borrow().exit
    }

    /// Returns the OS process id.
    #[must_use]
    pub const fn process_id(&self) -> u32 {
        self.pid
    }

    /// Returns the command line the process was started with.
    #[must_use]
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    /// Returns the number of requests awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.len()
    }
}

fn build_command(config: &ProcessTransportConfig) -> Command {
    let mut command = Command::new(config.executable());
    command
        .args(config.args())
        .envs(config.env())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(directory) = config.working_directory() {
        command.current_dir(directory);
    }
    command
}

fn spawn_error(config: &ProcessTransportConfig, command_line: &str, err: &io::Error) -> TransportError {
    let reason = if err.kind() == io::ErrorKind::NotFound {
        format!("executable `{}` was not found ({err})", config.executable())
    } else {
        err.to_string()
    };
    TransportError::spawn_failure(command_line, reason)
}

async fn supervise(
    mut child: Child,
    shared: Arc<Shared>,
    kill_signal: oneshot::Receiver<()>,
    reader: JoinHandle<()>,
    pid: u32,
) {
    // A dropped transport also fires the kill branch.
    let waited = tokio::select! {
        status = child.wait() => status,
        _ = kill_signal => {
            if let Err(err) = child.start_kill() {
                debug!(pid, error = %err, "kill request failed");
            }
            child.wait().await
        }
    };
    // Publish the exit first so new sends fail fast; requests already
    // written may still be answered from buffered stdout during the drain.
    let rejection = match waited {
        Ok(status) => {
            let exit = ProcessExit::from(status);
            shared.lifecycle.send_modify(|current| {
                current.exit = Some(exit);
                current.state = ProcessTransportState::Closed;
            });
            if shared.closing.load(Ordering::Acquire) {
                debug!(pid, %exit, "tool server process stopped");
            } else {
                warn!(pid, %exit, "tool server process exited unexpectedly");
            }
            TransportError::ProcessExited(exit)
        }
        Err(err) => {
            shared
                .lifecycle
                .send_modify(|current| current.state = ProcessTransportState::Failed);
            error!(pid, error = %err, "failed to observe tool server process");
            TransportError::ProcessFailed(err.to_string())
        }
    };
    if tokio::time::timeout(STDOUT_DRAIN, reader).await.is_err() {
        debug!(pid, "stdout still open after process exit");
    }
    shared.pending.reject_all(&rejection);
}

async fn read_stdout<R>(
    source: R,
    shared: Arc<Shared>,
    capture: OutputCapture,
    max_line_bytes: usize,
    pid: u32,
) where
    R: AsyncRead + Unpin,
{
    let outcome = read_frames(source, max_line_bytes, |frame| match frame {
        Frame::Line(line) => {
            let decoded = JsonRpcResponse::decode(&line);
            capture.record(LogLevel::Stdout, line);
            match decoded {
                Ok(message) => {
                    if !shared.pending.complete(message) {
                        debug!(pid, "ignoring stdout message that answers no request");
                    }
                }
                Err(err) => warn!(pid, error = %err, "dropping malformed frame from tool server"),
            }
        }
        Frame::Oversized {
            preview,
            discarded_bytes,
        } => {
            warn!(pid, discarded_bytes, "dropping oversized frame from tool server");
            capture.record(
                LogLevel::Stdout,
                format!("{preview}... [truncated, {discarded_bytes} bytes discarded]"),
            );
        }
    })
    .await;
    if let Err(err) = outcome {
        warn!(pid, error = %err, "failed to read tool server stdout");
    }
    debug!(pid, "tool server stdout closed");
}

async fn read_stderr<R>(source: R, capture: OutputCapture, max_line_bytes: usize, pid: u32)
where
    R: AsyncRead + Unpin,
{
    let outcome = read_frames(source, max_line_bytes, |frame| {
        let text = match frame {
            Frame::Line(line) => line,
            Frame::Oversized {
                preview,
                discarded_bytes,
            } => format!("{preview}... [truncated, {discarded_bytes} bytes discarded]"),
        };
        warn!(pid, line = %text, "tool server stderr");
        capture.record(LogLevel::Stderr, text);
    })
    .await;
    if let Err(err) = outcome {
        debug!(pid, error = %err, "failed to read tool server stderr");
    }
}

async fn read_frames<R, F>(mut source: R, max_line_bytes: usize, mut on_frame: F) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(Frame),
{
    let mut parser = FrameParser::new(max_line_bytes);
    let mut chunk = vec![0_u8; READ_CHUNK_BYTES];
    loop {
        let count = source.read(&mut chunk).await?;
        if count == 0 {
            return Ok(());
        }
        for frame in parser.push(chunk.get(..count).unwrap_or_default()) {
            on_frame(frame);
        }
    }
}
