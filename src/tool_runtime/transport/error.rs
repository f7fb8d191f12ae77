//! Transport-level failures.

use std::fmt;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// How a tool-server process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessExit {
    code: Option<i32>,
    signal: Option<i32>,
}

impl ProcessExit {
    /// Creates an exit description from raw parts.
    #[must_use]
    pub const fn new(code: Option<i32>, signal: Option<i32>) -> Self {
        Self { code, signal }
    }

    /// Returns the exit code, when the process exited normally.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        self.code
    }

    /// Returns the terminating signal, when the process was signalled.
    #[must_use]
    pub const fn signal(&self) -> Option<i32> {
        self.signal
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;
        Self::new(status.code(), signal)
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(formatter, "exited with code {code}"),
            (None, Some(signal)) => write!(formatter, "terminated by signal {signal}"),
            (None, None) => formatter.write_str("exited"),
        }
    }
}

/// Errors returned by process and network transports.
///
/// Cloneable so a single failure can reject every pending request.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The executable is missing or the process died right after spawning.
    #[error("failed to start tool server `{command}`: {reason}")]
    SpawnFailure {
        /// Command line that was attempted.
        command: String,
        /// Human-readable cause.
        reason: String,
    },

    /// The tool-server process ended while the transport was in use.
    #[error("tool server process {0}")]
    ProcessExited(ProcessExit),

    /// Waiting on the process handle failed.
    #[error("tool server process failed: {0}")]
    ProcessFailed(String),

    /// The transport is not connected.
    #[error("transport is not connected")]
    Disconnected,

    /// The transport was closed by its owner.
    #[error("transport closed")]
    Closed,

    /// A single request exceeded its deadline.
    #[error("request `{method}` timed out after {}ms", timeout.as_millis())]
    RequestTimeout {
        /// Method of the timed-out request.
        method: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// The tool server answered with a JSON-RPC error envelope.
    #[error("{message}")]
    Protocol {
        /// JSON-RPC error code.
        code: i64,
        /// Error message reported by the tool server.
        message: String,
    },

    /// The HTTP endpoint answered with a non-success status.
    #[error("HTTP error: {status} {reason}")]
    HttpStatus {
        /// Numeric status code.
        status: u16,
        /// Canonical reason phrase, if known.
        reason: String,
    },

    /// The response could not be interpreted as JSON-RPC.
    #[error("invalid JSON-RPC response: {0}")]
    InvalidResponse(String),

    /// HTTP client failure.
    #[error("network request failed: {0}")]
    Network(Arc<reqwest::Error>),

    /// Pipe I/O failure.
    #[error("pipe I/O failed: {0}")]
    Io(Arc<std::io::Error>),

    /// Request encoding failure.
    #[error("failed to encode request: {0}")]
    Serialization(Arc<serde_json::Error>),
}

impl TransportError {
    /// Builds a spawn failure for `command`.
    pub fn spawn_failure(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailure {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Wraps an HTTP client failure.
    #[must_use]
    pub fn network(err: reqwest::Error) -> Self {
        Self::Network(Arc::new(err))
    }

    /// Wraps a pipe I/O failure.
    #[must_use]
    pub fn io(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }

    /// Wraps a request encoding failure.
    #[must_use]
    pub fn serialization(err: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(err))
    }

    /// Returns whether the failure means the transport itself is gone, so
    /// re-provisioning could help.
    ///
    /// [`Self::Closed`] is excluded: a deliberate close must not be undone by
    /// a retry.
    #[must_use]
    pub const fn is_disconnection(&self) -> bool {
        matches!(
            self,
            Self::ProcessExited(_) | Self::ProcessFailed(_) | Self::Disconnected
        )
    }
}
