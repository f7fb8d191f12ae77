//! Shared sink for tool-server output lines.

use crate::tool_runtime::domain::{LogEntry, LogLevel, LogRingBuffer};
use mockable::Clock;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Timestamped, bounded output log shared between a transport's reader tasks
/// and the registry.
///
/// Clones refer to the same buffer.
#[derive(Clone)]
pub struct OutputCapture {
    buffer: Arc<Mutex<LogRingBuffer>>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl OutputCapture {
    /// Creates an empty capture retaining at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(LogRingBuffer::with_capacity(capacity))),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogRingBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a line stamped with the current time.
    pub fn record(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry::new(self.clock.utc(), level, message);
        self.lock().push(entry);
    }

    /// Returns the retained entries, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().snapshot()
    }
}

impl fmt::Debug for OutputCapture {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buffer = self.lock();
        formatter
            .debug_struct("OutputCapture")
            .field("len", &buffer.len())
            .field("capacity", &buffer.capacity())
            .finish_non_exhaustive()
    }
}
