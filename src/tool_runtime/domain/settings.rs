//! Tunables for the transport runtime.
//!
//! Durations are carried as milliseconds so settings can be deserialized from
//! plain configuration files; accessors return [`Duration`] values.

use super::{DEFAULT_LOG_CAPACITY, ToolRuntimeDomainError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CLOSE_GRACE_MS: u64 = 1_000;
const DEFAULT_REAP_WAIT_MS: u64 = 500;
const DEFAULT_SPAWN_SETTLE_MS: u64 = 100;
const DEFAULT_HEALTH_CHECK_INTERVAL_MS: u64 = 5 * 60 * 1_000;
const DEFAULT_MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Runtime-wide limits and timings.
///
/// Deserialization fills missing fields with defaults and rejects zero
/// values the same way the builder methods do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSettings")]
pub struct RuntimeSettings {
    request_timeout_ms: u64,
    close_grace_ms: u64,
    reap_wait_ms: u64,
    spawn_settle_ms: u64,
    health_check_interval_ms: u64,
    max_line_bytes: usize,
    log_capacity: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            close_grace_ms: DEFAULT_CLOSE_GRACE_MS,
            reap_wait_ms: DEFAULT_REAP_WAIT_MS,
            spawn_settle_ms: DEFAULT_SPAWN_SETTLE_MS,
            health_check_interval_ms: DEFAULT_HEALTH_CHECK_INTERVAL_MS,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

/// Unvalidated settings as they appear in configuration files.
#[derive(Deserialize)]
#[serde(default)]
struct RawSettings {
    request_timeout_ms: u64,
    close_grace_ms: u64,
    reap_wait_ms: u64,
    spawn_settle_ms: u64,
    health_check_interval_ms: u64,
    max_line_bytes: usize,
    log_capacity: usize,
}

impl Default for RawSettings {
    fn default() -> Self {
        let defaults = RuntimeSettings::default();
        Self {
            request_timeout_ms: defaults.request_timeout_ms,
            close_grace_ms: defaults.close_grace_ms,
            reap_wait_ms: defaults.reap_wait_ms,
            spawn_settle_ms: defaults.spawn_settle_ms,
            health_check_interval_ms: defaults.health_check_interval_ms,
            max_line_bytes: defaults.max_line_bytes,
            log_capacity: defaults.log_capacity,
        }
    }
}

impl TryFrom<RawSettings> for RuntimeSettings {
    type Error = ToolRuntimeDomainError;

    fn try_from(raw: RawSettings) -> Result<Self, ToolRuntimeDomainError> {
        let positive = |name: &'static str, value: u64| {
            if value == 0 {
                Err(ToolRuntimeDomainError::NonPositiveSetting(name))
            } else {
                Ok(value)
            }
        };
        let settings = Self {
            request_timeout_ms: positive("request_timeout", raw.request_timeout_ms)?,
            close_grace_ms: raw.close_grace_ms,
            reap_wait_ms: raw.reap_wait_ms,
            spawn_settle_ms: raw.spawn_settle_ms,
            health_check_interval_ms: positive(
                "health_check_interval",
                raw.health_check_interval_ms,
            )?,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            log_capacity: DEFAULT_LOG_CAPACITY,
        };
        settings
            .with_max_line_bytes(raw.max_line_bytes)?
            .with_log_capacity(raw.log_capacity)
    }
}

impl RuntimeSettings {
    /// Overrides the per-request timeout of process transports.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRuntimeDomainError::NonPositiveSetting`] for zero.
    pub fn with_request_timeout(mut self, value: Duration) -> Result<Self, ToolRuntimeDomainError> {
        self.request_timeout_ms = positive_millis("request_timeout", value)?;
        Ok(self)
    }

    /// Overrides how long `close()` waits after the graceful signal.
    #[must_use]
    pub fn with_close_grace(mut self, value: Duration) -> Self {
        self.close_grace_ms = millis(value);
        self
    }

    /// Overrides how long `close()` waits for reaping after a forceful kill.
    #[must_use]
    pub fn with_reap_wait(mut self, value: Duration) -> Self {
        self.reap_wait_ms = millis(value);
        self
    }

    /// Overrides the delay before a freshly spawned process is checked for an
    /// immediate exit.
    #[must_use]
    pub fn with_spawn_settle(mut self, value: Duration) -> Self {
        self.spawn_settle_ms = millis(value);
        self
    }

    /// Overrides the health sweep period.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRuntimeDomainError::NonPositiveSetting`] for zero.
    pub fn with_health_check_interval(
        mut self,
        value: Duration,
    ) -> Result<Self, ToolRuntimeDomainError> {
        self.health_check_interval_ms = positive_millis("health_check_interval", value)?;
        Ok(self)
    }

    /// Overrides the longest accepted stdout line.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRuntimeDomainError::NonPositiveSetting`] for zero.
    pub fn with_max_line_bytes(mut self, value: usize) -> Result<Self, ToolRuntimeDomainError> {
        if value == 0 {
            return Err(ToolRuntimeDomainError::NonPositiveSetting("max_line_bytes"));
        }
        self.max_line_bytes = value;
        Ok(self)
    }

    /// Overrides the number of log entries kept per instance.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRuntimeDomainError::NonPositiveSetting`] for zero.
    pub fn with_log_capacity(mut self, value: usize) -> Result<Self, ToolRuntimeDomainError> {
        if value == 0 {
            return Err(ToolRuntimeDomainError::NonPositiveSetting("log_capacity"));
        }
        self.log_capacity = value;
        Ok(self)
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Returns the graceful shutdown window.
    #[must_use]
    pub const fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    /// Returns the post-kill reaping window.
    #[must_use]
    pub const fn reap_wait(&self) -> Duration {
        Duration::from_millis(self.reap_wait_ms)
    }

    /// Returns the spawn verification delay.
    #[must_use]
    pub const fn spawn_settle(&self) -> Duration {
        Duration::from_millis(self.spawn_settle_ms)
    }

    /// Returns the health sweep period.
    #[must_use]
    pub const fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    /// Returns the longest accepted stdout line in bytes.
    #[must_use]
    pub const fn max_line_bytes(&self) -> usize {
        self.max_line_bytes
    }

    /// Returns the per-instance log capacity.
    #[must_use]
    pub const fn log_capacity(&self) -> usize {
        self.log_capacity
    }
}

fn millis(value: Duration) -> u64 {
    u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
}

fn positive_millis(name: &'static str, value: Duration) -> Result<u64, ToolRuntimeDomainError> {
    match millis(value) {
        0 => Err(ToolRuntimeDomainError::NonPositiveSetting(name)),
        converted => Ok(converted),
    }
}
