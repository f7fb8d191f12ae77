//! Durable instance status and the persisted instance record.

use super::{InstanceId, InstanceKey, ParseInstanceStatusError, TransportKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Durable status of a provisioned instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Provisioning has been requested but no transport is live yet.
    Starting,
    /// The instance should be backed by a live transport.
    Running,
    /// The instance was stopped deliberately or reconciled as dead.
    Stopped,
    /// Provisioning failed.
    Error,
}

impl InstanceStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }

    /// Returns whether recovery may re-provision an instance in this status.
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for InstanceStatus {
    type Error = ParseInstanceStatusError;

    fn try_from(value: &str) -> Result<Self, ParseInstanceStatusError> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "error" => Ok(Self::Error),
            _ => Err(ParseInstanceStatusError(value.to_owned())),
        }
    }
}

/// Durable view of one instance as reported by the instance store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    id: InstanceId,
    key: InstanceKey,
    status: InstanceStatus,
    transport_kind: TransportKind,
    process_id: Option<u32>,
}

impl InstanceRecord {
    /// Creates a record with no recorded process id.
    #[must_use]
    pub const fn new(
        id: InstanceId,
        key: InstanceKey,
        status: InstanceStatus,
        transport_kind: TransportKind,
    ) -> Self {
        Self {
            id,
            key,
            status,
            transport_kind,
            process_id: None,
        }
    }

    /// Replaces the durable status.
    #[must_use]
    pub const fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the recorded OS process id.
    #[must_use]
    pub const fn with_process_id(mut self, process_id: Option<u32>) -> Self {
        self.process_id = process_id;
        self
    }

    /// Returns the instance identifier.
    #[must_use]
    pub const fn id(&self) -> InstanceId {
        self.id
    }

    /// Returns the composite key.
    #[must_use]
    pub const fn key(&self) -> &InstanceKey {
        &self.key
    }

    /// Returns the durable status.
    #[must_use]
    pub const fn status(&self) -> InstanceStatus {
        self.status
    }

    /// Returns the configured transport kind.
    #[must_use]
    pub const fn transport_kind(&self) -> TransportKind {
        self.transport_kind
    }

    /// Returns the last recorded OS process id.
    #[must_use]
    pub const fn process_id(&self) -> Option<u32> {
        self.process_id
    }
}
