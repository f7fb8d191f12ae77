//! Durable instance store port.

use crate::tool_runtime::domain::{InstanceId, InstanceKey, InstanceRecord, InstanceStatus};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for instance store operations.
pub type InstanceStoreResult<T> = Result<T, InstanceStoreError>;

/// Persistence contract for provisioned instance records.
///
/// Updates must be idempotent; the runtime issues plain read-modify-write
/// sequences and tolerates last-write-wins races between status updates.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Finds an instance record by identifier.
    async fn find_instance(
        &self,
        instance_id: InstanceId,
    ) -> InstanceStoreResult<Option<InstanceRecord>>;

    /// Persists a new durable status.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceStoreError::NotFound`] when the instance does not
    /// exist.
    async fn set_instance_status(
        &self,
        instance_id: InstanceId,
        status: InstanceStatus,
    ) -> InstanceStoreResult<()>;

    /// Records or clears the OS process id backing an instance.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceStoreError::NotFound`] when the instance does not
    /// exist.
    async fn set_process_id(
        &self,
        instance_id: InstanceId,
        process_id: Option<u32>,
    ) -> InstanceStoreResult<()>;

    /// Lists every instance currently recorded with `status`.
    async fn list_instances_with_status(
        &self,
        status: InstanceStatus,
    ) -> InstanceStoreResult<Vec<InstanceRecord>>;

    /// Finds the instance recorded for a composite key.
    async fn find_instance_id(&self, key: &InstanceKey) -> InstanceStoreResult<Option<InstanceId>>;
}

/// Errors returned by instance store implementations.
#[derive(Debug, Clone, Error)]
pub enum InstanceStoreError {
    /// The instance was not found.
    #[error("instance not found: {0}")]
    NotFound(InstanceId),

    /// Persisted data could not be reconstructed into domain types.
    #[error("invalid persisted instance data: {0}")]
    InvalidPersistedData(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl InstanceStoreError {
    /// Wraps persisted-data decoding or validation failures.
    pub fn invalid_persisted_data(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }

    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
