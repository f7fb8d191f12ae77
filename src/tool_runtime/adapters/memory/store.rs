//! In-memory instance store.

use crate::tool_runtime::{
    domain::{InstanceId, InstanceKey, InstanceRecord, InstanceStatus},
    ports::{InstanceStore, InstanceStoreError, InstanceStoreResult},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Thread-safe in-memory instance store.
///
/// Clones share state, so a test can keep a handle while the registry owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInstanceStore {
    state: Arc<RwLock<HashMap<InstanceId, InstanceRecord>>>,
}

impl InMemoryInstanceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceStoreError::Persistence`] when the lock is poisoned.
    pub fn insert(&self, record: InstanceRecord) -> InstanceStoreResult<()> {
        self.write()?.insert(record.id(), record);
        Ok(())
    }

    fn read(&self) -> InstanceStoreResult<RwLockReadGuard<'_, HashMap<InstanceId, InstanceRecord>>> {
        self.state
            .read()
            .map_err(|err| InstanceStoreError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(
        &self,
    ) -> InstanceStoreResult<RwLockWriteGuard<'_, HashMap<InstanceId, InstanceRecord>>> {
        self.state
            .write()
            .map_err(|err| InstanceStoreError::persistence(std::io::Error::other(err.to_string())))
    }

    fn update(
        &self,
        instance_id: InstanceId,
        change: impl FnOnce(InstanceRecord) -> InstanceRecord,
    ) -> InstanceStoreResult<()> {
        let mut state = self.write()?;
        let current = state
            .remove(&instance_id)
            .ok_or(InstanceStoreError::NotFound(instance_id))?;
        state.insert(instance_id, change(current));
        Ok(())
    }
}

#[async_trait]
impl InstanceStore for InMemoryInstanceStore {
    async fn find_instance(
        &self,
        instance_id: InstanceId,
    ) -> InstanceStoreResult<Option<InstanceRecord>> {
        Ok(self.read()?.get(&instance_id).cloned())
    }

    async fn set_instance_status(
        &self,
        instance_id: InstanceId,
        status: InstanceStatus,
    ) -> InstanceStoreResult<()> {
        self.update(instance_id, |record| record.with_status(status))
    }

    async fn set_process_id(
        &self,
        instance_id: InstanceId,
        process_id: Option<u32>,
    ) -> InstanceStoreResult<()> {
        self.update(instance_id, |record| record.with_process_id(process_id))
    }

    async fn list_instances_with_status(
        &self,
        status: InstanceStatus,
    ) -> InstanceStoreResult<Vec<InstanceRecord>> {
        Ok(self
            .read()?
            .values()
            .filter(|record| record.status() == status)
            .cloned()
            .collect())
    }

    async fn find_instance_id(&self, key: &InstanceKey) -> InstanceStoreResult<Option<InstanceId>> {
        Ok(self
            .read()?
            .values()
            .find(|record| record.key() == key)
            .map(InstanceRecord::id))
    }
}
