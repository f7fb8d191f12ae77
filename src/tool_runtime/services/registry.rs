//! Registry of live transports keyed by instance.

use crate::tool_runtime::{
    domain::{InstanceId, InstanceKey, InstanceStatus, LogEntry, RuntimeSettings, TransportConfig},
    ports::{InstanceStore, InstanceStoreError},
    transport::{OutputCapture, Transport, TransportError},
};
use mockable::Clock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock as StdRwLock};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Request payload for starting an instance.
#[derive(Debug, Clone, PartialEq)]
pub struct StartInstanceRequest {
    instance_id: InstanceId,
    key: InstanceKey,
    transport: TransportConfig,
}

impl StartInstanceRequest {
    /// Creates a start request.
    #[must_use]
    pub const fn new(instance_id: InstanceId, key: InstanceKey, transport: TransportConfig) -> Self {
        Self {
            instance_id,
            key,
            transport,
        }
    }

    /// Returns the durable instance identifier.
    #[must_use]
    pub const fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Returns the registry key.
    #[must_use]
    pub const fn key(&self) -> &InstanceKey {
        &self.key
    }

    /// Returns the transport configuration.
    #[must_use]
    pub const fn transport(&self) -> &TransportConfig {
        &self.transport
    }
}

/// Service-level errors for registry operations.
#[derive(Debug, Error)]
pub enum RuntimeRegistryError {
    /// The transport could not be established.
    #[error("failed to start instance {key}: {source}")]
    Start {
        /// Key being started.
        key: InstanceKey,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] InstanceStoreError),
}

/// Result type for registry operations.
pub type RuntimeRegistryResult<T> = Result<T, RuntimeRegistryError>;

/// Outcome of one health sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthSweepReport {
    checked: usize,
    stopped: Vec<InstanceId>,
    failed: Vec<InstanceId>,
}

impl HealthSweepReport {
    /// Returns how many durable `running` records were inspected.
    #[must_use]
    pub const fn checked(&self) -> usize {
        self.checked
    }

    /// Returns instances flipped to `stopped`.
    #[must_use]
    pub fn stopped(&self) -> &[InstanceId] {
        &self.stopped
    }

    /// Returns instances whose status update failed.
    #[must_use]
    pub fn failed(&self) -> &[InstanceId] {
        &self.failed
    }
}

/// Process-wide map from instance key to live transport.
///
/// Holds at most one transport per key. Starts and stops for the same key are
/// serialized; different keys proceed independently.
pub struct RuntimeRegistry<S, C>
where
    S: InstanceStore,
    C: Clock + Send + Sync + 'static,
{
    store: Arc<S>,
    clock: Arc<C>,
    settings: RuntimeSettings,
    transports: RwLock<HashMap<InstanceKey, Arc<Transport>>>,
    key_locks: Mutex<HashMap<InstanceKey, Arc<AsyncMutex<()>>>>,
    captures: StdRwLock<HashMap<InstanceId, OutputCapture>>,
}

impl<S, C> RuntimeRegistry<S, C>
where
    S: InstanceStore,
    C: Clock + Send + Sync + 'static,
{
    /// Creates an empty registry.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<C>, settings: RuntimeSettings) -> Self {
        Self {
            store,
            clock,
            settings,
            transports: RwLock::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
            captures: StdRwLock::new(HashMap::new()),
        }
    }

    /// Returns the runtime settings.
    #[must_use]
    pub const fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// Returns the instance store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn key_lock(&self, key: &InstanceKey) -> Arc<AsyncMutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(*key).or_default())
    }

    /// Drops the lock entry for `key` once nobody else holds or awaits it.
    fn release_key_lock(&self, key: &InstanceKey, lock: &Arc<AsyncMutex<()>>) {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference lives in the map, the other is `lock`.
        if Arc::strong_count(lock) <= 2 {
            locks.remove(key);
        }
    }

    /// Runs `operation` while holding the per-key lock.
    async fn with_key_lock<T>(
        &self,
        key: &InstanceKey,
        operation: impl Future<Output = T>,
    ) -> T {
        let lock = self.key_lock(key);
        let outcome = {
            let _serialized = lock.lock().await;
            operation.await
        };
        self.release_key_lock(key, &lock);
        outcome
    }

    fn capture_for(&self, instance_id: InstanceId) -> OutputCapture {
        let mut captures = self.captures.write().unwrap_or_else(PoisonError::into_inner);
        captures
            .entry(instance_id)
            .or_insert_with(|| {
                let clock: Arc<dyn Clock + Send + Sync> = Arc::clone(&self.clock) as _;
                OutputCapture::new(self.settings.log_capacity(), clock)
            })
            .clone()
    }

    /// Starts an instance, or returns its live transport.
    ///
    /// A registered but disconnected transport is closed and replaced. The
    /// durable status becomes `running` before the transport is registered;
    /// if that write fails the new transport is closed again.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeRegistryError::Start`] when the transport cannot be
    /// established, or a store error when `running` cannot be persisted.
    pub async fn start_instance(
        &self,
        request: StartInstanceRequest,
    ) -> RuntimeRegistryResult<Arc<Transport>> {
        let key = request.key;
        self.with_key_lock(&key, self.start_serialized(request)).await
    }

    /// Restarts an instance whose durable record is still `running`.
    ///
    /// The record is read again under the per-key lock, so a stop that
    /// completed while recovery was resolving its configuration wins and
    /// nothing is spawned.
    ///
    /// # Errors
    ///
    /// Same as [`Self::start_instance`], plus a store error when the record
    /// cannot be read.
    pub async fn recover_instance(
        &self,
        request: StartInstanceRequest,
    ) -> RuntimeRegistryResult<Option<Arc<Transport>>> {
        let key = request.key;
        self.with_key_lock(&key, async move {
            let instance_id = request.instance_id;
            let recoverable = self
                .store
                .find_instance(instance_id)
                .await?
                .is_some_and(|record| record.status().is_recoverable());
            if !recoverable {
                debug!(
                    instance_id = %instance_id,
                    key = %key,
                    "instance no longer running; not recovering"
                );
                return Ok(None);
            }
            self.start_serialized(request).await.map(Some)
        })
        .await
    }

    async fn start_serialized(
        &self,
        request: StartInstanceRequest,
    ) -> RuntimeRegistryResult<Arc<Transport>> {
        let key = request.key;
        let instance_id = request.instance_id;

        let existing = self.transports.read().await.get(&key).cloned();
        if let Some(live) = existing {
            if live.is_connected() {
                debug!(instance_id = %instance_id, key = %key, "instance already running");
                return Ok(live);
            }
            info!(instance_id = %instance_id, key = %key, "replacing disconnected transport");
            self.transports.write().await.remove(&key);
            live.close().await;
        }

        let capture = self.capture_for(instance_id);
        let transport = Transport::connect(&request.transport, &self.settings, capture)
            .await
            .map_err(|source| {
                warn!(
                    instance_id = %instance_id,
                    key = %key,
                    error = %source,
                    "failed to start instance"
                );
                RuntimeRegistryError::Start { key, source }
            })?;
        let started = Arc::new(transport);

        if let Err(err) = self
            .store
            .set_instance_status(instance_id, InstanceStatus::Running)
            .await
        {
            error!(instance_id = %instance_id, key = %key, error = %err, "failed to persist running status");
            started.close().await;
            return Err(err.into());
        }
        if let Some(pid) = started.process_id()
            && let Err(err) = self.store.set_process_id(instance_id, Some(pid)).await
        {
            warn!(instance_id = %instance_id, pid, error = %err, "failed to record process id");
        }

        self.transports
            .write()
            .await
            .insert(key, Arc::clone(&started));
        info!(
            instance_id = %instance_id,
            key = %key,
            kind = %started.kind(),
            pid = ?started.process_id(),
            "instance started"
        );
        Ok(started)
    }

    /// Stops an instance.
    ///
    /// Any live transport is closed and removed. The durable record, if one
    /// exists for the key, is always set to `stopped`, even when nothing was
    /// registered in memory.
    ///
    /// # Errors
    ///
    /// Returns a store error when the durable record cannot be updated.
    pub async fn stop_instance(&self, key: &InstanceKey) -> RuntimeRegistryResult<()> {
        self.with_key_lock(key, async {
            let removed = self.transports.write().await.remove(key);
            if let Some(transport) = removed {
                transport.close().await;
                info!(key = %key, "transport closed");
            } else {
                debug!(key = %key, "no live transport to close");
            }

            let Some(instance_id) = self.store.find_instance_id(key).await? else {
                debug!(key = %key, "no durable record for stopped key");
                return Ok(());
            };
            self.mark_stopped(instance_id).await?;
            info!(instance_id = %instance_id, key = %key, "instance stopped");
            Ok(())
        })
        .await
    }

    /// Persists `stopped` and clears the recorded process id.
    ///
    /// A process id that cannot be cleared is logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns a store error when the status cannot be written.
    pub async fn mark_stopped(&self, instance_id: InstanceId) -> RuntimeRegistryResult<()> {
        self.store
            .set_instance_status(instance_id, InstanceStatus::Stopped)
            .await?;
        if let Err(err) = self.store.set_process_id(instance_id, None).await {
            warn!(instance_id = %instance_id, error = %err, "failed to clear process id");
        }
        Ok(())
    }

    /// Returns the registered transport for `key`, connected or not.
    pub async fn get_transport(&self, key: &InstanceKey) -> Option<Arc<Transport>> {
        self.transports.read().await.get(key).cloned()
    }

    /// Returns whether a connected transport is registered for `key`.
    pub async fn is_running(&self, key: &InstanceKey) -> bool {
        self.transports
            .read()
            .await
            .get(key)
            .is_some_and(|transport| transport.is_connected())
    }

    /// Reconciles durable `running` records with live transports.
    ///
    /// Every record without a connected transport is flipped to `stopped`.
    ///
    /// # Errors
    ///
    /// Returns a store error when the `running` records cannot be listed.
    /// Individual update failures are reported in the sweep result.
    pub async fn health_check(&self) -> RuntimeRegistryResult<HealthSweepReport> {
        let running = self
            .store
            .list_instances_with_status(InstanceStatus::Running)
            .await?;
        let mut report = HealthSweepReport::default();
        for record in running {
            report.checked += 1;
            if self.is_running(record.key()).await {
                continue;
            }
            let instance_id = record.id();
            let outcome = self
                .with_key_lock(record.key(), self.reconcile(instance_id, record.key()))
                .await;
            match outcome {
                Ok(true) => {
                    warn!(
                        instance_id = %instance_id,
                        key = %record.key(),
                        "marked instance stopped: no live transport"
                    );
                    report.stopped.push(instance_id);
                }
                Ok(false) => {}
                Err(err) => {
                    error!(instance_id = %instance_id, error = %err, "failed to mark instance stopped");
                    report.failed.push(instance_id);
                }
            }
        }
        debug!(
            checked = report.checked,
            stopped = report.stopped.len(),
            "health sweep finished"
        );
        Ok(report)
    }

    /// Flips one record to `stopped` unless a start finished in the meantime.
    ///
    /// Must run under the per-key lock. Returns whether the record changed.
    async fn reconcile(
        &self,
        instance_id: InstanceId,
        key: &InstanceKey,
    ) -> RuntimeRegistryResult<bool> {
        if self.is_running(key).await {
            return Ok(false);
        }
        let still_running = self
            .store
            .find_instance(instance_id)
            .await?
            .is_some_and(|current| current.status() == InstanceStatus::Running);
        if !still_running {
            return Ok(false);
        }
        self.mark_stopped(instance_id).await?;
        Ok(true)
    }

    /// Closes every transport concurrently, then clears all in-memory state.
    pub async fn cleanup(&self) {
        let drained: Vec<Arc<Transport>> = self
            .transports
            .write()
            .await
            .drain()
            .map(|(_, transport)| transport)
            .collect();
        let count = drained.len();
        let mut closing = JoinSet::new();
        for transport in drained {
            closing.spawn(async move { transport.close().await });
        }
        while let Some(joined) = closing.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "transport close task failed");
            }
        }
        self.captures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!(closed = count, "runtime registry cleaned up");
    }

    /// Returns captured output for an instance, oldest first.
    ///
    /// Unknown instances yield an empty log.
    #[must_use]
    pub fn logs(&self, instance_id: InstanceId) -> Vec<LogEntry> {
        self.captures
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&instance_id)
            .map(OutputCapture::snapshot)
            .unwrap_or_default()
    }
}
