//! Host-facing operations: provision, call, stop and log retrieval.

use super::recovery::RecoveryCoordinator;
use super::registry::{RuntimeRegistry, RuntimeRegistryError, StartInstanceRequest};
use crate::tool_runtime::{
    domain::{InstanceId, InstanceKey, InstanceRecord, InstanceStatus, LogEntry},
    ports::{ConfigResolver, InstanceStore, InstanceStoreError},
    transport::{Transport, TransportError, force_kill_process},
};
use mockable::Clock;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// A freshly provisioned (or already running) instance.
#[derive(Debug, Clone)]
pub struct ProvisionedInstance {
    instance_id: InstanceId,
    transport: Arc<Transport>,
}

impl ProvisionedInstance {
    /// Returns the durable instance identifier.
    #[must_use]
    pub const fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Returns the live transport.
    #[must_use]
    pub const fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Returns the OS process id for process transports.
    #[must_use]
    pub fn process_id(&self) -> Option<u32> {
        self.transport.process_id()
    }
}

/// Errors surfaced to the hosting layer.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// No durable record exists for the instance.
    #[error("instance {0} not found")]
    InstanceNotFound(InstanceId),
    /// The instance has no live transport and could not be recovered.
    #[error("instance {0} is not running; please re-provision")]
    NotRunning(InstanceId),
    /// The tool server rejected or failed the call.
    #[error("call to instance {instance_id} failed: {source}")]
    CallFailed {
        /// Target instance.
        instance_id: InstanceId,
        /// Underlying transport or protocol failure.
        #[source]
        source: TransportError,
    },
    /// Registry operation failed.
    #[error(transparent)]
    Registry(#[from] RuntimeRegistryError),
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] InstanceStoreError),
}

/// Result type for invocation operations.
pub type InvocationResult<T> = Result<T, InvocationError>;

/// Entry point used by the hosting layer.
pub struct InvocationService<S, R, C>
where
    S: InstanceStore,
    R: ConfigResolver,
    C: Clock + Send + Sync + 'static,
{
    recovery: RecoveryCoordinator<S, R, C>,
}

impl<S, R, C> InvocationService<S, R, C>
where
    S: InstanceStore,
    R: ConfigResolver,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a service over `registry`, recovering lost transports through
    /// `resolver`.
    #[must_use]
    pub const fn new(registry: Arc<RuntimeRegistry<S, C>>, resolver: Arc<R>) -> Self {
        Self {
            recovery: RecoveryCoordinator::new(registry, resolver),
        }
    }

    /// Returns the underlying registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<RuntimeRegistry<S, C>> {
        self.recovery.registry()
    }

    /// Starts an instance and records its process id.
    ///
    /// An instance that is already running is returned as-is. A failed start
    /// leaves the durable status at `error`.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::Registry`] when the transport cannot be
    /// started or its status cannot be persisted.
    pub async fn provision(
        &self,
        request: StartInstanceRequest,
    ) -> InvocationResult<ProvisionedInstance> {
        let instance_id = request.instance_id();
        let key = *request.key();
        match self.registry().start_instance(request).await {
            Ok(transport) => {
                info!(
                    instance_id = %instance_id,
                    key = %key,
                    pid = ?transport.process_id(),
                    "instance provisioned"
                );
                Ok(ProvisionedInstance {
                    instance_id,
                    transport,
                })
            }
            Err(err) => {
                if matches!(err, RuntimeRegistryError::Start { .. })
                    && let Err(store_err) = self
                        .registry()
                        .store()
                        .set_instance_status(instance_id, InstanceStatus::Error)
                        .await
                {
                    error!(instance_id = %instance_id, error = %store_err, "failed to record start failure");
                }
                Err(err.into())
            }
        }
    }

    /// Invokes `method` on an instance.
    ///
    /// The instance must be recorded as `running`. A missing or dead
    /// transport is recovered first; a call that fails because the transport
    /// went away is recovered and retried once.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::NotRunning`] when no transport can be
    /// established, and [`InvocationError::CallFailed`] for transport,
    /// timeout or protocol failures.
    pub async fn call(
        &self,
        instance_id: InstanceId,
        method: &str,
        params: Value,
    ) -> InvocationResult<Value> {
        let record = self.running_record(instance_id).await?;
        let key = *record.key();
        let transport = self.connected_transport(instance_id, &key).await?;
        match transport.send(method, params.clone()).await {
            Ok(result) => Ok(result),
            Err(err) if err.is_disconnection() => {
                warn!(
                    instance_id = %instance_id,
                    method,
                    error = %err,
                    "transport lost during call; recovering"
                );
                let retry = self.connected_transport(instance_id, &key).await?;
                retry
                    .send(method, params)
                    .await
                    .map_err(|source| InvocationError::CallFailed {
                        instance_id,
                        source,
                    })
            }
            Err(source) => Err(InvocationError::CallFailed {
                instance_id,
                source,
            }),
        }
    }

    async fn running_record(&self, instance_id: InstanceId) -> InvocationResult<InstanceRecord> {
        let record = self
            .registry()
            .store()
            .find_instance(instance_id)
            .await?
            .ok_or(InvocationError::InstanceNotFound(instance_id))?;
        if record.status() == InstanceStatus::Running {
            Ok(record)
        } else {
            Err(InvocationError::NotRunning(instance_id))
        }
    }

    async fn connected_transport(
        &self,
        instance_id: InstanceId,
        key: &InstanceKey,
    ) -> InvocationResult<Arc<Transport>> {
        self.recovery
            .get_transport_with_recovery(instance_id, key)
            .await?
            .ok_or(InvocationError::NotRunning(instance_id))
    }

    /// Stops an instance in two phases: the recorded OS process is killed,
    /// then the registry closes the transport and persists `stopped`.
    ///
    /// Both phases are idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::InstanceNotFound`] for unknown instances,
    /// or the registry failure.
    pub async fn stop(&self, instance_id: InstanceId) -> InvocationResult<()> {
        let record = self
            .registry()
            .store()
            .find_instance(instance_id)
            .await?
            .ok_or(InvocationError::InstanceNotFound(instance_id))?;
        if let Some(pid) = record.process_id() {
            match force_kill_process(pid) {
                Ok(()) => debug!(instance_id = %instance_id, pid, "killed recorded process"),
                Err(err) => warn!(instance_id = %instance_id, pid, error = %err, "failed to kill recorded process"),
            }
        }
        self.registry().stop_instance(record.key()).await?;
        Ok(())
    }

    /// Returns captured output for an instance, oldest first.
    #[must_use]
    pub fn logs(&self, instance_id: InstanceId) -> Vec<LogEntry> {
        self.registry().logs(instance_id)
    }
}
