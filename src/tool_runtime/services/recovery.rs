//! Transparent re-provisioning of instances whose transport was lost.

use super::registry::{RuntimeRegistry, RuntimeRegistryResult, StartInstanceRequest};
use crate::tool_runtime::{
    domain::{InstanceId, InstanceKey},
    ports::{ConfigResolver, InstanceStore},
    transport::Transport,
};
use mockable::Clock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Re-establishes transports for instances the store still records as
/// `running`.
///
/// Any failure while resolving configuration or restarting forces the
/// durable status to `stopped`, so later calls fail fast instead of retrying
/// recovery.
pub struct RecoveryCoordinator<S, R, C>
where
    S: InstanceStore,
    R: ConfigResolver,
    C: Clock + Send + Sync + 'static,
{
    registry: Arc<RuntimeRegistry<S, C>>,
    resolver: Arc<R>,
}

impl<S, R, C> RecoveryCoordinator<S, R, C>
where
    S: InstanceStore,
    R: ConfigResolver,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a coordinator over `registry`.
    #[must_use]
    pub const fn new(registry: Arc<RuntimeRegistry<S, C>>, resolver: Arc<R>) -> Self {
        Self { registry, resolver }
    }

    /// Returns the registry this coordinator restarts instances through.
    #[must_use]
    pub const fn registry(&self) -> &Arc<RuntimeRegistry<S, C>> {
        &self.registry
    }

    /// Returns a connected transport for `key`, re-provisioning it when the
    /// durable record says it should be running.
    ///
    /// Yields `None` when the instance is unknown, deliberately not running,
    /// or recovery failed.
    ///
    /// # Errors
    ///
    /// Returns a store error when the durable record cannot be read.
    pub async fn get_transport_with_recovery(
        &self,
        instance_id: InstanceId,
        key: &InstanceKey,
    ) -> RuntimeRegistryResult<Option<Arc<Transport>>> {
        if let Some(live) = self.registry.get_transport(key).await
            && live.is_connected()
        {
            return Ok(Some(live));
        }

        let Some(record) = self.registry.store().find_instance(instance_id).await? else {
            debug!(instance_id = %instance_id, "no durable record; skipping recovery");
            return Ok(None);
        };
        if !record.status().is_recoverable() {
            debug!(
                instance_id = %instance_id,
                status = %record.status(),
                "instance not running; skipping recovery"
            );
            return Ok(None);
        }

        info!(instance_id = %instance_id, key = %key, "recovering instance");
        let config = match self.resolver.resolve(key).await {
            Ok(config) => config,
            Err(err) => {
                warn!(
                    instance_id = %instance_id,
                    key = %key,
                    error = %err,
                    "failed to resolve configuration during recovery"
                );
                self.mark_stopped(instance_id).await;
                return Ok(None);
            }
        };

        let request = StartInstanceRequest::new(instance_id, *key, config);
        match self.registry.recover_instance(request).await {
            Ok(Some(transport)) => {
                info!(instance_id = %instance_id, key = %key, "instance recovered");
                Ok(Some(transport))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                warn!(
                    instance_id = %instance_id,
                    key = %key,
                    error = %err,
                    "failed to restart instance during recovery"
                );
                self.mark_stopped(instance_id).await;
                Ok(None)
            }
        }
    }

    async fn mark_stopped(&self, instance_id: InstanceId) {
        if let Err(err) = self.registry.mark_stopped(instance_id).await {
            error!(instance_id = %instance_id, error = %err, "failed to mark instance stopped");
        }
    }
}
