//! Periodic reconciliation of durable status with live transports.

use super::registry::RuntimeRegistry;
use crate::tool_runtime::ports::InstanceStore;
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Handle to a running health-check task.
///
/// Dropping the handle without calling [`HealthCheckHandle::shutdown`]
/// leaves the task running until the runtime stops.
#[derive(Debug)]
pub struct HealthCheckHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl HealthCheckHandle {
    /// Returns whether the task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops the task and waits for it to finish.
    pub async fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take()
            && shutdown_tx.send(()).is_err()
        {
            debug!("health-check task already stopped");
        }
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            warn!(error = %err, "health-check task ended abnormally");
        }
    }
}

/// Scheduled sweep that calls [`RuntimeRegistry::health_check`] on the
/// configured interval.
pub struct HealthCheckTask;

impl HealthCheckTask {
    /// Spawns the sweep using the registry's health-check interval.
    ///
    /// The first sweep runs one interval after spawning.
    #[must_use]
    pub fn spawn<S, C>(registry: Arc<RuntimeRegistry<S, C>>) -> HealthCheckHandle
    where
        S: InstanceStore + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let period = registry.settings().health_check_interval();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_sweeps(registry, period, shutdown_rx));
        info!(interval_ms = period.as_millis(), "health-check task started");
        HealthCheckHandle {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

async fn run_sweeps<S, C>(
    registry: Arc<RuntimeRegistry<S, C>>,
    period: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) where
    S: InstanceStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match registry.health_check().await {
                    Ok(report) if !report.stopped().is_empty() => {
                        info!(stopped = report.stopped().len(), "health sweep stopped stale instances");
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "health sweep failed"),
                }
            }
            _ = &mut shutdown_rx => {
                info!("health-check task stopped");
                break;
            }
        }
    }
}
