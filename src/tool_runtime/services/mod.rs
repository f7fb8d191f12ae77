//! Application services for instance lifecycle, recovery and invocation.

mod health;
mod invocation;
mod recovery;
mod registry;

pub use health::{HealthCheckHandle, HealthCheckTask};
pub use invocation::{InvocationError, InvocationResult, InvocationService, ProvisionedInstance};
pub use recovery::RecoveryCoordinator;
pub use registry::{
    HealthSweepReport, RuntimeRegistry, RuntimeRegistryError, RuntimeRegistryResult,
    StartInstanceRequest,
};
