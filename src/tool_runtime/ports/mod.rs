//! Port contracts for durable instance state and configuration resolution.

mod resolver;
mod store;

pub use resolver::{ConfigResolver, ConfigResolverError, ConfigResolverResult};
pub use store::{InstanceStore, InstanceStoreError, InstanceStoreResult};

#[cfg(test)]
pub(crate) use resolver::MockConfigResolver;
#[cfg(test)]
pub(crate) use store::MockInstanceStore;
