//! In-memory configuration resolver.

use crate::tool_runtime::{
    domain::{InstanceKey, TransportConfig},
    ports::{ConfigResolver, ConfigResolverError, ConfigResolverResult},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Resolver backed by a map of preconfigured transport configurations.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConfigResolver {
    configs: Arc<RwLock<HashMap<InstanceKey, TransportConfig>>>,
}

impl InMemoryConfigResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the configuration returned for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigResolverError::Resolution`] when the lock is poisoned.
    pub fn insert(&self, key: InstanceKey, config: TransportConfig) -> ConfigResolverResult<()> {
        self.configs
            .write()
            .map_err(|err| ConfigResolverError::resolution(std::io::Error::other(err.to_string())))?
            .insert(key, config);
        Ok(())
    }

    /// Forgets the configuration for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigResolverError::Resolution`] when the lock is poisoned.
    pub fn remove(&self, key: &InstanceKey) -> ConfigResolverResult<()> {
        self.configs
            .write()
            .map_err(|err| ConfigResolverError::resolution(std::io::Error::other(err.to_string())))?
            .remove(key);
        Ok(())
    }
}

#[async_trait]
impl ConfigResolver for InMemoryConfigResolver {
    async fn resolve(&self, key: &InstanceKey) -> ConfigResolverResult<TransportConfig> {
        let configs = self
            .configs
            .read()
            .map_err(|err| ConfigResolverError::resolution(std::io::Error::other(err.to_string())))?;
        configs
            .get(key)
            .cloned()
            .ok_or(ConfigResolverError::Missing(*key))
    }
}
