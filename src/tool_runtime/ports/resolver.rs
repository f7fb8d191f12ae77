//! Configuration resolver port used during recovery.

use crate::tool_runtime::domain::{InstanceKey, TransportConfig};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for configuration resolution.
pub type ConfigResolverResult<T> = Result<T, ConfigResolverError>;

/// Rebuilds a start configuration from durable server and account records.
///
/// Implementations may decrypt credentials and materialize credential files
/// for the process environment; the runtime treats that work as opaque.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigResolver: Send + Sync {
    /// Resolves the transport configuration for `key`.
    async fn resolve(&self, key: &InstanceKey) -> ConfigResolverResult<TransportConfig>;
}

/// Errors returned while resolving a transport configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigResolverError {
    /// No server or account record backs the key.
    #[error("no configuration is recorded for instance key {0}")]
    Missing(InstanceKey),

    /// Credential material could not be produced.
    #[error("credentials for instance key {key} are unavailable: {reason}")]
    CredentialsUnavailable {
        /// Key being resolved.
        key: InstanceKey,
        /// Human-readable reason.
        reason: String,
    },

    /// Any other resolution failure.
    #[error("configuration resolution failed: {0}")]
    Resolution(Arc<dyn std::error::Error + Send + Sync>),
}

impl ConfigResolverError {
    /// Wraps an underlying resolution failure.
    pub fn resolution(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Resolution(Arc::new(err))
    }
}
