//! Remote transport: one HTTP POST per JSON-RPC request.

use super::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use super::{TransportError, TransportResult};
use crate::tool_runtime::domain::NetworkTransportConfig;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Stateless transport to a remotely hosted tool server.
///
/// Every request is independent, so the transport always reports itself as
/// connected.
#[derive(Debug)]
pub struct NetworkTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    next_id: AtomicU64,
}

impl NetworkTransport {
    /// Creates a transport for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] when the HTTP client cannot be
    /// built.
    pub fn new(config: &NetworkTransportConfig) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(TransportError::network)?;
        Ok(Self {
            client,
            base_url: config.base_url().to_owned(),
            timeout: config.timeout(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Posts one request and returns its result.
    ///
    /// # Errors
    ///
    /// Fails on timeout, transport errors, non-success HTTP status, bodies
    /// that are not JSON-RPC, or error envelopes.
    pub async fn send(&self, method: &str, params: Value) -> TransportResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        debug!(url = %self.base_url, id, method, "posting request to tool server");
        tokio::time::timeout(self.timeout, self.exchange(&request))
            .await
            .map_err(|_| TransportError::RequestTimeout {
                method: method.to_owned(),
                timeout: self.timeout,
            })?
    }

    async fn exchange(&self, request: &JsonRpcRequest<'_>) -> TransportResult<Value> {
        let response = self
            .client
            .post(&self.base_url)
            .json(request)
            .send()
            .await
            .map_err(TransportError::network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_owned(),
            });
        }
        let body = response.text().await.map_err(TransportError::network)?;
        JsonRpcResponse::decode(&body)
            .map_err(|err| TransportError::InvalidResponse(err.to_string()))?
            .into_result()
    }

    /// No-op; there is no connection to tear down.
    pub fn close(&self) {
        debug!(url = %self.base_url, "closing network transport");
    }

    /// Always `true`.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        true
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
