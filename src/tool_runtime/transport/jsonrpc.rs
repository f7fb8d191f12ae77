//! JSON-RPC 2.0 envelopes.

use super::{TransportError, TransportResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

const FALLBACK_ERROR_MESSAGE: &str = "tool server error";

/// Outgoing request envelope.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

impl<'a> JsonRpcRequest<'a> {
    /// Creates a request; `null` params are sent as an empty object.
    #[must_use]
    pub fn new(id: u64, method: &'a str, params: Value) -> Self {
        let normalized = if params.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            params
        };
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params: normalized,
        }
    }

    /// Returns the correlation id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Encodes the request as one newline-terminated frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Serialization`] when encoding fails.
    pub fn to_frame(&self) -> TransportResult<String> {
        let mut frame = serde_json::to_string(self).map_err(TransportError::serialization)?;
        frame.push('\n');
        Ok(frame)
    }
}

/// Error object of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonRpcErrorObject {
    /// Error code.
    #[serde(default)]
    pub code: i64,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Optional structured details.
    #[serde(default)]
    pub data: Option<Value>,
}

/// Incoming message read from a tool server.
///
/// Server-initiated requests and notifications deserialize into the same
/// shape; [`JsonRpcResponse::correlation_id`] ignores them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

impl JsonRpcResponse {
    /// Decodes one frame.
    ///
    /// # Errors
    ///
    /// Returns the JSON error for malformed input.
    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }

    /// Returns the id this message answers, if it is a response.
    ///
    /// Numeric ids and numeric strings are both accepted.
    #[must_use]
    pub fn correlation_id(&self) -> Option<u64> {
        if self.method.is_some() {
            return None;
        }
        match self.id.as_ref()? {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.parse().ok(),
            _ => None,
        }
    }

    /// Converts the envelope into the call outcome; a missing `result`
    /// resolves to `null`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Protocol`] for error envelopes.
    pub fn into_result(self) -> TransportResult<Value> {
        match self.error {
            Some(error) => {
                let message = if error.message.trim().is_empty() {
                    FALLBACK_ERROR_MESSAGE.to_owned()
                } else {
                    error.message
                };
                Err(TransportError::Protocol {
                    code: error.code,
                    message,
                })
            }
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}
