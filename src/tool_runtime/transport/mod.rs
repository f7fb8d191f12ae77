//! Transports that carry JSON-RPC requests to tool servers.
//!
//! [`Transport`] is the closed set of variants the registry manages: a local
//! process spoken to over stdio, or a remote endpoint reached over HTTP.

mod capture;
mod error;
pub mod framing;
pub mod jsonrpc;
pub mod multiplexer;
mod network;
mod process;
mod signal;

pub use capture::OutputCapture;
pub use error::{ProcessExit, TransportError, TransportResult};
pub use network::NetworkTransport;
pub use process::{ProcessTransport, ProcessTransportState};
pub use signal::{force_kill_process, terminate_process};

use crate::tool_runtime::domain::{RuntimeSettings, TransportConfig, TransportKind};
use serde_json::Value;

/// A connected tool-server transport.
#[derive(Debug)]
pub enum Transport {
    /// Local process over stdio.
    Process(ProcessTransport),
    /// Remote endpoint over HTTP.
    Network(NetworkTransport),
}

impl Transport {
    /// Connects the transport described by `config`.
    ///
    /// Process output is captured into `capture`; network transports ignore
    /// it.
    ///
    /// # Errors
    ///
    /// Returns the spawn or client construction failure.
    pub async fn connect(
        config: &TransportConfig,
        settings: &RuntimeSettings,
        capture: OutputCapture,
    ) -> TransportResult<Self> {
        match config {
            TransportConfig::Process(process) => {
                ProcessTransport::spawn(process, settings, capture)
                    .await
                    .map(Self::Process)
            }
            TransportConfig::Network(network) => NetworkTransport::new(network).map(Self::Network),
        }
    }

    /// Sends a request and waits for its result.
    ///
    /// # Errors
    ///
    /// Returns the variant's transport failure.
    pub async fn send(&self, method: &str, params: Value) -> TransportResult<Value> {
        match self {
            Self::Process(process) => process.send(method, params).await,
            Self::Network(network) => network.send(method, params).await,
        }
    }

    /// Releases the transport; pending requests are rejected.
    pub async fn close(&self) {
        match self {
            Self::Process(process) => process.close().await,
            Self::Network(network) => network.close(),
        }
    }

    /// Returns whether requests may currently be sent.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        match self {
            Self::Process(process) => process.is_connected(),
            Self::Network(network) => network.is_connected(),
        }
    }

    /// Returns the OS process id for process transports.
    #[must_use]
    pub const fn process_id(&self) -> Option<u32> {
        match self {
            Self::Process(process) => Some(process.process_id()),
            Self::Network(_) => None,
        }
    }

    /// Returns the transport kind.
    #[must_use]
    pub const fn kind(&self) -> TransportKind {
        match self {
            Self::Process(_) => TransportKind::Process,
            Self::Network(_) => TransportKind::Network,
        }
    }
}

impl From<ProcessTransport> for Transport {
    fn from(transport: ProcessTransport) -> Self {
        Self::Process(transport)
    }
}

impl From<NetworkTransport> for Transport {
    fn from(transport: NetworkTransport) -> Self {
        Self::Network(transport)
    }
}
