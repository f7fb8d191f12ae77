//! Domain model for the tool-server transport runtime.
//!
//! Identifies instances, describes how to reach a tool server, tracks durable
//! instance status and captured output. Process and network plumbing stays
//! outside this boundary.

mod error;
mod ids;
mod log;
mod settings;
mod status;
mod transport;

pub use error::{ParseInstanceStatusError, ParseTransportKindError, ToolRuntimeDomainError};
pub use ids::{AccountId, InstanceId, InstanceKey, OwnerId, ServerId};
pub use log::{DEFAULT_LOG_CAPACITY, LogEntry, LogLevel, LogRingBuffer};
pub use settings::RuntimeSettings;
pub use status::{InstanceRecord, InstanceStatus};
pub use transport::{
    NetworkTransportConfig, ProcessTransportConfig, TransportConfig, TransportKind,
};
