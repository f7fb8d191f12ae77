//! Transport runtime for JSON-RPC tool servers.
//!
//! Owns the lifecycle of every tool-server connection: spawning and stopping
//! child processes or wiring HTTP clients, multiplexing concurrent requests
//! over one stdio pipe, capturing process output, and re-provisioning lost
//! connections from durable configuration. The module follows hexagonal
//! architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Transports in [`transport`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
pub mod transport;
