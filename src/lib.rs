//! Switchyard: transport runtime for JSON-RPC tool servers.
//!
//! This crate owns the lifecycle of tool-server connections: spawning and
//! stopping local tool-server processes, talking to remote ones over HTTP,
//! multiplexing concurrent JSON-RPC requests, capturing output, and
//! re-provisioning connections that were lost.
//!
//! # Architecture
//!
//! Switchyard follows hexagonal architecture principles:
//!
//! - **Domain**: Identifiers, transport configuration, status and log types
//! - **Ports**: Abstract trait interfaces for durable state and configuration
//! - **Adapters**: Concrete implementations of ports (in-memory, `PostgreSQL`)
//!
//! # Modules
//!
//! - [`tool_runtime`]: Transports, registry, recovery and invocation services

pub mod tool_runtime;
