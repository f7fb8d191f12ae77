//! Adapter implementations for the instance store and configuration resolver
//! ports.

pub mod memory;
pub mod postgres;
