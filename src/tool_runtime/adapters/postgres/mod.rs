//! `PostgreSQL` adapter for durable instance state.

mod models;
mod schema;
mod store;

pub use store::{InstancePgPool, PostgresInstanceStore};
