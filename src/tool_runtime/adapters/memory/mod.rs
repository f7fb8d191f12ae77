//! In-memory adapters for tests and embedded hosts.

mod resolver;
mod store;

pub use resolver::InMemoryConfigResolver;
pub use store::InMemoryInstanceStore;
