//! Transactional persistence boundary.
//!
//! The movement core talks to storage only through [`PersistenceStore`].
//! [`PostgresStore`] is the production backend; [`InMemoryStore`] is a
//! complete implementation (transactions, row locks, unique document
//! numbers) used by tests and embedded deployments.

pub mod in_memory;
mod locks;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use r#trait::{LockMode, PersistenceStore, StoreResult, StoreTransaction};
