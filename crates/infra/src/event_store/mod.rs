//! Append-only event store boundary.
//!
//! One trait, two backends: [`InMemoryEventStore`] for tests and single-process
//! development, [`PostgresEventStore`] when `DATABASE_URL` is configured.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
