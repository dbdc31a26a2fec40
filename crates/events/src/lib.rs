//! `tradeflow-events`: event plumbing shared by the domain crates and infra.
//!
//! Domain crates implement [`Event`] for their event enums; infra wraps them in
//! [`EventEnvelope`]s, persists them and fans them out over an [`EventBus`].

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use tenant::TenantScoped;
