//! Domain events and their distribution.
//!
//! Events describe committed state changes (e.g. a transfer shipped). They
//! are wrapped in tenant-aware envelopes and fanned out over an [`EventBus`]
//! to audit-log writers and other consumers outside the transaction.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::{EventEnvelope, EventSource};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
