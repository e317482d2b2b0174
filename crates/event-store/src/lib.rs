//! Append-only event journal.
//!
//! Orders and checkout sagas are event-sourced: every state change is an
//! [`EventEnvelope`] appended under optimistic concurrency. Envelopes may carry
//! a correlation id so that everything one checkout caused can be found again
//! during reconciliation.

pub mod error;
pub mod event;
pub mod memory;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, Position, Version};
pub use memory::InMemoryEventStore;
pub use store::{EventStore, EventStoreExt, ExpectedVersion, validate_batch};
