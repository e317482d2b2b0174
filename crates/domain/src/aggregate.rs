//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// A fact recorded in the journal. Named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Journal event type, used for filtering by type.
    fn event_type(&self) -> &'static str;
}

/// An event-sourced entity.
///
/// Aggregates are rebuilt by replaying their events through [`apply`](Self::apply),
/// which must be pure: events are facts and applying one cannot fail.
pub trait Aggregate: Default + Send + Sync + Sized {
    type Event: DomainEvent;

    type Error: std::error::Error + Send + Sync;

    fn aggregate_type() -> &'static str;

    /// `None` until the first event has been applied.
    fn id(&self) -> Option<AggregateId>;

    /// The checkout this aggregate belongs to; stamped on every appended envelope.
    fn correlation_id(&self) -> Option<AggregateId> {
        None
    }

    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);

    fn apply(&mut self, event: Self::Event);

    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}
