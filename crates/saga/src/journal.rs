//! Writing the saga journal.

use common::CheckoutId;
use domain::{Aggregate, DomainEvent};
use event_store::{EventEnvelope, EventStore, ExpectedVersion};

use crate::aggregate::CheckoutSaga;
use crate::error::Result;
use crate::events::CheckoutEvent;

/// Appends one event right after the saga's current version and applies it.
pub(crate) async fn append_saga_event<S: EventStore>(
    store: &S,
    saga: &mut CheckoutSaga,
    checkout_id: CheckoutId,
    event: CheckoutEvent,
) -> Result<()> {
    let current = saga.version();
    let envelope = EventEnvelope::builder()
        .event_type(event.event_type())
        .aggregate_id(checkout_id)
        .aggregate_type(CheckoutSaga::aggregate_type())
        .version(current.next())
        .correlation_id(Some(checkout_id))
        .payload(&event)?
        .build()?;

    let new_version = store
        .append(vec![envelope], ExpectedVersion::after(current))
        .await?;
    saga.apply(event);
    saga.set_version(new_version);
    Ok(())
}
