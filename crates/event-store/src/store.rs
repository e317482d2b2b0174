use async_trait::async_trait;

use crate::{AggregateId, EventEnvelope, EventStoreError, Position, Result, Version};

/// Concurrency expectation for an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip the check.
    Any,
    /// The aggregate must not exist yet.
    NoStream,
    /// The aggregate must be at exactly this version.
    Exact(Version),
}

impl ExpectedVersion {
    /// `NoStream` for a fresh aggregate, `Exact` otherwise.
    pub fn after(current: Version) -> Self {
        if current == Version::initial() {
            ExpectedVersion::NoStream
        } else {
            ExpectedVersion::Exact(current)
        }
    }

    pub(crate) fn check(
        &self,
        aggregate_id: AggregateId,
        actual: Version,
    ) -> std::result::Result<(), EventStoreError> {
        let expected = match *self {
            ExpectedVersion::Any => return Ok(()),
            ExpectedVersion::NoStream => Version::initial(),
            ExpectedVersion::Exact(v) => v,
        };
        if expected == actual {
            Ok(())
        } else {
            Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            })
        }
    }
}

/// Storage for event envelopes. Implementations must be thread-safe.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a batch for a single aggregate atomically.
    ///
    /// Returns the aggregate version after the append.
    async fn append(&self, events: Vec<EventEnvelope>, expected: ExpectedVersion)
    -> Result<Version>;

    /// All events of one aggregate, oldest first.
    async fn load(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>>;

    /// All events with the given type, in journal order.
    async fn events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>>;

    /// All events recorded under one correlation id, in journal order.
    async fn events_by_correlation(&self, correlation_id: AggregateId)
    -> Result<Vec<EventEnvelope>>;

    /// Up to `limit` events strictly after `after`, in journal order.
    async fn read_from(&self, after: Position, limit: usize) -> Result<Vec<EventEnvelope>>;

    /// Current version, or `None` if the aggregate has no events.
    async fn aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;
}

/// Convenience methods available on every store.
#[async_trait]
pub trait EventStoreExt: EventStore {
    async fn append_one(&self, event: EventEnvelope, expected: ExpectedVersion) -> Result<Version> {
        self.append(vec![event], expected).await
    }

    async fn exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.aggregate_version(aggregate_id).await?.is_some())
    }

    /// Distinct aggregate ids that recorded an event of `event_type`, in first-seen order.
    async fn aggregate_ids_with(&self, event_type: &str) -> Result<Vec<AggregateId>> {
        let mut seen = std::collections::HashSet::new();
        Ok(self
            .events_by_type(event_type)
            .await?
            .into_iter()
            .filter_map(|e| seen.insert(e.aggregate_id).then_some(e.aggregate_id))
            .collect())
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks that a batch is non-empty, targets one aggregate and has consecutive versions.
pub fn validate_batch(events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidBatch(
            "cannot append an empty batch".to_string(),
        ));
    };

    let mut expected = first.version;
    for event in &events[1..] {
        if event.aggregate_id != first.aggregate_id || event.aggregate_type != first.aggregate_type
        {
            return Err(EventStoreError::InvalidBatch(
                "all events in a batch must belong to one aggregate".to_string(),
            ));
        }
        expected = expected.next();
        if event.version != expected {
            return Err(EventStoreError::InvalidBatch(format!(
                "versions must be consecutive: expected {expected}, got {}",
                event.version
            )));
        }
    }

    Ok(())
}
