use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Position, Result, Version,
    store::{EventStore, ExpectedVersion, validate_batch},
};

#[derive(Debug, Default)]
struct Journal {
    log: Vec<EventEnvelope>,
    /// Indexes into `log` per aggregate, in version order.
    streams: HashMap<AggregateId, Vec<usize>>,
}

impl Journal {
    fn version_of(&self, aggregate_id: AggregateId) -> Version {
        self.streams
            .get(&aggregate_id)
            .and_then(|idx| idx.last())
            .map(|&i| self.log[i].version)
            .unwrap_or_default()
    }
}

/// Journal held in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventStore {
    journal: Arc<RwLock<Journal>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn event_count(&self) -> usize {
        self.journal.read().await.log.len()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        mut events: Vec<EventEnvelope>,
        expected: ExpectedVersion,
    ) -> Result<Version> {
        validate_batch(&events)?;
        let aggregate_id = events[0].aggregate_id;

        let mut journal = self.journal.write().await;
        let current = journal.version_of(aggregate_id);
        expected.check(aggregate_id, current)?;

        if events[0].version != current.next() {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: events[0].version,
                actual: current,
            });
        }

        let mut last = current;
        for event in events.iter_mut() {
            let index = journal.log.len();
            event.position = Position::new(index as u64 + 1);
            last = event.version;
            journal.streams.entry(aggregate_id).or_default().push(index);
            journal.log.push(event.clone());
        }

        metrics::counter!("event_store_appended_total").increment(events.len() as u64);
        tracing::debug!(%aggregate_id, version = %last, count = events.len(), "events appended");

        Ok(last)
    }

    async fn load(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        let journal = self.journal.read().await;
        Ok(journal
            .streams
            .get(&aggregate_id)
            .map(|idx| idx.iter().map(|&i| journal.log[i].clone()).collect())
            .unwrap_or_default())
    }

    async fn events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>> {
        let journal = self.journal.read().await;
        Ok(journal
            .log
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect())
    }

    async fn events_by_correlation(
        &self,
        correlation_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let journal = self.journal.read().await;
        Ok(journal
            .log
            .iter()
            .filter(|e| e.correlation_id == Some(correlation_id))
            .cloned()
            .collect())
    }

    async fn read_from(&self, after: Position, limit: usize) -> Result<Vec<EventEnvelope>> {
        let journal = self.journal.read().await;
        let start = (after.as_u64() as usize).min(journal.log.len());
        Ok(journal.log[start..].iter().take(limit).cloned().collect())
    }

    async fn aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let journal = self.journal.read().await;
        Ok(journal
            .streams
            .contains_key(&aggregate_id)
            .then(|| journal.version_of(aggregate_id)))
    }
}
