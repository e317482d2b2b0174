//! Consumer side of the checkout record channel.

use std::sync::Arc;

use common::CheckoutRecord;
use event_store::EventStore;
use inventory::InventoryService;
use tokio::sync::mpsc;

use crate::order::OrderService;

/// Counts kept by a listener run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub received: u64,
    pub failed: u64,
}

/// Turns checkout records into orders.
///
/// Delivery is at-least-once; redelivered records resolve to the existing
/// order, so the listener never needs to deduplicate on its own.
pub struct RecordListener<S: EventStore, I: InventoryService> {
    orders: Arc<OrderService<S, I>>,
}

impl<S: EventStore, I: InventoryService> RecordListener<S, I> {
    pub fn new(orders: Arc<OrderService<S, I>>) -> Self {
        Self { orders }
    }

    /// Handles one record. Failures are logged and counted, never fatal.
    #[tracing::instrument(skip(self, record), fields(checkout_id = %record.checkout_id, key = %record.routing_key()))]
    pub async fn handle(&self, record: &CheckoutRecord) -> bool {
        metrics::counter!("checkout_records_received_total").increment(1);
        match self.orders.create_from_checkout_record(record).await {
            Ok(_) => true,
            Err(e) => {
                metrics::counter!("checkout_records_failed_total").increment(1);
                tracing::error!(order_id = %record.order_id, error = %e, "failed to create order from checkout record");
                false
            }
        }
    }

    /// Drains the channel until every sender is dropped.
    pub async fn run(self, mut records: mpsc::Receiver<CheckoutRecord>) -> ListenerStats {
        let mut stats = ListenerStats::default();

        while let Some(record) = records.recv().await {
            stats.received += 1;
            if !self.handle(&record).await {
                stats.failed += 1;
            }
        }

        tracing::info!(received = stats.received, failed = stats.failed, "checkout record channel closed");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::Utc;
    use common::{CheckoutId, ItemDetail, ItemId, Money, OrderId, PaymentMethod, UserId};
    use event_store::InMemoryEventStore;
    use inventory::InventoryLedger;

    fn record() -> CheckoutRecord {
        let mut items = BTreeMap::new();
        items.insert(
            ItemId::from("X"),
            ItemDetail::new(None, None, Money::from_units(2), 1),
        );
        CheckoutRecord {
            checkout_id: CheckoutId::new(),
            order_id: OrderId::new(),
            user_id: UserId::new(),
            payment_method: PaymentMethod::Cash,
            total_price: Money::from_units(2),
            items,
            placed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn drains_channel_and_tolerates_redelivery() {
        let orders = Arc::new(OrderService::new(
            InMemoryEventStore::new(),
            InventoryLedger::new(),
        ));
        let (tx, rx) = mpsc::channel(8);

        let first = record();
        let second = record();
        tx.send(first.clone()).await.unwrap();
        tx.send(first.clone()).await.unwrap();
        tx.send(second.clone()).await.unwrap();
        drop(tx);

        let stats = RecordListener::new(orders.clone()).run(rx).await;

        assert_eq!(stats, ListenerStats { received: 3, failed: 0 });
        assert_eq!(orders.list_orders().await.unwrap().len(), 2);
        assert!(orders.get_order(first.order_id).await.is_ok());
    }
}
