//! Producer side of the checkout record channel.

use std::sync::Arc;

use async_trait::async_trait;
use common::CheckoutRecord;
use tokio::sync::mpsc;

use crate::error::{CheckoutError, Result};

/// Hands checkout records to order creation.
///
/// Delivery is at-least-once; consumers must tolerate duplicates.
#[async_trait]
pub trait CheckoutPublisher: Send + Sync {
    async fn publish(&self, record: CheckoutRecord) -> Result<()>;
}

#[async_trait]
impl<T: CheckoutPublisher + ?Sized> CheckoutPublisher for Arc<T> {
    async fn publish(&self, record: CheckoutRecord) -> Result<()> {
        (**self).publish(record).await
    }
}

/// Publishes onto a bounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: mpsc::Sender<CheckoutRecord>,
}

impl ChannelPublisher {
    pub fn new(sender: mpsc::Sender<CheckoutRecord>) -> Self {
        Self { sender }
    }

    /// Creates a publisher together with the receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<CheckoutRecord>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl CheckoutPublisher for ChannelPublisher {
    #[tracing::instrument(skip(self, record), fields(checkout_id = %record.checkout_id, key = %record.routing_key()))]
    async fn publish(&self, record: CheckoutRecord) -> Result<()> {
        self.sender
            .send(record)
            .await
            .map_err(|_| CheckoutError::PublishFailed("record channel is closed".to_string()))?;
        metrics::counter!("checkout_records_published_total").increment(1);
        tracing::debug!("checkout record published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{CheckoutId, Money, OrderId, PaymentMethod, UserId};

    fn record() -> CheckoutRecord {
        CheckoutRecord {
            checkout_id: CheckoutId::new(),
            order_id: OrderId::new(),
            user_id: UserId::new(),
            payment_method: PaymentMethod::Cash,
            total_price: Money::from_units(1),
            items: Default::default(),
            placed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn records_arrive_on_the_receiver() {
        let (publisher, mut receiver) = ChannelPublisher::channel(4);
        let sent = record();
        publisher.publish(sent.clone()).await.unwrap();
        assert_eq!(receiver.recv().await, Some(sent));
    }

    #[tokio::test]
    async fn closed_channel_fails_to_publish() {
        let (publisher, receiver) = ChannelPublisher::channel(1);
        drop(receiver);
        let err = publisher.publish(record()).await.unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::ServiceUnavailable);
    }
}
