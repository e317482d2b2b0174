//! Order domain events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{CheckoutId, CheckoutRecord, ItemDetail, ItemId, Money, OrderId, PaymentMethod, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::OrderStatus;

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was materialized from a checkout record.
    OrderPlaced(OrderPlacedData),

    /// Order moved forward along the fulfillment path.
    StatusChanged(StatusChangedData),

    /// Order was cancelled; its lines are now owed back to inventory.
    OrderCancelled(OrderCancelledData),

    /// One line of a cancelled order was returned to stock.
    StockRestored(StockRestoredData),

    /// Returning one line to stock failed; it stays outstanding.
    StockRestoreFailed(StockRestoreFailedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::StatusChanged(_) => "StatusChanged",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
            OrderEvent::StockRestored(_) => "StockRestored",
            OrderEvent::StockRestoreFailed(_) => "StockRestoreFailed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: OrderId,
    pub checkout_id: CheckoutId,
    pub user_id: UserId,
    pub payment_method: PaymentMethod,
    pub total_price: Money,
    pub items: BTreeMap<ItemId, ItemDetail>,
    pub ordered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledData {
    /// Status the order was in when cancelled.
    pub from: OrderStatus,
    pub cancelled_at: DateTime<Utc>,
    /// Requester who cancelled, when known.
    pub cancelled_by: Option<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRestoredData {
    pub item_id: ItemId,
    pub quantity: u32,
    pub restored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRestoreFailedData {
    pub item_id: ItemId,
    pub quantity: u32,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

impl OrderEvent {
    /// Copies the record verbatim; `ordered_at` is the checkout's placement time.
    pub fn order_placed(record: &CheckoutRecord) -> Self {
        OrderEvent::OrderPlaced(OrderPlacedData {
            order_id: record.order_id,
            checkout_id: record.checkout_id,
            user_id: record.user_id,
            payment_method: record.payment_method,
            total_price: record.total_price,
            items: record.items.clone(),
            ordered_at: record.placed_at,
        })
    }

    pub fn status_changed(from: OrderStatus, to: OrderStatus, changed_at: DateTime<Utc>) -> Self {
        OrderEvent::StatusChanged(StatusChangedData {
            from,
            to,
            changed_at,
        })
    }

    pub fn order_cancelled(
        from: OrderStatus,
        cancelled_by: Option<UserId>,
        cancelled_at: DateTime<Utc>,
    ) -> Self {
        OrderEvent::OrderCancelled(OrderCancelledData {
            from,
            cancelled_at,
            cancelled_by,
        })
    }

    pub fn stock_restored(item_id: ItemId, quantity: u32, restored_at: DateTime<Utc>) -> Self {
        OrderEvent::StockRestored(StockRestoredData {
            item_id,
            quantity,
            restored_at,
        })
    }

    pub fn stock_restore_failed(
        item_id: ItemId,
        quantity: u32,
        reason: impl Into<String>,
        failed_at: DateTime<Utc>,
    ) -> Self {
        OrderEvent::StockRestoreFailed(StockRestoreFailedData {
            item_id,
            quantity,
            reason: reason.into(),
            failed_at,
        })
    }
}
