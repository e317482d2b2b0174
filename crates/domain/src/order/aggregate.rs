//! Order aggregate implementation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{
    AggregateId, CheckoutId, CheckoutRecord, ItemDetail, ItemId, Money, OrderId, PaymentMethod,
    UserId,
};
use event_store::Version;
use serde::Serialize;

use crate::aggregate::Aggregate;

use super::{OrderError, OrderEvent, OrderStatus, events::OrderPlacedData};

/// Order aggregate root.
///
/// Created once per checkout record and never deleted; afterwards it only
/// changes through status transitions and the compensation journal that a
/// cancellation opens.
#[derive(Debug, Clone, Default)]
pub struct Order {
    id: Option<OrderId>,
    version: Version,
    checkout_id: Option<CheckoutId>,
    user_id: Option<UserId>,
    payment_method: Option<PaymentMethod>,
    status: OrderStatus,
    items: BTreeMap<ItemId, ItemDetail>,
    total_price: Money,
    ordered_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    /// Lines already returned to stock after cancellation.
    restored: BTreeMap<ItemId, u32>,
    /// Last restore failure per line, cleared when the line is restored.
    restore_failures: BTreeMap<ItemId, String>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn correlation_id(&self) -> Option<AggregateId> {
        self.checkout_id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderPlaced(data) => self.apply_order_placed(data),
            OrderEvent::StatusChanged(data) => {
                self.status = data.to;
                self.updated_at = Some(data.changed_at);
            }
            OrderEvent::OrderCancelled(data) => {
                self.status = OrderStatus::Cancelled;
                self.updated_at = Some(data.cancelled_at);
            }
            OrderEvent::StockRestored(data) => {
                *self.restored.entry(data.item_id.clone()).or_default() += data.quantity;
                self.restore_failures.remove(&data.item_id);
            }
            OrderEvent::StockRestoreFailed(data) => {
                self.restore_failures.insert(data.item_id, data.reason);
            }
        }
    }
}

impl Order {
    fn apply_order_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.checkout_id = Some(data.checkout_id);
        self.user_id = Some(data.user_id);
        self.payment_method = Some(data.payment_method);
        self.status = OrderStatus::Pending;
        self.items = data.items;
        self.total_price = data.total_price;
        self.ordered_at = Some(data.ordered_at);
        self.updated_at = Some(data.ordered_at);
    }
}

// Query methods
impl Order {
    pub fn checkout_id(&self) -> Option<CheckoutId> {
        self.checkout_id
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn items(&self) -> &BTreeMap<ItemId, ItemDetail> {
        &self.items
    }

    pub fn total_price(&self) -> Money {
        self.total_price
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    pub fn ordered_at(&self) -> Option<DateTime<Utc>> {
        self.ordered_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Lines of a cancelled order that have not been returned to stock yet.
    ///
    /// Empty for orders that are not cancelled.
    pub fn outstanding_restores(&self) -> Vec<(ItemId, u32)> {
        if self.status != OrderStatus::Cancelled {
            return Vec::new();
        }
        self.items
            .iter()
            .filter_map(|(item_id, detail)| {
                let restored = self.restored.get(item_id).copied().unwrap_or(0);
                let owed = detail.quantity.saturating_sub(restored);
                (owed > 0).then(|| (item_id.clone(), owed))
            })
            .collect()
    }

    pub fn is_fully_restored(&self) -> bool {
        self.outstanding_restores().is_empty()
    }

    /// Read model handed to API callers.
    pub fn summary(&self) -> OrderSummary {
        OrderSummary {
            id: self.id,
            checkout_id: self.checkout_id,
            user_id: self.user_id,
            status: self.status,
            payment_method: self.payment_method,
            total_price: self.total_price,
            items: self.items.clone(),
            ordered_at: self.ordered_at,
            updated_at: self.updated_at,
            outstanding_restores: self.outstanding_restores().into_iter().collect(),
            restore_failures: self.restore_failures.clone(),
        }
    }
}

// Command methods (return events)
impl Order {
    /// Materializes the order from a checkout record.
    pub fn place(&self, record: &CheckoutRecord) -> Result<Vec<OrderEvent>, OrderError> {
        if let Some(id) = self.id {
            return Err(OrderError::AlreadyPlaced(id));
        }
        Ok(vec![OrderEvent::order_placed(record)])
    }

    /// Moves the order to `next` according to the transition table.
    pub fn change_status(
        &self,
        next: OrderStatus,
        requested_by: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::TerminalOrder {
                status: self.status,
            });
        }
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        if next == OrderStatus::Cancelled {
            Ok(vec![OrderEvent::order_cancelled(self.status, requested_by, at)])
        } else {
            Ok(vec![OrderEvent::status_changed(self.status, next, at)])
        }
    }

    /// Cancels the order, with dedicated errors for the two terminal states.
    pub fn cancel(
        &self,
        requested_by: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        match self.status {
            OrderStatus::Delivered => Err(OrderError::AlreadyDelivered),
            OrderStatus::Cancelled => Err(OrderError::AlreadyCancelled),
            _ => self.change_status(OrderStatus::Cancelled, requested_by, at),
        }
    }

    /// Journals the outcome of restoring one line.
    pub fn record_restore(
        &self,
        item_id: ItemId,
        quantity: u32,
        failure: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.status != OrderStatus::Cancelled {
            return Err(OrderError::NotCancelled {
                status: self.status,
            });
        }
        Ok(vec![match failure {
            None => OrderEvent::stock_restored(item_id, quantity, at),
            Some(reason) => OrderEvent::stock_restore_failed(item_id, quantity, reason, at),
        }])
    }
}

/// Serializable view of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub id: Option<OrderId>,
    pub checkout_id: Option<CheckoutId>,
    pub user_id: Option<UserId>,
    pub status: OrderStatus,
    pub payment_method: Option<PaymentMethod>,
    pub total_price: Money,
    pub items: BTreeMap<ItemId, ItemDetail>,
    pub ordered_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outstanding_restores: BTreeMap<ItemId, u32>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub restore_failures: BTreeMap<ItemId, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CheckoutRecord {
        let mut items = BTreeMap::new();
        items.insert(
            ItemId::from("X"),
            ItemDetail::new(Some("Widget".into()), None, Money::from_units(10), 2),
        );
        items.insert(
            ItemId::from("Y"),
            ItemDetail::new(Some("Gadget".into()), None, Money::from_units(5), 1),
        );
        CheckoutRecord {
            checkout_id: CheckoutId::new(),
            order_id: OrderId::new(),
            user_id: UserId::new(),
            payment_method: PaymentMethod::CreditCard,
            total_price: Money::from_units(25),
            items,
            placed_at: Utc::now(),
        }
    }

    fn placed() -> Order {
        let mut order = Order::default();
        let events = order.place(&record()).unwrap();
        order.apply_events(events);
        order
    }

    fn advance(order: &mut Order, to: OrderStatus) {
        let events = order.change_status(to, None, Utc::now()).unwrap();
        order.apply_events(events);
    }

    #[test]
    fn test_place_copies_record_verbatim() {
        let record = record();
        let mut order = Order::default();
        order.apply_events(order.place(&record).unwrap());

        assert_eq!(order.id(), Some(record.order_id));
        assert_eq!(order.correlation_id(), Some(record.checkout_id));
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.total_price(), Money::from_units(25));
        assert_eq!(order.items(), &record.items);
        assert_eq!(order.ordered_at(), Some(record.placed_at));
    }

    #[test]
    fn test_place_twice_is_rejected() {
        let order = placed();
        assert!(matches!(order.place(&record()), Err(OrderError::AlreadyPlaced(_))));
    }

    #[test]
    fn test_full_happy_path() {
        let mut order = placed();
        advance(&mut order, OrderStatus::Processing);
        advance(&mut order, OrderStatus::Shipping);
        advance(&mut order, OrderStatus::Delivered);
        assert!(order.is_terminal());
    }

    #[test]
    fn test_skipping_is_invalid_and_leaves_status() {
        let order = placed();
        let err = order
            .change_status(OrderStatus::Delivered, None, Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::Delivered
            }
        ));
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn test_terminal_orders_reject_everything() {
        let mut order = placed();
        advance(&mut order, OrderStatus::Processing);
        advance(&mut order, OrderStatus::Shipping);
        advance(&mut order, OrderStatus::Delivered);

        assert!(matches!(
            order.change_status(OrderStatus::Cancelled, None, Utc::now()),
            Err(OrderError::TerminalOrder { .. })
        ));
        assert!(matches!(
            order.cancel(None, Utc::now()),
            Err(OrderError::AlreadyDelivered)
        ));
    }

    #[test]
    fn test_cancel_opens_compensation() {
        let mut order = placed();
        assert!(order.outstanding_restores().is_empty());

        order.apply_events(order.cancel(None, Utc::now()).unwrap());
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(
            order.outstanding_restores(),
            vec![(ItemId::from("X"), 2), (ItemId::from("Y"), 1)]
        );
        assert!(matches!(
            order.cancel(None, Utc::now()),
            Err(OrderError::AlreadyCancelled)
        ));
    }

    #[test]
    fn test_restore_journal_tracks_outstanding_lines() {
        let mut order = placed();
        order.apply_events(order.cancel(None, Utc::now()).unwrap());

        let events = order
            .record_restore("X".into(), 2, None, Utc::now())
            .unwrap();
        order.apply_events(events);
        let events = order
            .record_restore("Y".into(), 1, Some("timeout".into()), Utc::now())
            .unwrap();
        order.apply_events(events);

        assert_eq!(order.outstanding_restores(), vec![(ItemId::from("Y"), 1)]);
        assert_eq!(order.summary().restore_failures.len(), 1);

        let events = order
            .record_restore("Y".into(), 1, None, Utc::now())
            .unwrap();
        order.apply_events(events);
        assert!(order.is_fully_restored());
        assert!(order.summary().restore_failures.is_empty());
    }

    #[test]
    fn test_restore_journal_requires_cancellation() {
        let order = placed();
        assert!(matches!(
            order.record_restore("X".into(), 1, None, Utc::now()),
            Err(OrderError::NotCancelled { .. })
        ));
    }
}
