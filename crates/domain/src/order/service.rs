//! Order service: creation from checkout records, status transitions,
//! cancellation with stock compensation, and queries.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{
    CheckoutRecord, Clock, ItemId, OrderId, Requester, RetryPolicy, SystemClock, UserId,
    retry_with_backoff,
};
use event_store::{EventStore, EventStoreError, EventStoreExt};
use inventory::{InventoryError, InventoryService};
use serde::Serialize;

use crate::aggregate::Aggregate;
use crate::command::CommandHandler;
use crate::error::DomainError;

use super::{Order, OrderError, OrderStatus};

/// How compensating restores are bounded and retried.
#[derive(Debug, Clone)]
pub struct CompensationConfig {
    /// Upper bound for a single restore call.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for CompensationConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRestore {
    pub item_id: ItemId,
    pub quantity: u32,
    pub reason: String,
}

/// Outcome of returning a cancelled order's lines to stock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompensationReport {
    pub restored: Vec<(ItemId, u32)>,
    pub failed: Vec<FailedRestore>,
}

impl CompensationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// An order after a status change, plus the compensation outcome when the
/// change was a cancellation.
#[derive(Debug, Clone)]
pub struct OrderUpdate {
    pub order: Order,
    pub compensation: Option<CompensationReport>,
}

impl OrderUpdate {
    /// Fails with `CompensationIncomplete` if any line could not be restored.
    /// The status change itself stays committed either way.
    pub fn into_result(self) -> Result<Order, DomainError> {
        match self.compensation {
            Some(report) if !report.is_complete() => Err(DomainError::CompensationIncomplete {
                order_id: self.order.id().unwrap_or_default(),
                failed: report.failed.into_iter().map(|f| f.item_id).collect(),
            }),
            _ => Ok(self.order),
        }
    }
}

/// Removes an order from the in-flight compensation set when dropped.
struct CompensationGuard<'a> {
    in_flight: &'a Mutex<HashSet<OrderId>>,
    order_id: OrderId,
}

impl Drop for CompensationGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.order_id);
    }
}

/// Manages the order lifecycle.
///
/// Orders are event-sourced through a [`CommandHandler`]; cancellations call
/// back into the inventory ledger to restore every line and journal each
/// restore so that failed lines can be retried later.
pub struct OrderService<S: EventStore, I: InventoryService> {
    handler: CommandHandler<S, Order>,
    inventory: I,
    clock: Arc<dyn Clock>,
    compensation: CompensationConfig,
    in_flight: Mutex<HashSet<OrderId>>,
}

impl<S: EventStore, I: InventoryService> OrderService<S, I> {
    pub fn new(store: S, inventory: I) -> Self {
        Self {
            handler: CommandHandler::new(store),
            inventory,
            clock: Arc::new(SystemClock),
            compensation: CompensationConfig::default(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_compensation(mut self, compensation: CompensationConfig) -> Self {
        self.compensation = compensation;
        self
    }

    pub fn handler(&self) -> &CommandHandler<S, Order> {
        &self.handler
    }

    /// Materializes an order from a checkout record.
    ///
    /// The order is created under the record's order id, so a redelivered
    /// record returns the existing order instead of creating a second one.
    #[tracing::instrument(skip(self, record), fields(order_id = %record.order_id, checkout_id = %record.checkout_id))]
    pub async fn create_from_checkout_record(
        &self,
        record: &CheckoutRecord,
    ) -> Result<Order, DomainError> {
        let result = self
            .handler
            .execute(record.order_id, |order| order.place(record))
            .await;

        match result {
            Ok(result) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(
                    user_id = %record.user_id,
                    total = %record.total_price,
                    lines = record.items.len(),
                    "order placed"
                );
                Ok(result.aggregate)
            }
            Err(DomainError::Order(OrderError::AlreadyPlaced(_)))
            | Err(DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. })) => {
                metrics::counter!("orders_duplicate_records_total").increment(1);
                tracing::warn!("duplicate checkout record ignored");
                self.get_order(record.order_id).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, DomainError> {
        self.handler
            .load_existing(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))
    }

    /// Loads an order the requester owns, or any order for an admin.
    pub async fn get_order_for(
        &self,
        requester: &Requester,
        order_id: OrderId,
    ) -> Result<Order, DomainError> {
        let order = self.get_order(order_id).await?;
        let owner = order.user_id().ok_or(DomainError::OrderNotFound(order_id))?;
        if !requester.may_access(owner) {
            tracing::warn!(%order_id, requester = %requester.user_id, "order access denied");
            return Err(DomainError::Forbidden(format!(
                "order {order_id} belongs to another user"
            )));
        }
        Ok(order)
    }

    /// Applies a status transition. Moving to CANCELLED restores every line.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
        requested_by: Option<UserId>,
    ) -> Result<OrderUpdate, DomainError> {
        self.ensure_exists(order_id).await?;
        let now = self.clock.now();
        let result = self
            .handler
            .execute(order_id, |order| {
                order.change_status(new_status, requested_by, now)
            })
            .await?;

        metrics::counter!("order_status_transitions_total", "to" => new_status.as_str())
            .increment(1);
        tracing::info!(status = %new_status, "order status changed");

        if new_status == OrderStatus::Cancelled {
            self.compensate(result.aggregate).await
        } else {
            Ok(OrderUpdate {
                order: result.aggregate,
                compensation: None,
            })
        }
    }

    /// Status updates are reserved for admins.
    pub async fn update_status_for(
        &self,
        requester: &Requester,
        order_id: OrderId,
        new_status: OrderStatus,
    ) -> Result<OrderUpdate, DomainError> {
        if !requester.is_admin() {
            return Err(DomainError::Forbidden(
                "only admins may change order status".to_string(),
            ));
        }
        self.update_status(order_id, new_status, Some(requester.user_id))
            .await
    }

    /// Cancels an order and restores its lines.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(
        &self,
        order_id: OrderId,
        requested_by: Option<UserId>,
    ) -> Result<OrderUpdate, DomainError> {
        self.ensure_exists(order_id).await?;
        let now = self.clock.now();
        let result = self
            .handler
            .execute(order_id, |order| order.cancel(requested_by, now))
            .await?;

        metrics::counter!("order_status_transitions_total", "to" => OrderStatus::Cancelled.as_str())
            .increment(1);
        tracing::info!("order cancelled");

        self.compensate(result.aggregate).await
    }

    /// Cancels an order on behalf of its owner or an admin.
    pub async fn cancel_for(
        &self,
        requester: &Requester,
        order_id: OrderId,
    ) -> Result<OrderUpdate, DomainError> {
        self.get_order_for(requester, order_id).await?;
        self.cancel(order_id, Some(requester.user_id)).await
    }

    /// Restores the lines of a cancelled order that earlier attempts missed.
    #[tracing::instrument(skip(self))]
    pub async fn retry_compensation(&self, order_id: OrderId) -> Result<OrderUpdate, DomainError> {
        let order = self.get_order(order_id).await?;
        if order.status() != OrderStatus::Cancelled {
            return Err(OrderError::NotCancelled {
                status: order.status(),
            }
            .into());
        }
        self.compensate(order).await
    }

    async fn ensure_exists(&self, order_id: OrderId) -> Result<(), DomainError> {
        if !self.handler.store().exists(order_id).await? {
            return Err(DomainError::OrderNotFound(order_id));
        }
        Ok(())
    }

    /// Restores every outstanding line of a cancelled order, journaling each
    /// outcome. Failures never undo the cancellation.
    async fn compensate(&self, order: Order) -> Result<OrderUpdate, DomainError> {
        let order_id = order.id().ok_or_else(|| {
            DomainError::Order(OrderError::NotCancelled {
                status: order.status(),
            })
        })?;
        let _guard = self.begin_compensation(order_id)?;

        let mut report = CompensationReport::default();
        let mut order = order;
        for (item_id, quantity) in order.outstanding_restores() {
            let failure = match self.restore_line(&item_id, quantity).await {
                Ok(()) => {
                    report.restored.push((item_id.clone(), quantity));
                    None
                }
                Err(e) => {
                    metrics::counter!("order_compensation_failures_total").increment(1);
                    tracing::error!(%order_id, %item_id, quantity, error = %e, "stock restore failed");
                    report.failed.push(FailedRestore {
                        item_id: item_id.clone(),
                        quantity,
                        reason: e.to_string(),
                    });
                    Some(e.to_string())
                }
            };

            let now = self.clock.now();
            order = self
                .handler
                .execute(order_id, |o| o.record_restore(item_id, quantity, failure, now))
                .await?
                .aggregate;
        }

        if report.is_complete() {
            tracing::info!(%order_id, lines = report.restored.len(), "stock restored");
        }
        Ok(OrderUpdate {
            order,
            compensation: Some(report),
        })
    }

    fn begin_compensation(&self, order_id: OrderId) -> Result<CompensationGuard<'_>, DomainError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !in_flight.insert(order_id) {
            return Err(DomainError::CompensationInProgress(order_id));
        }
        Ok(CompensationGuard {
            in_flight: &self.in_flight,
            order_id,
        })
    }

    /// One restore, bounded by the timeout and retried while the ledger is unreachable.
    async fn restore_line(&self, item_id: &ItemId, quantity: u32) -> Result<(), InventoryError> {
        let timeout = self.compensation.timeout;
        let inventory = &self.inventory;
        retry_with_backoff(&self.compensation.retry, InventoryError::is_transient, || async move {
            match tokio::time::timeout(timeout, inventory.restore(item_id, i64::from(quantity)))
                .await
            {
                Ok(result) => result.map(|_| ()),
                Err(_) => Err(InventoryError::Unavailable(format!(
                    "restore timed out after {timeout:?}"
                ))),
            }
        })
        .await
    }
}

/// Order list filter; `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
}

// Queries
impl<S: EventStore, I: InventoryService> OrderService<S, I> {
    /// Orders matching `filter`, newest first.
    pub async fn find_orders(&self, filter: OrderFilter) -> Result<Vec<Order>, DomainError> {
        let ids = self.handler.store().aggregate_ids_with("OrderPlaced").await?;

        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            let order = self.handler.load(id).await?;
            let user_matches = filter.user_id.is_none_or(|u| order.user_id() == Some(u));
            let status_matches = filter.status.is_none_or(|s| order.status() == s);
            if user_matches && status_matches {
                orders.push(order);
            }
        }

        orders.sort_by(|a, b| b.ordered_at().cmp(&a.ordered_at()));
        Ok(orders)
    }

    pub async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, DomainError> {
        self.find_orders(OrderFilter {
            user_id: Some(user_id),
            status: None,
        })
        .await
    }

    pub async fn orders_with_status(&self, status: OrderStatus) -> Result<Vec<Order>, DomainError> {
        self.find_orders(OrderFilter {
            user_id: None,
            status: Some(status),
        })
        .await
    }

    pub async fn orders_for_user_with_status(
        &self,
        user_id: UserId,
        status: OrderStatus,
    ) -> Result<Vec<Order>, DomainError> {
        self.find_orders(OrderFilter {
            user_id: Some(user_id),
            status: Some(status),
        })
        .await
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>, DomainError> {
        self.find_orders(OrderFilter::default()).await
    }

    /// Every order; admins only.
    pub async fn list_orders_for(&self, requester: &Requester) -> Result<Vec<Order>, DomainError> {
        if !requester.is_admin() {
            return Err(DomainError::Forbidden(
                "only admins may list all orders".to_string(),
            ));
        }
        self.list_orders().await
    }
}
