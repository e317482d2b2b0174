//! Repair of checkouts that stopped halfway.
//!
//! A checkout that fails after deducting stock leaves that stock taken. The
//! journal knows which lines are outstanding; reconciliation gives them back,
//! either straight to the ledger or, when the checkout record already went
//! out, by cancelling the order created from it so that the order's own
//! compensation restores the lines.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use common::{CheckoutId, CheckoutRecord, Clock, ItemId, SystemClock, retry_with_backoff};
use domain::{CommandHandler, DomainError, OrderError, OrderService};
use event_store::{EventStore, EventStoreExt};
use inventory::{InventoryError, InventoryService};
use serde::Serialize;

use crate::aggregate::CheckoutSaga;
use crate::channel::CheckoutPublisher;
use crate::coordinator::CheckoutConfig;
use crate::error::{CheckoutError, Result};
use crate::events::CheckoutEvent;
use crate::journal::append_saga_event;

/// What one reconciliation did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub checkout_id: CheckoutId,
    /// Lines given straight back to the ledger.
    pub reversed: Vec<(ItemId, u32)>,
    /// True when the published order was cancelled instead.
    pub order_cancelled: bool,
    /// Lines the cancelled order still has to restore through its own retry.
    pub pending_order_restores: Vec<ItemId>,
}

struct ReconcileGuard<'a> {
    in_flight: &'a Mutex<HashSet<CheckoutId>>,
    checkout_id: CheckoutId,
}

impl Drop for ReconcileGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.checkout_id);
    }
}

/// Finds and repairs failed checkouts.
pub struct Reconciler<S, I, B>
where
    S: EventStore,
    I: InventoryService,
    B: CheckoutPublisher,
{
    journal: CommandHandler<S, CheckoutSaga>,
    inventory: I,
    orders: Arc<OrderService<S, I>>,
    publisher: B,
    clock: Arc<dyn Clock>,
    config: CheckoutConfig,
    in_flight: Mutex<HashSet<CheckoutId>>,
}

impl<S, I, B> Reconciler<S, I, B>
where
    S: EventStore,
    I: InventoryService,
    B: CheckoutPublisher,
{
    pub fn new(store: S, inventory: I, orders: Arc<OrderService<S, I>>, publisher: B) -> Self {
        Self {
            journal: CommandHandler::new(store),
            inventory,
            orders,
            publisher,
            clock: Arc::new(SystemClock),
            config: CheckoutConfig::default(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: CheckoutConfig) -> Self {
        self.config = config;
        self
    }

    /// Failed checkouts that still hold stock, newest first.
    pub async fn pending(&self) -> Result<Vec<CheckoutSaga>> {
        let store = self.journal.store();
        let mut pending = Vec::new();
        for checkout_id in store.aggregate_ids_with("CheckoutFailed").await? {
            if let Some(saga) = self.journal.load_existing(checkout_id).await? {
                if saga.needs_reconciliation() {
                    pending.push(saga);
                }
            }
        }
        pending.sort_by(|a, b| b.started_at().cmp(&a.started_at()));
        Ok(pending)
    }

    /// Gives back the stock a failed checkout still holds.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, checkout_id: CheckoutId) -> Result<ReconciliationReport> {
        let _guard = self.begin(checkout_id)?;
        let mut saga = self.load(checkout_id).await?;
        if !saga.needs_reconciliation() {
            return Err(CheckoutError::NotReconcilable {
                checkout_id,
                state: saga.state(),
            });
        }

        let report = match saga.record().cloned() {
            Some(record) => self.cancel_order(&mut saga, checkout_id, record).await?,
            None => self.reverse_deductions(&mut saga, checkout_id).await?,
        };

        metrics::counter!("checkout_reconciled_total").increment(1);
        tracing::info!(
            reversed = report.reversed.len(),
            order_cancelled = report.order_cancelled,
            "checkout reconciled"
        );
        Ok(report)
    }

    /// Publishes a journaled checkout record again.
    ///
    /// Order creation is idempotent on the record's order id, so this is safe
    /// whether or not the first delivery was consumed.
    #[tracing::instrument(skip(self))]
    pub async fn redeliver(&self, checkout_id: CheckoutId) -> Result<CheckoutRecord> {
        let saga = self.load(checkout_id).await?;
        let record = saga
            .record()
            .cloned()
            .ok_or(CheckoutError::NothingToRedeliver(checkout_id))?;

        match tokio::time::timeout(self.config.rpc_timeout, self.publisher.publish(record.clone()))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(CheckoutError::ServiceUnavailable {
                    service: "order channel",
                    timeout: self.config.rpc_timeout,
                });
            }
        }

        metrics::counter!("checkout_records_redelivered_total").increment(1);
        tracing::info!(order_id = %record.order_id, "checkout record redelivered");
        Ok(record)
    }

    async fn load(&self, checkout_id: CheckoutId) -> Result<CheckoutSaga> {
        self.journal
            .load_existing(checkout_id)
            .await?
            .ok_or(CheckoutError::CheckoutNotFound(checkout_id))
    }

    fn begin(&self, checkout_id: CheckoutId) -> Result<ReconcileGuard<'_>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !in_flight.insert(checkout_id) {
            return Err(CheckoutError::ReconciliationInProgress(checkout_id));
        }
        Ok(ReconcileGuard {
            in_flight: &self.in_flight,
            checkout_id,
        })
    }

    /// The record went out, so the order owns the deducted lines. The order
    /// is materialized first in case the listener has not caught up yet.
    async fn cancel_order(
        &self,
        saga: &mut CheckoutSaga,
        checkout_id: CheckoutId,
        record: CheckoutRecord,
    ) -> Result<ReconciliationReport> {
        self.orders.create_from_checkout_record(&record).await?;

        let pending_order_restores = match self.orders.cancel(record.order_id, None).await {
            Ok(update) => update
                .compensation
                .map(|report| report.failed.into_iter().map(|f| f.item_id).collect())
                .unwrap_or_default(),
            // Someone cancelled it already; that cancellation restored the stock.
            Err(DomainError::Order(OrderError::AlreadyCancelled)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if !pending_order_restores.is_empty() {
            tracing::warn!(
                order_id = %record.order_id,
                lines = pending_order_restores.len(),
                "order cancelled with stock still to restore"
            );
        }

        let event = CheckoutEvent::checkout_reconciled(true, self.clock.now());
        append_saga_event(self.journal.store(), saga, checkout_id, event).await?;

        Ok(ReconciliationReport {
            checkout_id,
            reversed: Vec::new(),
            order_cancelled: true,
            pending_order_restores,
        })
    }

    async fn reverse_deductions(
        &self,
        saga: &mut CheckoutSaga,
        checkout_id: CheckoutId,
    ) -> Result<ReconciliationReport> {
        let mut reversed = Vec::new();
        let mut failed = Vec::new();

        for (item_id, quantity) in saga.outstanding_deductions() {
            let event = match self.restore(&item_id, quantity).await {
                Ok(()) => {
                    reversed.push((item_id.clone(), quantity));
                    CheckoutEvent::deduction_reversed(item_id, quantity, self.clock.now())
                }
                Err(e) => {
                    tracing::error!(%item_id, quantity, error = %e, "failed to reverse deduction");
                    failed.push(item_id.clone());
                    CheckoutEvent::reversal_failed(item_id, quantity, e.to_string(), self.clock.now())
                }
            };
            append_saga_event(self.journal.store(), saga, checkout_id, event).await?;
        }

        if !failed.is_empty() {
            return Err(CheckoutError::ReconciliationIncomplete {
                checkout_id,
                failed,
            });
        }

        let event = CheckoutEvent::checkout_reconciled(false, self.clock.now());
        append_saga_event(self.journal.store(), saga, checkout_id, event).await?;

        Ok(ReconciliationReport {
            checkout_id,
            reversed,
            order_cancelled: false,
            pending_order_restores: Vec::new(),
        })
    }

    /// One restore, bounded by the timeout and retried while the ledger is unreachable.
    async fn restore(&self, item_id: &ItemId, quantity: u32) -> std::result::Result<(), InventoryError> {
        let timeout = self.config.rpc_timeout;
        let inventory = &self.inventory;
        retry_with_backoff(&self.config.retry, InventoryError::is_transient, || async move {
            match tokio::time::timeout(timeout, inventory.restore(item_id, i64::from(quantity))).await
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
