//! Checkout saga aggregate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{CheckoutId, CheckoutRecord, ErrorKind, ItemId, Money, OrderId, PaymentId, PaymentMethod, UserId};
use domain::Aggregate;
use event_store::Version;
use serde::Serialize;

use crate::error::CheckoutError;
use crate::events::{CheckoutEvent, CheckoutStep, PaymentCapturedData, SagaLine};
use crate::state::SagaState;

/// Why a checkout stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SagaFailure {
    pub step: CheckoutStep,
    pub kind: ErrorKind,
    pub reason: String,
}

/// One checkout, replayed from its journal.
///
/// Tracks which lines were taken from stock and have not been given back,
/// so a failed checkout can be repaired later.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckoutSaga {
    id: Option<CheckoutId>,
    version: Version,
    order_id: Option<OrderId>,
    user_id: Option<UserId>,
    payment_method: Option<PaymentMethod>,
    state: SagaState,
    lines: Vec<SagaLine>,
    outstanding: BTreeMap<ItemId, u32>,
    reversal_failures: BTreeMap<ItemId, String>,
    record: Option<CheckoutRecord>,
    payment: Option<PaymentCapturedData>,
    cart_cleared: bool,
    total_amount: Option<Money>,
    failure: Option<SagaFailure>,
    started_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Aggregate for CheckoutSaga {
    type Event = CheckoutEvent;
    type Error = CheckoutError;

    fn aggregate_type() -> &'static str {
        "CheckoutSaga"
    }

    fn id(&self) -> Option<CheckoutId> {
        self.id
    }

    fn correlation_id(&self) -> Option<CheckoutId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            CheckoutEvent::CheckoutStarted(data) => {
                self.id = Some(data.checkout_id);
                self.order_id = Some(data.order_id);
                self.user_id = Some(data.user_id);
                self.payment_method = Some(data.payment_method);
                self.lines = data.lines;
                self.state = SagaState::Running;
                self.started_at = Some(data.started_at);
                self.updated_at = Some(data.started_at);
            }
            CheckoutEvent::StockDeducted(data) => {
                *self.outstanding.entry(data.item_id).or_default() += data.quantity;
                self.updated_at = Some(data.deducted_at);
            }
            CheckoutEvent::DeductionFailed(data) => {
                self.updated_at = Some(data.failed_at);
            }
            CheckoutEvent::RecordPublished(data) => {
                self.total_amount = Some(data.record.total_price);
                self.record = Some(data.record);
                self.updated_at = Some(data.published_at);
            }
            CheckoutEvent::PaymentCaptured(data) => {
                self.updated_at = Some(data.captured_at);
                self.payment = Some(data);
            }
            CheckoutEvent::PaymentFailed(data) => {
                self.updated_at = Some(data.failed_at);
            }
            CheckoutEvent::CartCleared(data) => {
                self.cart_cleared = true;
                self.updated_at = Some(data.cleared_at);
            }
            CheckoutEvent::CheckoutCompleted(data) => {
                self.state = SagaState::Completed;
                self.total_amount = Some(data.total_amount);
                self.updated_at = Some(data.completed_at);
            }
            CheckoutEvent::CheckoutFailed(data) => {
                self.state = SagaState::Failed;
                self.failure = Some(SagaFailure {
                    step: data.step,
                    kind: data.kind,
                    reason: data.reason,
                });
                self.updated_at = Some(data.failed_at);
            }
            CheckoutEvent::DeductionReversed(data) => {
                self.outstanding.remove(&data.item_id);
                self.reversal_failures.remove(&data.item_id);
                self.updated_at = Some(data.reversed_at);
            }
            CheckoutEvent::ReversalFailed(data) => {
                self.reversal_failures.insert(data.item_id, data.reason);
                self.updated_at = Some(data.failed_at);
            }
            CheckoutEvent::CheckoutReconciled(data) => {
                self.state = SagaState::Reconciled;
                self.outstanding.clear();
                self.updated_at = Some(data.reconciled_at);
            }
        }
    }
}

// Query methods
impl CheckoutSaga {
    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    /// The lines the checkout set out to deduct, in cart order.
    pub fn lines(&self) -> &[SagaLine] {
        &self.lines
    }

    /// Deducted quantities that have not been given back, by item.
    pub fn outstanding_deductions(&self) -> Vec<(ItemId, u32)> {
        self.outstanding
            .iter()
            .map(|(item_id, quantity)| (item_id.clone(), *quantity))
            .collect()
    }

    pub fn reversal_failures(&self) -> &BTreeMap<ItemId, String> {
        &self.reversal_failures
    }

    /// The published checkout record, if publication happened.
    pub fn record(&self) -> Option<&CheckoutRecord> {
        self.record.as_ref()
    }

    pub fn payment_id(&self) -> Option<PaymentId> {
        self.payment.as_ref().map(|p| p.payment_id)
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.payment.as_ref().map(|p| p.transaction_id.as_str())
    }

    pub fn cart_cleared(&self) -> bool {
        self.cart_cleared
    }

    pub fn total_amount(&self) -> Option<Money> {
        self.total_amount
    }

    pub fn failure(&self) -> Option<&SagaFailure> {
        self.failure.as_ref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// A failed checkout that still holds stock.
    pub fn needs_reconciliation(&self) -> bool {
        self.state.can_reconcile() && !self.outstanding.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::CartLine;

    fn started() -> (CheckoutSaga, CheckoutId) {
        let checkout_id = CheckoutId::new();
        let mut saga = CheckoutSaga::default();
        saga.apply(CheckoutEvent::checkout_started(
            checkout_id,
            OrderId::new(),
            UserId::new(),
            PaymentMethod::Cash,
            &[
                CartLine::new("X", 2, Money::from_units(10)),
                CartLine::new("Y", 1, Money::from_units(4)),
            ],
            Utc::now(),
        ));
        (saga, checkout_id)
    }

    #[test]
    fn test_default_saga() {
        let saga = CheckoutSaga::default();
        assert!(saga.id().is_none());
        assert_eq!(saga.state(), SagaState::NotStarted);
        assert!(!saga.needs_reconciliation());
    }

    #[test]
    fn test_started_saga_is_running_and_correlated() {
        let (saga, checkout_id) = started();
        assert_eq!(saga.state(), SagaState::Running);
        assert_eq!(saga.id(), Some(checkout_id));
        assert_eq!(saga.correlation_id(), Some(checkout_id));
        assert_eq!(saga.lines().len(), 2);
    }

    #[test]
    fn test_failed_deduction_leaves_earlier_lines_outstanding() {
        let (mut saga, _) = started();
        let now = Utc::now();
        saga.apply(CheckoutEvent::stock_deducted("X".into(), 2, 3, now));
        saga.apply(CheckoutEvent::deduction_failed(
            "Y".into(),
            1,
            ErrorKind::InsufficientStock,
            "none left",
            now,
        ));
        saga.apply(CheckoutEvent::checkout_failed(
            CheckoutStep::DeductStock,
            ErrorKind::InsufficientStock,
            "none left",
            now,
        ));

        assert_eq!(saga.state(), SagaState::Failed);
        assert_eq!(saga.outstanding_deductions(), vec![(ItemId::from("X"), 2)]);
        assert!(saga.needs_reconciliation());
        assert_eq!(saga.failure().unwrap().step, CheckoutStep::DeductStock);
    }

    #[test]
    fn test_failure_before_any_deduction_needs_nothing() {
        let (mut saga, _) = started();
        saga.apply(CheckoutEvent::checkout_failed(
            CheckoutStep::DeductStock,
            ErrorKind::NotFound,
            "unknown item",
            Utc::now(),
        ));
        assert_eq!(saga.state(), SagaState::Failed);
        assert!(!saga.needs_reconciliation());
    }

    #[test]
    fn test_reversals_and_reconciliation() {
        let (mut saga, _) = started();
        let now = Utc::now();
        saga.apply(CheckoutEvent::stock_deducted("X".into(), 2, 3, now));
        saga.apply(CheckoutEvent::stock_deducted("Y".into(), 1, 0, now));
        saga.apply(CheckoutEvent::checkout_failed(
            CheckoutStep::PublishRecord,
            ErrorKind::ServiceUnavailable,
            "channel closed",
            now,
        ));

        saga.apply(CheckoutEvent::deduction_reversed("X".into(), 2, now));
        saga.apply(CheckoutEvent::reversal_failed("Y".into(), 1, "timeout", now));
        assert_eq!(saga.outstanding_deductions(), vec![(ItemId::from("Y"), 1)]);
        assert!(saga.reversal_failures().contains_key(&ItemId::from("Y")));
        assert!(saga.needs_reconciliation());

        saga.apply(CheckoutEvent::deduction_reversed("Y".into(), 1, now));
        saga.apply(CheckoutEvent::checkout_reconciled(false, now));
        assert_eq!(saga.state(), SagaState::Reconciled);
        assert!(saga.reversal_failures().is_empty());
        assert!(!saga.needs_reconciliation());
    }

    #[test]
    fn test_completed_saga_never_needs_reconciliation() {
        let (mut saga, _) = started();
        let now = Utc::now();
        saga.apply(CheckoutEvent::stock_deducted("X".into(), 2, 3, now));
        saga.apply(CheckoutEvent::checkout_completed(Money::from_units(20), now));
        assert_eq!(saga.state(), SagaState::Completed);
        assert_eq!(saga.total_amount(), Some(Money::from_units(20)));
        assert!(!saga.needs_reconciliation());
    }
}
