//! Checkout scenarios end to end: ledger, journal, record channel, orders and
//! payments wired together, with doubles for slow or failing services.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{
    CheckoutRecord, ErrorKind, FixedClock, ItemId, Money, PaymentMethod, RetryPolicy, UserId,
};
use domain::{Aggregate, CompensationConfig, OrderService, OrderStatus};
use event_store::{EventStore, InMemoryEventStore};
use inventory::{Availability, InventoryError, InventoryItem, InventoryLedger, InventoryService};
use payments::{
    CardDetails, Payment, PaymentError, PaymentPayload, PaymentProcessor, PaymentReceipt,
    PaymentRequest, PaymentService, PaymentStatus,
};
use saga::{
    CartLine, CartStore, ChannelPublisher, CheckoutConfig, CheckoutCoordinator,
    CheckoutRequest, CheckoutStep, InMemoryCartStore, Reconciler, SagaState,
};
use tokio::sync::mpsc;

/// Ledger double: deductions can be slowed down, restores can fail.
#[derive(Clone)]
struct TestInventory {
    inner: InventoryLedger,
    deduct_delay: Option<Duration>,
    fail_restores: Arc<AtomicBool>,
}

impl TestInventory {
    fn set_fail_restores(&self, fail: bool) {
        self.fail_restores.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl InventoryService for TestInventory {
    async fn check_availability(
        &self,
        item_id: &ItemId,
        quantity: i64,
    ) -> inventory::Result<Availability> {
        self.inner.check_availability(item_id, quantity).await
    }

    async fn deduct(&self, item_id: &ItemId, quantity: i64) -> inventory::Result<i64> {
        if let Some(delay) = self.deduct_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.deduct(item_id, quantity).await
    }

    async fn restore(&self, item_id: &ItemId, quantity: i64) -> inventory::Result<i64> {
        if self.fail_restores.load(Ordering::SeqCst) {
            return Err(InventoryError::Unavailable("connection refused".to_string()));
        }
        self.inner.restore(item_id, quantity).await
    }
}

/// Processor double that can be switched off.
#[derive(Clone)]
struct TestPayments {
    inner: PaymentProcessor,
    fail: Arc<AtomicBool>,
}

impl TestPayments {
    fn set_fail_payments(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentService for TestPayments {
    async fn process_payment(&self, request: PaymentRequest) -> payments::Result<PaymentReceipt> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PaymentError::Unavailable("gateway down".to_string()));
        }
        self.inner.process_payment(request).await
    }

    async fn refund(&self, payment_id: common::PaymentId) -> payments::Result<Payment> {
        self.inner.refund(payment_id).await
    }
}

type Coordinator = CheckoutCoordinator<
    InMemoryEventStore,
    InMemoryCartStore,
    TestInventory,
    TestPayments,
    ChannelPublisher,
>;

struct Harness {
    store: InMemoryEventStore,
    ledger: InventoryLedger,
    inventory: TestInventory,
    carts: InMemoryCartStore,
    payments: TestPayments,
    orders: Arc<OrderService<InMemoryEventStore, TestInventory>>,
    coordinator: Arc<Coordinator>,
    reconciler: Reconciler<InMemoryEventStore, TestInventory, ChannelPublisher>,
    records: mpsc::Receiver<CheckoutRecord>,
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::default()
        .with_max_retries(2)
        .with_initial_delay(Duration::from_millis(1))
}

async fn harness_with(deduct_delay: Option<Duration>, rpc_timeout: Duration) -> Harness {
    let ledger = InventoryLedger::new();
    ledger
        .seed([
            InventoryItem::new("X", "Widget", Money::from_units(10), 5),
            InventoryItem::new("Y", "Gadget", Money::from_units(4), 0),
            InventoryItem::new("Z", "Gizmo", Money::from_cents(250), 100),
        ])
        .await
        .unwrap();

    let inventory = TestInventory {
        inner: ledger.clone(),
        deduct_delay,
        fail_restores: Arc::new(AtomicBool::new(false)),
    };
    let clock = Arc::new(FixedClock::on(2025, 1, 15).unwrap());
    let payments = TestPayments {
        inner: PaymentProcessor::with_clock(clock.clone()),
        fail: Arc::new(AtomicBool::new(false)),
    };
    let store = InMemoryEventStore::new();
    let carts = InMemoryCartStore::new();
    let (publisher, records) = ChannelPublisher::channel(64);
    let config = CheckoutConfig::default()
        .with_rpc_timeout(rpc_timeout)
        .with_retry(fast_retry());

    let orders = Arc::new(
        OrderService::new(store.clone(), inventory.clone()).with_compensation(CompensationConfig {
            timeout: rpc_timeout,
            retry: fast_retry(),
        }),
    );
    let coordinator = CheckoutCoordinator::new(
        store.clone(),
        carts.clone(),
        inventory.clone(),
        payments.clone(),
        publisher.clone(),
    )
    .with_clock(clock.clone())
    .with_config(config.clone());
    let reconciler = Reconciler::new(store.clone(), inventory.clone(), orders.clone(), publisher)
        .with_clock(clock)
        .with_config(config);

    Harness {
        store,
        ledger,
        inventory,
        carts,
        payments,
        orders,
        coordinator: Arc::new(coordinator),
        reconciler,
        records,
    }
}

async fn harness() -> Harness {
    harness_with(None, Duration::from_secs(5)).await
}

impl Harness {
    async fn add(&self, user: UserId, item: &str, quantity: u32) {
        let price = self.ledger.get_item(&item.into()).await.unwrap().unit_price;
        self.carts
            .add_item(user, CartLine::new(item, quantity, price))
            .await
            .unwrap();
    }

    async fn stock(&self, item: &str) -> i64 {
        self.ledger.quantity_of(&item.into()).await.unwrap()
    }
}

fn cash() -> CheckoutRequest {
    CheckoutRequest::new(PaymentMethod::Cash, PaymentPayload::default())
}

fn credit_card(expiry: &str) -> CheckoutRequest {
    CheckoutRequest::new(
        PaymentMethod::CreditCard,
        PaymentPayload::credit_card(CardDetails {
            card_number: "4111111111111111".to_string(),
            cardholder_name: "Ada Lovelace".to_string(),
            expiry_date: expiry.to_string(),
            cvv: "123".to_string(),
        }),
    )
}

#[tokio::test]
async fn test_insufficient_stock_aborts_without_undoing_earlier_lines() {
    let mut h = harness().await;
    let user = UserId::new();
    h.add(user, "X", 2).await;
    h.add(user, "Y", 1).await;

    let err = h.coordinator.checkout(user, cash()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InsufficientStock);
    assert_eq!(h.stock("X").await, 3);
    assert_eq!(h.stock("Y").await, 0);
    assert!(h.records.try_recv().is_err(), "no record is published");
    assert!(!h.carts.get_cart(user).await.unwrap().is_empty());

    let pending = h.reconciler.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    let saga = &pending[0];
    assert_eq!(saga.state(), SagaState::Failed);
    assert_eq!(saga.failure().unwrap().step, CheckoutStep::DeductStock);
    assert_eq!(saga.outstanding_deductions(), vec![(ItemId::from("X"), 2)]);

    let checkout_id = saga.id().unwrap();
    let report = h.reconciler.reconcile(checkout_id).await.unwrap();
    assert_eq!(report.reversed, vec![(ItemId::from("X"), 2)]);
    assert!(!report.order_cancelled);
    assert_eq!(h.stock("X").await, 5);

    let saga = h.coordinator.get_saga(checkout_id).await.unwrap();
    assert_eq!(saga.state(), SagaState::Reconciled);
    assert!(h.reconciler.pending().await.unwrap().is_empty());

    let err = h.reconciler.reconcile(checkout_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(h.stock("X").await, 5);
}

#[tokio::test]
async fn test_cash_without_payload_is_confirmed_and_completes() {
    let mut h = harness().await;
    let user = UserId::new();
    h.add(user, "X", 1).await;

    let response = h.coordinator.checkout(user, cash()).await.unwrap();

    assert_eq!(response.payment_status, PaymentStatus::Completed);
    assert!(!response.transaction_id.is_empty());
    assert_eq!(response.total_amount, Money::from_units(10));
    assert!(h.carts.get_cart(user).await.unwrap().is_empty());

    let record = h.records.recv().await.unwrap();
    assert_eq!(record.order_id, response.order_id);
    assert_eq!(record.user_id, user);
    assert_eq!(record.payment_method, PaymentMethod::Cash);
}

#[tokio::test]
async fn test_expired_card_is_rejected_before_any_deduction() {
    let h = harness().await;
    let user = UserId::new();
    h.add(user, "X", 2).await;

    let err = h
        .coordinator
        .checkout(user, credit_card("01/20"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CardExpired);
    assert_eq!(h.stock("X").await, 5);
    assert_eq!(h.store.event_count().await, 0);
    assert!(h.reconciler.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_card_expiring_this_month_is_accepted() {
    let h = harness().await;
    let user = UserId::new();
    h.add(user, "X", 1).await;

    let response = h.coordinator.checkout(user, credit_card("01/25")).await.unwrap();
    assert_eq!(response.payment_status, PaymentStatus::Completed);
}

#[tokio::test]
async fn test_malformed_payload_is_rejected_before_any_deduction() {
    let h = harness().await;
    let user = UserId::new();
    h.add(user, "X", 1).await;

    let request = CheckoutRequest::new(PaymentMethod::MobilePayment, PaymentPayload::default());
    let err = h.coordinator.checkout(user, request).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidPaymentDetails);
    assert_eq!(h.stock("X").await, 5);
}

#[tokio::test]
async fn test_empty_cart_is_rejected() {
    let h = harness().await;
    let err = h.coordinator.checkout(UserId::new(), cash()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyCart);
}

#[tokio::test]
async fn test_total_is_the_sum_of_captured_cart_prices() {
    let mut h = harness().await;
    let user = UserId::new();
    h.add(user, "X", 2).await;
    h.add(user, "Z", 3).await;
    // Captured at add time: a later price change must not leak into the total.
    h.ledger
        .upsert_item(InventoryItem::new("Z", "Gizmo", Money::from_cents(999), 97))
        .await
        .unwrap();

    let response = h.coordinator.checkout(user, cash()).await.unwrap();

    let expected = Money::from_units(10).times(2) + Money::from_cents(250).times(3);
    assert_eq!(response.total_amount, expected);

    let record = h.records.recv().await.unwrap();
    assert_eq!(record.total_price, expected);
    assert_eq!(
        record.items.values().map(|d| d.subtotal).sum::<Money>(),
        expected
    );

    let payment = h.payments.inner.get_payment(response.payment_id).await.unwrap();
    assert_eq!(payment.amount, expected);
    assert_eq!(payment.order_id, response.order_id);
}

#[tokio::test(start_paused = true)]
async fn test_slow_ledger_surfaces_service_unavailable() {
    let mut h = harness_with(Some(Duration::from_secs(30)), Duration::from_millis(200)).await;
    let user = UserId::new();
    h.add(user, "X", 1).await;

    let err = h.coordinator.checkout(user, cash()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
    assert_eq!(h.stock("X").await, 5);
    assert!(h.records.try_recv().is_err());
}

#[tokio::test]
async fn test_payment_failure_after_publication_is_reconciled_by_cancelling_the_order() {
    let mut h = harness().await;
    let user = UserId::new();
    h.add(user, "X", 2).await;
    h.payments.set_fail_payments(true);

    let err = h.coordinator.checkout(user, cash()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
    assert_eq!(h.stock("X").await, 3);
    assert!(!h.carts.get_cart(user).await.unwrap().is_empty());

    // The record went out before payment was attempted.
    let record = h.records.recv().await.unwrap();
    let saga = h.coordinator.get_saga(record.checkout_id).await.unwrap();
    assert_eq!(saga.failure().unwrap().step, CheckoutStep::CapturePayment);
    assert!(saga.needs_reconciliation());

    let report = h.reconciler.reconcile(record.checkout_id).await.unwrap();
    assert!(report.order_cancelled);
    assert!(report.pending_order_restores.is_empty());
    assert_eq!(h.stock("X").await, 5);

    let order = h.orders.get_order(record.order_id).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Cancelled);

    // A late delivery of the same record must not bring the order back.
    let order = h.orders.create_from_checkout_record(&record).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Cancelled);
    assert_eq!(h.stock("X").await, 5);
}

#[tokio::test]
async fn test_closed_channel_fails_checkout_and_reconciles_through_the_ledger() {
    let h = harness().await;
    let Harness {
        ledger,
        carts,
        coordinator,
        reconciler,
        records,
        ..
    } = h;
    drop(records);

    let user = UserId::new();
    carts
        .add_item(user, CartLine::new("Z", 4, Money::from_cents(250)))
        .await
        .unwrap();
    let err = coordinator.checkout(user, cash()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
    assert_eq!(ledger.quantity_of(&"Z".into()).await.unwrap(), 96);

    let pending = reconciler.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].record().is_none());
    assert!(pending[0].payment_id().is_none(), "payment is never attempted");

    reconciler.reconcile(pending[0].id().unwrap()).await.unwrap();
    assert_eq!(ledger.quantity_of(&"Z".into()).await.unwrap(), 100);
}

#[tokio::test]
async fn test_failed_reversals_stay_outstanding_until_a_later_reconcile() {
    let h = harness().await;
    let user = UserId::new();
    h.add(user, "X", 2).await;
    h.add(user, "Y", 1).await;
    h.coordinator.checkout(user, cash()).await.unwrap_err();
    let checkout_id = h.reconciler.pending().await.unwrap()[0].id().unwrap();

    h.inventory.set_fail_restores(true);
    let err = h.reconciler.reconcile(checkout_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CompensationFailed);
    assert_eq!(h.stock("X").await, 3);

    let saga = h.coordinator.get_saga(checkout_id).await.unwrap();
    assert!(saga.needs_reconciliation());
    assert!(saga.reversal_failures().contains_key(&ItemId::from("X")));

    h.inventory.set_fail_restores(false);
    h.reconciler.reconcile(checkout_id).await.unwrap();
    assert_eq!(h.stock("X").await, 5);
    assert!(h.reconciler.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_redelivered_record_resolves_to_the_same_order() {
    let mut h = harness().await;
    let user = UserId::new();
    h.add(user, "X", 1).await;
    let response = h.coordinator.checkout(user, cash()).await.unwrap();

    let first = h.records.recv().await.unwrap();
    let order = h.orders.create_from_checkout_record(&first).await.unwrap();
    h.orders
        .update_status(response.order_id, OrderStatus::Processing, None)
        .await
        .unwrap();

    let again = h.reconciler.redeliver(response.checkout_id).await.unwrap();
    assert_eq!(again, first);
    let redelivered = h.records.recv().await.unwrap();
    let same = h.orders.create_from_checkout_record(&redelivered).await.unwrap();

    assert_eq!(same.id(), order.id());
    assert_eq!(same.status(), OrderStatus::Processing);
    assert_eq!(h.orders.orders_for_user(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_checkout_without_record_cannot_be_redelivered() {
    let h = harness().await;
    let user = UserId::new();
    h.add(user, "Y", 1).await;
    h.coordinator.checkout(user, cash()).await.unwrap_err();

    let checkout_id = h.store.events_by_type("CheckoutFailed").await.unwrap()[0].aggregate_id;
    let err = h.reconciler.redeliver(checkout_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn test_concurrent_checkouts_never_oversell() {
    let h = harness().await;
    let mut users = Vec::new();
    for _ in 0..12 {
        let user = UserId::new();
        h.add(user, "X", 1).await;
        users.push(user);
    }

    let mut handles = Vec::new();
    for user in users {
        let coordinator = h.coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator.checkout(user, cash()).await
        }));
    }

    let mut completed = 0;
    let mut out_of_stock = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => completed += 1,
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::InsufficientStock);
                out_of_stock += 1;
            }
        }
    }

    assert_eq!(completed, 5);
    assert_eq!(out_of_stock, 7);
    assert_eq!(h.stock("X").await, 0);
}

#[tokio::test]
async fn test_journal_correlates_saga_and_order_events() {
    let mut h = harness().await;
    let user = UserId::new();
    h.add(user, "X", 1).await;
    let response = h.coordinator.checkout(user, cash()).await.unwrap();

    let record = h.records.recv().await.unwrap();
    h.orders.create_from_checkout_record(&record).await.unwrap();

    let types: Vec<String> = h
        .store
        .events_by_correlation(response.checkout_id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        types,
        [
            "CheckoutStarted",
            "StockDeducted",
            "RecordPublished",
            "PaymentCaptured",
            "CartCleared",
            "CheckoutCompleted",
            "OrderPlaced",
        ]
    );
}
