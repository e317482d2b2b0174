//! Checkout coordinator.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{
    CheckoutId, CheckoutRecord, Clock, Money, OrderId, PaymentId, PaymentMethod, RetryPolicy,
    SystemClock, UserId,
};
use domain::CommandHandler;
use event_store::EventStore;
use inventory::InventoryService;
use payments::{PaymentPayload, PaymentRequest, PaymentService, PaymentStatus, validate_payment};
use serde::{Deserialize, Serialize};

use crate::aggregate::CheckoutSaga;
use crate::cart::{Cart, CartStore};
use crate::channel::CheckoutPublisher;
use crate::error::{CheckoutError, Result};
use crate::events::{CheckoutEvent, CheckoutStep};
use crate::journal::append_saga_event;

/// Timeouts and retries for the calls checkout makes.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Upper bound for every ledger, processor and channel call.
    pub rpc_timeout: Duration,
    /// Backoff for giving deductions back during reconciliation.
    pub retry: RetryPolicy,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            rpc_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

impl CheckoutConfig {
    pub fn with_rpc_timeout(mut self, rpc_timeout: Duration) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// A checkout submission: the method plus its payload blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub payment_method: PaymentMethod,
    #[serde(flatten)]
    pub payload: PaymentPayload,
}

impl CheckoutRequest {
    pub fn new(payment_method: PaymentMethod, payload: PaymentPayload) -> Self {
        Self {
            payment_method,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub message: String,
    pub checkout_id: CheckoutId,
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub transaction_id: String,
    pub payment_status: PaymentStatus,
    pub total_amount: Money,
}

/// Runs checkouts: deduct each cart line, publish the checkout record,
/// capture payment and clear the cart.
///
/// The steps commit independently. Every step is journaled under the checkout
/// id, so a checkout that stops halfway can be found and repaired by the
/// [`Reconciler`](crate::Reconciler). Earlier deductions are never undone
/// inline.
pub struct CheckoutCoordinator<S, C, I, P, B>
where
    S: EventStore,
    C: CartStore,
    I: InventoryService,
    P: PaymentService,
    B: CheckoutPublisher,
{
    journal: CommandHandler<S, CheckoutSaga>,
    carts: C,
    inventory: I,
    payments: P,
    publisher: B,
    clock: Arc<dyn Clock>,
    config: CheckoutConfig,
}

impl<S, C, I, P, B> CheckoutCoordinator<S, C, I, P, B>
where
    S: EventStore,
    C: CartStore,
    I: InventoryService,
    P: PaymentService,
    B: CheckoutPublisher,
{
    pub fn new(store: S, carts: C, inventory: I, payments: P, publisher: B) -> Self {
        Self {
            journal: CommandHandler::new(store),
            carts,
            inventory,
            payments,
            publisher,
            clock: Arc::new(SystemClock),
            config: CheckoutConfig::default(),
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

    pub fn carts(&self) -> &C {
        &self.carts
    }

    /// Checks out the user's cart.
    #[tracing::instrument(skip(self, request), fields(%user_id, method = %request.payment_method))]
    pub async fn checkout(
        &self,
        user_id: UserId,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse> {
        metrics::counter!("checkout_started_total").increment(1);
        let started = Instant::now();

        let result = self.run(user_id, request).await;

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("checkout_duration_seconds").record(duration);
        if let Ok(response) = &result {
            metrics::counter!("checkout_completed_total").increment(1);
            tracing::info!(
                checkout_id = %response.checkout_id,
                order_id = %response.order_id,
                total = %response.total_amount,
                duration,
                "checkout completed"
            );
        }
        result
    }

    async fn run(&self, user_id: UserId, request: CheckoutRequest) -> Result<CheckoutResponse> {
        let cart = self
            .carts
            .get_cart(user_id)
            .await
            .map_err(|e| rejected(CheckoutStep::LoadCart, e))?;
        if cart.is_empty() {
            return Err(rejected(CheckoutStep::LoadCart, CheckoutError::EmptyCart(user_id)));
        }

        validate_payment(request.payment_method, &request.payload, self.clock.today())
            .map_err(|e| rejected(CheckoutStep::ValidatePayment, e.into()))?;

        let checkout_id = CheckoutId::new();
        let order_id = OrderId::new();
        let mut saga = CheckoutSaga::default();
        self.record(
            &mut saga,
            checkout_id,
            CheckoutEvent::checkout_started(
                checkout_id,
                order_id,
                user_id,
                request.payment_method,
                &cart.lines,
                self.clock.now(),
            ),
        )
        .await?;

        self.deduct_lines(&mut saga, checkout_id, &cart).await?;

        let total = cart.total();
        let record = CheckoutRecord {
            checkout_id,
            order_id,
            user_id,
            payment_method: request.payment_method,
            total_price: total,
            items: cart.item_details(),
            placed_at: self.clock.now(),
        };
        match self.call("order channel", self.publisher.publish(record.clone())).await {
            Ok(()) => {
                let event = CheckoutEvent::record_published(record, self.clock.now());
                self.record(&mut saga, checkout_id, event).await?;
            }
            Err(e) => return Err(self.abort(&mut saga, checkout_id, CheckoutStep::PublishRecord, e).await),
        }

        let payment = PaymentRequest {
            user_id,
            order_id,
            amount: total,
            method: request.payment_method,
            payload: request.payload,
        };
        let receipt = match self.call("payment processor", self.payments.process_payment(payment)).await {
            Ok(receipt) => {
                let event = CheckoutEvent::payment_captured(&receipt, self.clock.now());
                self.record(&mut saga, checkout_id, event).await?;
                receipt
            }
            Err(e) => {
                let event = CheckoutEvent::payment_failed(e.kind(), e.to_string(), self.clock.now());
                self.record(&mut saga, checkout_id, event).await?;
                return Err(self.abort(&mut saga, checkout_id, CheckoutStep::CapturePayment, e).await);
            }
        };

        // The order and payment exist at this point; a stale cart is only logged.
        match self.carts.clear(user_id).await {
            Ok(()) => {
                let event = CheckoutEvent::cart_cleared(self.clock.now());
                self.record(&mut saga, checkout_id, event).await?;
            }
            Err(e) => tracing::warn!(%checkout_id, error = %e, "failed to clear cart after checkout"),
        }

        let event = CheckoutEvent::checkout_completed(total, self.clock.now());
        self.record(&mut saga, checkout_id, event).await?;

        Ok(CheckoutResponse {
            message: "Checkout completed".to_string(),
            checkout_id,
            order_id,
            payment_id: receipt.payment_id,
            transaction_id: receipt.transaction_id,
            payment_status: receipt.status,
            total_amount: total,
        })
    }

    /// Deducts every line in cart order, stopping at the first failure.
    async fn deduct_lines(
        &self,
        saga: &mut CheckoutSaga,
        checkout_id: CheckoutId,
        cart: &Cart,
    ) -> Result<()> {
        for line in &cart.lines {
            let deducted = self
                .call(
                    "inventory",
                    self.inventory.deduct(&line.item_id, i64::from(line.quantity)),
                )
                .await;
            match deducted {
                Ok(remaining) => {
                    tracing::debug!(item_id = %line.item_id, quantity = line.quantity, remaining, "stock deducted");
                    let event = CheckoutEvent::stock_deducted(
                        line.item_id.clone(),
                        line.quantity,
                        remaining,
                        self.clock.now(),
                    );
                    self.record(saga, checkout_id, event).await?;
                }
                Err(e) => {
                    let event = CheckoutEvent::deduction_failed(
                        line.item_id.clone(),
                        line.quantity,
                        e.kind(),
                        e.to_string(),
                        self.clock.now(),
                    );
                    self.record(saga, checkout_id, event).await?;
                    return Err(self.abort(saga, checkout_id, CheckoutStep::DeductStock, e).await);
                }
            }
        }
        Ok(())
    }

    /// Bounds a downstream call by the configured timeout.
    async fn call<T, E>(
        &self,
        service: &'static str,
        fut: impl Future<Output = std::result::Result<T, E>>,
    ) -> Result<T>
    where
        CheckoutError: From<E>,
    {
        match tokio::time::timeout(self.config.rpc_timeout, fut).await {
            Ok(result) => result.map_err(CheckoutError::from),
            Err(_) => Err(CheckoutError::ServiceUnavailable {
                service,
                timeout: self.config.rpc_timeout,
            }),
        }
    }

    async fn record(
        &self,
        saga: &mut CheckoutSaga,
        checkout_id: CheckoutId,
        event: CheckoutEvent,
    ) -> Result<()> {
        append_saga_event(self.journal.store(), saga, checkout_id, event).await
    }

    /// Journals the failure and hands back the error to surface.
    async fn abort(
        &self,
        saga: &mut CheckoutSaga,
        checkout_id: CheckoutId,
        step: CheckoutStep,
        error: CheckoutError,
    ) -> CheckoutError {
        let event = CheckoutEvent::checkout_failed(step, error.kind(), error.to_string(), self.clock.now());
        if let Err(journal_error) = self.record(saga, checkout_id, event).await {
            tracing::error!(%checkout_id, error = %journal_error, "failed to journal checkout failure");
        }

        metrics::counter!("checkout_failed_total", "step" => step.as_str()).increment(1);
        let outstanding = saga.outstanding_deductions().len();
        if outstanding > 0 {
            tracing::warn!(%checkout_id, %step, outstanding, error = %error, "checkout failed, needs reconciliation");
        } else {
            tracing::warn!(%checkout_id, %step, error = %error, "checkout failed");
        }
        error
    }

    /// Replays a checkout from its journal.
    pub async fn get_saga(&self, checkout_id: CheckoutId) -> Result<CheckoutSaga> {
        self.journal
            .load_existing(checkout_id)
            .await?
            .ok_or(CheckoutError::CheckoutNotFound(checkout_id))
    }
}

/// Counts a failure that happened before anything was journaled.
fn rejected(step: CheckoutStep, error: CheckoutError) -> CheckoutError {
    metrics::counter!("checkout_failed_total", "step" => step.as_str()).increment(1);
    tracing::info!(%step, error = %error, "checkout rejected");
    error
}
