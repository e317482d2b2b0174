use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Clock, Money, OrderId, PaymentId, PaymentMethod, SystemClock, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    Payment, PaymentError, PaymentPayload, PaymentStatus, Result, method::PaymentDetails,
};

/// Everything needed to take a payment for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub user_id: UserId,
    pub order_id: OrderId,
    pub amount: Money,
    pub method: PaymentMethod,
    #[serde(default)]
    pub payload: PaymentPayload,
}

/// What checkout reports back to the shopper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payment_id: PaymentId,
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub amount: Money,
}

impl From<&Payment> for PaymentReceipt {
    fn from(payment: &Payment) -> Self {
        Self {
            payment_id: payment.id,
            transaction_id: payment.transaction_id.clone(),
            status: payment.status,
            amount: payment.amount,
        }
    }
}

/// Payment operations used by checkout.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Validates the request and captures the payment.
    async fn process_payment(&self, request: PaymentRequest) -> Result<PaymentReceipt>;

    /// Refunds a completed payment.
    async fn refund(&self, payment_id: PaymentId) -> Result<Payment>;
}

#[async_trait]
impl<T: PaymentService + ?Sized> PaymentService for Arc<T> {
    async fn process_payment(&self, request: PaymentRequest) -> Result<PaymentReceipt> {
        (**self).process_payment(request).await
    }

    async fn refund(&self, payment_id: PaymentId) -> Result<Payment> {
        (**self).refund(payment_id).await
    }
}

const REFUND_REQUIRES_COMPLETED: &str = "Only completed payments can be refunded";
const SETTLE_REQUIRES_PENDING: &str = "Only pending payments can be settled";

/// In-process payment processor.
#[derive(Clone)]
pub struct PaymentProcessor {
    payments: Arc<RwLock<HashMap<PaymentId, Payment>>>,
    clock: Arc<dyn Clock>,
}

impl Default for PaymentProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PaymentProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentProcessor").finish_non_exhaustive()
    }
}

impl PaymentProcessor {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            payments: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Validates `request` and builds a payment in `status`, without storing it.
    fn prepare(&self, request: &PaymentRequest, status: PaymentStatus) -> Result<Payment> {
        if !request.amount.is_positive() {
            return Err(PaymentError::InvalidAmount(request.amount));
        }
        let details = PaymentDetails::from_payload(request.method, &request.payload)?;
        details.check_expiry(self.clock.today())?;
        tracing::debug!(method = %request.method, details = %details.summary(), "payment details accepted");

        let now = self.clock.now();
        Ok(Payment {
            id: PaymentId::new(),
            user_id: request.user_id,
            order_id: request.order_id,
            amount: request.amount,
            method: request.method,
            status,
            transaction_id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn store(&self, payment: Payment) -> Payment {
        self.payments
            .write()
            .await
            .insert(payment.id, payment.clone());
        payment
    }

    /// Applies a status transition under the write lock.
    async fn transition(
        &self,
        payment_id: PaymentId,
        next: PaymentStatus,
        reason: &'static str,
    ) -> Result<Payment> {
        let mut payments = self.payments.write().await;
        let payment = payments
            .get_mut(&payment_id)
            .ok_or(PaymentError::NotFound(payment_id))?;
        payment.transition(next, reason, self.clock.now())?;
        Ok(payment.clone())
    }

    /// Records a validated payment that awaits settlement.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id, method = %request.method))]
    pub async fn record_pending(&self, request: PaymentRequest) -> Result<Payment> {
        let payment = self.prepare(&request, PaymentStatus::Pending)?;
        tracing::info!(payment_id = %payment.id, amount = %payment.amount, "payment pending");
        Ok(self.store(payment).await)
    }

    /// Marks a pending payment as captured.
    #[tracing::instrument(skip(self))]
    pub async fn settle(&self, payment_id: PaymentId) -> Result<Payment> {
        let payment = self
            .transition(payment_id, PaymentStatus::Completed, SETTLE_REQUIRES_PENDING)
            .await?;
        metrics::counter!("payments_processed_total", "method" => payment.method.as_str())
            .increment(1);
        tracing::info!("payment settled");
        Ok(payment)
    }

    /// Marks a pending payment as failed.
    #[tracing::instrument(skip(self))]
    pub async fn fail(&self, payment_id: PaymentId) -> Result<Payment> {
        let payment = self
            .transition(payment_id, PaymentStatus::Failed, SETTLE_REQUIRES_PENDING)
            .await?;
        metrics::counter!("payments_failed_total").increment(1);
        tracing::warn!("payment failed");
        Ok(payment)
    }

    pub async fn get_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        self.payments
            .read()
            .await
            .get(&payment_id)
            .cloned()
            .ok_or(PaymentError::NotFound(payment_id))
    }

    pub async fn find_by_transaction(&self, transaction_id: &str) -> Result<Payment> {
        self.select(|p| p.transaction_id == transaction_id)
            .await
            .into_iter()
            .next()
            .ok_or_else(|| PaymentError::UnknownTransaction(transaction_id.to_string()))
    }

    pub async fn payments_for_order(&self, order_id: OrderId) -> Vec<Payment> {
        self.select(|p| p.order_id == order_id).await
    }

    pub async fn payments_for_user(&self, user_id: UserId) -> Vec<Payment> {
        self.select(|p| p.user_id == user_id).await
    }

    pub async fn list_payments(&self) -> Vec<Payment> {
        self.select(|_| true).await
    }

    /// Matching payments, newest first.
    async fn select(&self, filter: impl Fn(&Payment) -> bool) -> Vec<Payment> {
        let payments = self.payments.read().await;
        let mut selected: Vec<_> = payments.values().filter(|p| filter(p)).cloned().collect();
        selected.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        selected
    }
}

#[async_trait]
impl PaymentService for PaymentProcessor {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id, method = %request.method))]
    async fn process_payment(&self, request: PaymentRequest) -> Result<PaymentReceipt> {
        let payment = self.prepare(&request, PaymentStatus::Completed)?;
        let payment = self.store(payment).await;

        metrics::counter!("payments_processed_total", "method" => payment.method.as_str())
            .increment(1);
        tracing::info!(
            payment_id = %payment.id,
            transaction_id = %payment.transaction_id,
            amount = %payment.amount,
            "payment completed"
        );
        Ok(PaymentReceipt::from(&payment))
    }

    #[tracing::instrument(skip(self))]
    async fn refund(&self, payment_id: PaymentId) -> Result<Payment> {
        let payment = self
            .transition(payment_id, PaymentStatus::Refunded, REFUND_REQUIRES_COMPLETED)
            .await?;
        metrics::counter!("payments_refunded_total").increment(1);
        tracing::info!(amount = %payment.amount, "payment refunded");
        Ok(payment)
    }
}
