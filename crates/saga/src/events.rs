//! Checkout saga events.

use chrono::{DateTime, Utc};
use common::{CheckoutId, CheckoutRecord, ErrorKind, ItemId, Money, OrderId, PaymentId, PaymentMethod, UserId};
use domain::DomainEvent;
use payments::{PaymentReceipt, PaymentStatus};
use serde::{Deserialize, Serialize};

use crate::cart::CartLine;

/// The checkout step an event or failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    LoadCart,
    ValidatePayment,
    DeductStock,
    PublishRecord,
    CapturePayment,
    ClearCart,
}

impl CheckoutStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStep::LoadCart => "load_cart",
            CheckoutStep::ValidatePayment => "validate_payment",
            CheckoutStep::DeductStock => "deduct_stock",
            CheckoutStep::PublishRecord => "publish_record",
            CheckoutStep::CapturePayment => "capture_payment",
            CheckoutStep::ClearCart => "clear_cart",
        }
    }
}

impl std::fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events journaled under the checkout id while a checkout runs and when it
/// is reconciled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CheckoutEvent {
    CheckoutStarted(CheckoutStartedData),
    StockDeducted(StockDeductedData),
    DeductionFailed(DeductionFailedData),
    /// Carries the full record so it can be redelivered.
    RecordPublished(RecordPublishedData),
    PaymentCaptured(PaymentCapturedData),
    PaymentFailed(PaymentFailedData),
    CartCleared(CartClearedData),
    CheckoutCompleted(CheckoutCompletedData),
    CheckoutFailed(CheckoutFailedData),
    DeductionReversed(DeductionReversedData),
    ReversalFailed(ReversalFailedData),
    CheckoutReconciled(CheckoutReconciledData),
}

impl DomainEvent for CheckoutEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CheckoutEvent::CheckoutStarted(_) => "CheckoutStarted",
            CheckoutEvent::StockDeducted(_) => "StockDeducted",
            CheckoutEvent::DeductionFailed(_) => "DeductionFailed",
            CheckoutEvent::RecordPublished(_) => "RecordPublished",
            CheckoutEvent::PaymentCaptured(_) => "PaymentCaptured",
            CheckoutEvent::PaymentFailed(_) => "PaymentFailed",
            CheckoutEvent::CartCleared(_) => "CartCleared",
            CheckoutEvent::CheckoutCompleted(_) => "CheckoutCompleted",
            CheckoutEvent::CheckoutFailed(_) => "CheckoutFailed",
            CheckoutEvent::DeductionReversed(_) => "DeductionReversed",
            CheckoutEvent::ReversalFailed(_) => "ReversalFailed",
            CheckoutEvent::CheckoutReconciled(_) => "CheckoutReconciled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaLine {
    pub item_id: ItemId,
    pub quantity: u32,
    pub unit_price: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutStartedData {
    pub checkout_id: CheckoutId,
    /// Provisional order id; the order is created under it.
    pub order_id: OrderId,
    pub user_id: UserId,
    pub payment_method: PaymentMethod,
    pub lines: Vec<SagaLine>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockDeductedData {
    pub item_id: ItemId,
    pub quantity: u32,
    pub remaining: i64,
    pub deducted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeductionFailedData {
    pub item_id: ItemId,
    pub quantity: u32,
    pub kind: ErrorKind,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPublishedData {
    pub record: CheckoutRecord,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCapturedData {
    pub payment_id: PaymentId,
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub amount: Money,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedData {
    pub kind: ErrorKind,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartClearedData {
    pub cleared_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutCompletedData {
    pub total_amount: Money,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutFailedData {
    pub step: CheckoutStep,
    pub kind: ErrorKind,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeductionReversedData {
    pub item_id: ItemId,
    pub quantity: u32,
    pub reversed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReversalFailedData {
    pub item_id: ItemId,
    pub quantity: u32,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutReconciledData {
    /// True when the stock went back through cancelling the published order.
    pub order_cancelled: bool,
    pub reconciled_at: DateTime<Utc>,
}

// Convenience constructors
impl CheckoutEvent {
    pub fn checkout_started(
        checkout_id: CheckoutId,
        order_id: OrderId,
        user_id: UserId,
        payment_method: PaymentMethod,
        lines: &[CartLine],
        at: DateTime<Utc>,
    ) -> Self {
        CheckoutEvent::CheckoutStarted(CheckoutStartedData {
            checkout_id,
            order_id,
            user_id,
            payment_method,
            lines: lines
                .iter()
                .map(|line| SagaLine {
                    item_id: line.item_id.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                })
                .collect(),
            started_at: at,
        })
    }

    pub fn stock_deducted(item_id: ItemId, quantity: u32, remaining: i64, at: DateTime<Utc>) -> Self {
        CheckoutEvent::StockDeducted(StockDeductedData {
            item_id,
            quantity,
            remaining,
            deducted_at: at,
        })
    }

    pub fn deduction_failed(
        item_id: ItemId,
        quantity: u32,
        kind: ErrorKind,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        CheckoutEvent::DeductionFailed(DeductionFailedData {
            item_id,
            quantity,
            kind,
            reason: reason.into(),
            failed_at: at,
        })
    }

    pub fn record_published(record: CheckoutRecord, at: DateTime<Utc>) -> Self {
        CheckoutEvent::RecordPublished(RecordPublishedData {
            record,
            published_at: at,
        })
    }

    pub fn payment_captured(receipt: &PaymentReceipt, at: DateTime<Utc>) -> Self {
        CheckoutEvent::PaymentCaptured(PaymentCapturedData {
            payment_id: receipt.payment_id,
            transaction_id: receipt.transaction_id.clone(),
            status: receipt.status,
            amount: receipt.amount,
            captured_at: at,
        })
    }

    pub fn payment_failed(kind: ErrorKind, reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        CheckoutEvent::PaymentFailed(PaymentFailedData {
            kind,
            reason: reason.into(),
            failed_at: at,
        })
    }

    pub fn cart_cleared(at: DateTime<Utc>) -> Self {
        CheckoutEvent::CartCleared(CartClearedData { cleared_at: at })
    }

    pub fn checkout_completed(total_amount: Money, at: DateTime<Utc>) -> Self {
        CheckoutEvent::CheckoutCompleted(CheckoutCompletedData {
            total_amount,
            completed_at: at,
        })
    }

    pub fn checkout_failed(
        step: CheckoutStep,
        kind: ErrorKind,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        CheckoutEvent::CheckoutFailed(CheckoutFailedData {
            step,
            kind,
            reason: reason.into(),
            failed_at: at,
        })
    }

    pub fn deduction_reversed(item_id: ItemId, quantity: u32, at: DateTime<Utc>) -> Self {
        CheckoutEvent::DeductionReversed(DeductionReversedData {
            item_id,
            quantity,
            reversed_at: at,
        })
    }

    pub fn reversal_failed(
        item_id: ItemId,
        quantity: u32,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        CheckoutEvent::ReversalFailed(ReversalFailedData {
            item_id,
            quantity,
            reason: reason.into(),
            failed_at: at,
        })
    }

    pub fn checkout_reconciled(order_cancelled: bool, at: DateTime<Utc>) -> Self {
        CheckoutEvent::CheckoutReconciled(CheckoutReconciledData {
            order_cancelled,
            reconciled_at: at,
        })
    }
}
