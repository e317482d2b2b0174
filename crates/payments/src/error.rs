use common::{ErrorKind, Money, PaymentId};
use thiserror::Error;

use crate::PaymentStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("Invalid payment details: {0}")]
    InvalidPaymentDetails(String),

    #[error("Card has expired: {expiry}")]
    CardExpired { expiry: String },

    #[error("Payment amount must be greater than 0, got {0}")]
    InvalidAmount(Money),

    #[error("Payment not found: {0}")]
    NotFound(PaymentId),

    #[error("No payment with transaction id {0}")]
    UnknownTransaction(String),

    /// The payment's current status does not allow the requested action.
    #[error("{reason} (payment {payment_id} is {status})")]
    InvalidState {
        payment_id: PaymentId,
        status: PaymentStatus,
        reason: &'static str,
    },

    #[error("Payment service unavailable: {0}")]
    Unavailable(String),
}

impl PaymentError {
    pub(crate) fn details(message: impl Into<String>) -> Self {
        PaymentError::InvalidPaymentDetails(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::InvalidPaymentDetails(_) => ErrorKind::InvalidPaymentDetails,
            PaymentError::CardExpired { .. } => ErrorKind::CardExpired,
            PaymentError::InvalidAmount(_) => ErrorKind::InvalidArgument,
            PaymentError::NotFound(_) | PaymentError::UnknownTransaction(_) => ErrorKind::NotFound,
            PaymentError::InvalidState { .. } => ErrorKind::InvalidState,
            PaymentError::Unavailable(_) => ErrorKind::ServiceUnavailable,
        }
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
