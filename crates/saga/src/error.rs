//! Checkout error types.

use std::time::Duration;

use common::{CheckoutId, ErrorKind, ItemId, UserId};
use domain::DomainError;
use event_store::EventStoreError;
use inventory::InventoryError;
use payments::PaymentError;
use thiserror::Error;

use crate::state::SagaState;

/// Errors raised while checking out or reconciling a checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Cart is empty for user {0}")]
    EmptyCart(UserId),

    #[error("Invalid cart line: {0}")]
    InvalidCartLine(String),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// A downstream call did not answer within the configured timeout.
    #[error("{service} did not respond within {timeout:?}")]
    ServiceUnavailable {
        service: &'static str,
        timeout: Duration,
    },

    #[error("Checkout record could not be published: {0}")]
    PublishFailed(String),

    #[error("Cart store unavailable: {0}")]
    CartUnavailable(String),

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Checkout not found: {0}")]
    CheckoutNotFound(CheckoutId),

    #[error("Checkout {checkout_id} is {state} and has nothing to reconcile")]
    NotReconcilable {
        checkout_id: CheckoutId,
        state: SagaState,
    },

    #[error("Checkout {0} never published a record")]
    NothingToRedeliver(CheckoutId),

    #[error("Reconciliation for checkout {0} is already running")]
    ReconciliationInProgress(CheckoutId),

    /// Some deductions could not be returned; they stay outstanding on the saga.
    #[error("Checkout {checkout_id} could not release stock for: {}", join(.failed))]
    ReconciliationIncomplete {
        checkout_id: CheckoutId,
        failed: Vec<ItemId>,
    },
}

fn join(items: &[ItemId]) -> String {
    items
        .iter()
        .map(ItemId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl CheckoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::EmptyCart(_) => ErrorKind::EmptyCart,
            CheckoutError::InvalidCartLine(_) => ErrorKind::InvalidArgument,
            CheckoutError::Inventory(e) => e.kind(),
            CheckoutError::Payment(e) => e.kind(),
            CheckoutError::ServiceUnavailable { .. }
            | CheckoutError::PublishFailed(_)
            | CheckoutError::CartUnavailable(_) => ErrorKind::ServiceUnavailable,
            CheckoutError::EventStore(e) => e.kind(),
            CheckoutError::Domain(e) => e.kind(),
            CheckoutError::CheckoutNotFound(_) => ErrorKind::NotFound,
            CheckoutError::NotReconcilable { .. } | CheckoutError::NothingToRedeliver(_) => {
                ErrorKind::InvalidState
            }
            CheckoutError::ReconciliationInProgress(_) => ErrorKind::Conflict,
            CheckoutError::ReconciliationIncomplete { .. } => ErrorKind::CompensationFailed,
        }
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_errors_keep_their_kind() {
        let err = CheckoutError::from(InventoryError::InsufficientStock {
            item_id: "Y".into(),
            requested: 1,
            available: 0,
        });
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);

        let err = CheckoutError::from(PaymentError::CardExpired {
            expiry: "01/20".into(),
        });
        assert_eq!(err.kind(), ErrorKind::CardExpired);
        assert_eq!(err.to_string(), "Card has expired: 01/20");
    }

    #[test]
    fn timeouts_are_service_unavailable() {
        let err = CheckoutError::ServiceUnavailable {
            service: "inventory",
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(err.to_string(), "inventory did not respond within 250ms");
    }
}
