//! Domain error types.

use common::{ErrorKind, ItemId, OrderId};
use event_store::EventStoreError;
use thiserror::Error;

use crate::order::OrderError;

/// Errors surfaced by the order lifecycle manager.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The requester is neither the owner nor an admin.
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// The status change committed but some lines could not be returned to stock.
    #[error("Order {order_id} was updated but stock could not be restored for: {}", join(.failed))]
    CompensationIncomplete {
        order_id: OrderId,
        failed: Vec<ItemId>,
    },

    /// Another task is already restoring stock for this order.
    #[error("Compensation for order {0} is already running")]
    CompensationInProgress(OrderId),
}

fn join(items: &[ItemId]) -> String {
    items
        .iter()
        .map(ItemId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::EventStore(e) => e.kind(),
            DomainError::Order(e) => e.kind(),
            DomainError::OrderNotFound(_) => ErrorKind::NotFound,
            DomainError::Forbidden(_) => ErrorKind::Forbidden,
            DomainError::CompensationIncomplete { .. } => ErrorKind::CompensationFailed,
            DomainError::CompensationInProgress(_) => ErrorKind::Conflict,
        }
    }
}
