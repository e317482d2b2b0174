//! Order aggregate and related types.

mod aggregate;
mod events;
mod service;
mod state;

pub use aggregate::{Order, OrderSummary};
pub use events::{
    OrderCancelledData, OrderEvent, OrderPlacedData, StatusChangedData, StockRestoreFailedData,
    StockRestoredData,
};
pub use service::{
    CompensationConfig, CompensationReport, FailedRestore, OrderFilter, OrderService, OrderUpdate,
};
pub use state::OrderStatus;

use common::{ErrorKind, OrderId};
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// An order already exists under this id.
    #[error("Order {0} has already been placed")]
    AlreadyPlaced(OrderId),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order is in terminal status {status} and cannot change")]
    TerminalOrder { status: OrderStatus },

    #[error("Order has already been delivered and cannot be cancelled")]
    AlreadyDelivered,

    #[error("Order has already been cancelled")]
    AlreadyCancelled,

    /// Stock compensation only applies to cancelled orders.
    #[error("Order is {status}, not CANCELLED; nothing to restore")]
    NotCancelled { status: OrderStatus },
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::AlreadyPlaced(_) => ErrorKind::Conflict,
            OrderError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            OrderError::TerminalOrder { .. } => ErrorKind::TerminalOrder,
            OrderError::AlreadyDelivered => ErrorKind::AlreadyDelivered,
            OrderError::AlreadyCancelled => ErrorKind::AlreadyCancelled,
            OrderError::NotCancelled { .. } => ErrorKind::InvalidState,
        }
    }
}
