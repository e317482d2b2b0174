//! Order lifecycle manager.
//!
//! Orders are materialized from checkout records arriving on a channel and
//! then move through `PENDING → PROCESSING → SHIPPING → DELIVERED`, or to
//! `CANCELLED`, which returns every line to the inventory ledger. Orders are
//! event-sourced, and so are the compensation results, so failed restores can
//! be retried.

pub mod aggregate;
pub mod command;
pub mod error;
pub mod listener;
pub mod order;

pub use aggregate::{Aggregate, DomainEvent};
pub use command::{CommandHandler, CommandResult};
pub use error::DomainError;
pub use listener::{ListenerStats, RecordListener};
pub use order::{
    CompensationConfig, CompensationReport, FailedRestore, Order, OrderError, OrderEvent,
    OrderFilter, OrderService, OrderStatus, OrderSummary, OrderUpdate,
};
