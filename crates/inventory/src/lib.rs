//! Inventory ledger.
//!
//! Holds the available quantity of every catalog item and exposes the three
//! operations the checkout saga and order compensation rely on:
//! availability check, deduct and restore. Each item's quantity is a single
//! atomic counter; deduction is a compare-and-decrement, so concurrent
//! checkouts can never overdraw stock.

pub mod error;
pub mod item;
pub mod ledger;
pub mod service;

pub use error::{InventoryError, Result};
pub use item::{Availability, InventoryItem};
pub use ledger::InventoryLedger;
pub use service::InventoryService;
