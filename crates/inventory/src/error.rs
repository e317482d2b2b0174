use common::{ErrorKind, ItemId};
use thiserror::Error;

/// Errors raised by the inventory ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("Invalid quantity {quantity}: must be greater than 0")]
    InvalidQuantity { quantity: i64 },

    #[error("Invalid item: {0}")]
    InvalidItem(String),

    /// The request exceeds current stock; nothing was deducted.
    #[error("Not enough quantity available for {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: i64,
        available: i64,
    },

    /// The ledger could not be reached or did not answer in time.
    #[error("Inventory service unavailable: {0}")]
    Unavailable(String),
}

impl InventoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InventoryError::ItemNotFound(_) => ErrorKind::NotFound,
            InventoryError::InvalidQuantity { .. } | InventoryError::InvalidItem(_) => {
                ErrorKind::InvalidArgument
            }
            InventoryError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            InventoryError::Unavailable(_) => ErrorKind::ServiceUnavailable,
        }
    }

    /// Only transport failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, InventoryError::Unavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, InventoryError>;
