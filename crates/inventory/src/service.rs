//! The ledger operations other services call.

use std::sync::Arc;

use async_trait::async_trait;
use common::ItemId;

use crate::{Availability, Result};

/// Stock operations used by checkout and order compensation.
///
/// Callers bound each call with their own timeout; an implementation backed by
/// a remote ledger reports transport failures as
/// [`InventoryError::Unavailable`](crate::InventoryError::Unavailable).
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Reports whether `quantity` units are currently in stock. Never mutates.
    async fn check_availability(&self, item_id: &ItemId, quantity: i64) -> Result<Availability>;

    /// Atomically removes `quantity` units, returning what remains.
    ///
    /// Fails without side effects if the stock does not cover the request.
    async fn deduct(&self, item_id: &ItemId, quantity: i64) -> Result<i64>;

    /// Atomically returns `quantity` units to stock, returning the new level.
    async fn restore(&self, item_id: &ItemId, quantity: i64) -> Result<i64>;
}

#[async_trait]
impl<T: InventoryService + ?Sized> InventoryService for Arc<T> {
    async fn check_availability(&self, item_id: &ItemId, quantity: i64) -> Result<Availability> {
        (**self).check_availability(item_id, quantity).await
    }

    async fn deduct(&self, item_id: &ItemId, quantity: i64) -> Result<i64> {
        (**self).deduct(item_id, quantity).await
    }

    async fn restore(&self, item_id: &ItemId, quantity: i64) -> Result<i64> {
        (**self).restore(item_id, quantity).await
    }
}
