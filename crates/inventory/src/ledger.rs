use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use common::ItemId;
use tokio::sync::RwLock;

use crate::{Availability, InventoryError, InventoryItem, InventoryService, Result};

/// Catalog metadata plus a shared handle to the item's stock counter.
///
/// Metadata updates replace the slot; the counter is carried over so that
/// in-flight deductions against the old slot still land on the same stock.
#[derive(Debug)]
struct Slot {
    item: InventoryItem,
    quantity: Arc<AtomicI64>,
}

impl Slot {
    fn snapshot(&self) -> InventoryItem {
        InventoryItem {
            available_quantity: self.quantity.load(Ordering::Acquire),
            ..self.item.clone()
        }
    }
}

/// In-process inventory ledger.
///
/// The item map is only write-locked by catalog upserts and removals; stock
/// movements take a read lock to find the counter and then operate on the
/// atomic directly.
#[derive(Debug, Clone, Default)]
pub struct InventoryLedger {
    slots: Arc<RwLock<HashMap<ItemId, Arc<Slot>>>>,
}

fn ensure_positive(quantity: i64) -> Result<()> {
    if quantity <= 0 {
        return Err(InventoryError::InvalidQuantity { quantity });
    }
    Ok(())
}

impl InventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a catalog entry, setting its stock to the given quantity.
    #[tracing::instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn upsert_item(&self, item: InventoryItem) -> Result<InventoryItem> {
        item.validate()?;
        let mut slots = self.slots.write().await;

        let quantity = match slots.get(&item.id) {
            Some(existing) => {
                existing
                    .quantity
                    .store(item.available_quantity, Ordering::Release);
                existing.quantity.clone()
            }
            None => Arc::new(AtomicI64::new(item.available_quantity)),
        };
        let slot = Arc::new(Slot {
            item: item.clone(),
            quantity,
        });
        slots.insert(item.id.clone(), slot);

        tracing::info!(quantity = item.available_quantity, "inventory item stored");
        Ok(item)
    }

    /// Removes a catalog entry, returning its last snapshot.
    pub async fn remove_item(&self, item_id: &ItemId) -> Result<InventoryItem> {
        self.slots
            .write()
            .await
            .remove(item_id)
            .map(|slot| slot.snapshot())
            .ok_or_else(|| InventoryError::ItemNotFound(item_id.clone()))
    }

    pub async fn get_item(&self, item_id: &ItemId) -> Result<InventoryItem> {
        Ok(self.slot(item_id).await?.snapshot())
    }

    /// All items, sorted by id.
    pub async fn list_items(&self) -> Vec<InventoryItem> {
        let slots = self.slots.read().await;
        let mut items: Vec<_> = slots.values().map(|slot| slot.snapshot()).collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }

    /// Current stock of an item.
    pub async fn quantity_of(&self, item_id: &ItemId) -> Result<i64> {
        Ok(self.slot(item_id).await?.quantity.load(Ordering::Acquire))
    }

    async fn slot(&self, item_id: &ItemId) -> Result<Arc<Slot>> {
        self.slots
            .read()
            .await
            .get(item_id)
            .cloned()
            .ok_or_else(|| InventoryError::ItemNotFound(item_id.clone()))
    }
}

#[async_trait]
impl InventoryService for InventoryLedger {
    async fn check_availability(&self, item_id: &ItemId, quantity: i64) -> Result<Availability> {
        let slot = self.slot(item_id).await?;
        let available_quantity = slot.quantity.load(Ordering::Acquire);

        Ok(Availability {
            item_id: item_id.clone(),
            available: available_quantity > 0 && available_quantity >= quantity,
            available_quantity,
            unit_price: slot.item.unit_price,
            name: slot.item.name.clone(),
            image_url: slot.item.image_url.clone(),
        })
    }

    #[tracing::instrument(skip(self, item_id), fields(item_id = %item_id))]
    async fn deduct(&self, item_id: &ItemId, quantity: i64) -> Result<i64> {
        ensure_positive(quantity)?;
        let slot = self.slot(item_id).await?;

        let outcome = slot
            .quantity
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current >= quantity).then(|| current - quantity)
            });

        match outcome {
            Ok(previous) => {
                let remaining = previous - quantity;
                metrics::counter!("inventory_deductions_total").increment(1);
                tracing::info!(quantity, remaining, "stock deducted");
                Ok(remaining)
            }
            Err(available) => {
                metrics::counter!("inventory_insufficient_stock_total").increment(1);
                tracing::warn!(requested = quantity, available, "insufficient stock");
                Err(InventoryError::InsufficientStock {
                    item_id: item_id.clone(),
                    requested: quantity,
                    available,
                })
            }
        }
    }

    #[tracing::instrument(skip(self, item_id), fields(item_id = %item_id))]
    async fn restore(&self, item_id: &ItemId, quantity: i64) -> Result<i64> {
        ensure_positive(quantity)?;
        let slot = self.slot(item_id).await?;

        let previous = slot
            .quantity
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_add(quantity)
            })
            .map_err(|_| InventoryError::InvalidQuantity { quantity })?;

        let level = previous + quantity;
        metrics::counter!("inventory_restores_total").increment(1);
        tracing::info!(quantity, level, "stock restored");
        Ok(level)
    }
}

impl InventoryLedger {
    /// Seeds the ledger from a list of items, e.g. at startup.
    pub async fn seed(&self, items: impl IntoIterator<Item = InventoryItem>) -> Result<usize> {
        let mut count = 0;
        for item in items {
            self.upsert_item(item).await?;
            count += 1;
        }
        Ok(count)
    }
}
