//! Shopping carts as checkout sees them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use common::{ItemDetail, ItemId, Money, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{CheckoutError, Result};

/// One cart line. The unit price is the one captured when the item was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: ItemId,
    pub quantity: u32,
    pub unit_price: Money,
    pub name: Option<String>,
    pub image_url: Option<String>,
}

impl CartLine {
    pub fn new(item_id: impl Into<ItemId>, quantity: u32, unit_price: Money) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
            unit_price,
            name: None,
            image_url: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn subtotal(&self) -> Money {
        self.unit_price.times(self.quantity)
    }

    fn validate(&self) -> Result<()> {
        if self.item_id.as_str().trim().is_empty() {
            return Err(CheckoutError::InvalidCartLine(
                "item id must not be blank".to_string(),
            ));
        }
        if self.quantity == 0 {
            return Err(CheckoutError::InvalidCartLine(format!(
                "quantity for {} must be at least 1",
                self.item_id
            )));
        }
        if self.unit_price.is_negative() {
            return Err(CheckoutError::InvalidCartLine(format!(
                "unit price for {} must not be negative",
                self.item_id
            )));
        }
        Ok(())
    }
}

/// A user's cart. Lines keep the order they were first added in, and item
/// ids are unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub user_id: UserId,
    pub lines: Vec<CartLine>,
}

impl Cart {
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            lines: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, item_id: &ItemId) -> Option<&CartLine> {
        self.lines.iter().find(|line| &line.item_id == item_id)
    }

    /// Sum of the captured unit prices times quantities.
    pub fn total(&self) -> Money {
        self.lines.iter().map(CartLine::subtotal).sum()
    }

    /// The per-item detail map carried by a checkout record.
    pub fn item_details(&self) -> BTreeMap<ItemId, ItemDetail> {
        self.lines
            .iter()
            .map(|line| {
                (
                    line.item_id.clone(),
                    ItemDetail::new(
                        line.name.clone(),
                        line.image_url.clone(),
                        line.unit_price,
                        line.quantity,
                    ),
                )
            })
            .collect()
    }

    /// Adds a line, merging it into an existing line for the same item.
    ///
    /// A merge increments the quantity and refreshes the price snapshot;
    /// name and image are only replaced when the new line carries them.
    /// The cart is left untouched when the merged quantity or the cart total
    /// would overflow.
    fn add(&mut self, line: CartLine) -> Result<()> {
        let merged = match self.line(&line.item_id) {
            Some(existing) => {
                let quantity = existing
                    .quantity
                    .checked_add(line.quantity)
                    .ok_or_else(|| {
                        CheckoutError::InvalidCartLine(format!(
                            "quantity for {} is too large",
                            line.item_id
                        ))
                    })?;
                CartLine {
                    quantity,
                    name: line.name.or_else(|| existing.name.clone()),
                    image_url: line.image_url.or_else(|| existing.image_url.clone()),
                    ..line
                }
            }
            None => line,
        };

        self.lines
            .iter()
            .filter(|l| l.item_id != merged.item_id)
            .chain(std::iter::once(&merged))
            .try_fold(Money::zero(), |total, l| {
                l.unit_price
                    .checked_times(l.quantity)
                    .and_then(|subtotal| total.checked_add(subtotal))
            })
            .ok_or_else(|| {
                CheckoutError::InvalidCartLine(format!(
                    "cart total with {} is too large",
                    merged.item_id
                ))
            })?;

        match self.lines.iter_mut().find(|l| l.item_id == merged.item_id) {
            Some(existing) => *existing = merged,
            None => self.lines.push(merged),
        }
        Ok(())
    }
}

/// The cart aggregator checkout reads from.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Returns the user's cart; an unknown user has an empty cart.
    async fn get_cart(&self, user_id: UserId) -> Result<Cart>;

    async fn clear(&self, user_id: UserId) -> Result<()>;
}

#[async_trait]
impl<T: CartStore + ?Sized> CartStore for Arc<T> {
    async fn get_cart(&self, user_id: UserId) -> Result<Cart> {
        (**self).get_cart(user_id).await
    }

    async fn clear(&self, user_id: UserId) -> Result<()> {
        (**self).clear(user_id).await
    }
}

/// Carts held in memory, created lazily on first add.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartStore {
    carts: Arc<RwLock<HashMap<UserId, Cart>>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[tracing::instrument(skip(self, line), fields(item_id = %line.item_id, quantity = line.quantity))]
    pub async fn add_item(&self, user_id: UserId, line: CartLine) -> Result<Cart> {
        line.validate()?;
        let mut carts = self.carts.write().await;
        let cart = carts
            .entry(user_id)
            .or_insert_with(|| Cart::empty(user_id));
        cart.add(line)?;
        tracing::debug!(lines = cart.lines.len(), "cart updated");
        Ok(cart.clone())
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn get_cart(&self, user_id: UserId) -> Result<Cart> {
        Ok(self
            .carts
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| Cart::empty(user_id)))
    }

    async fn clear(&self, user_id: UserId) -> Result<()> {
        self.carts.write().await.remove(&user_id);
        Ok(())
    }
}
