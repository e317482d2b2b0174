use common::{ItemId, Money};
use serde::{Deserialize, Serialize};

use crate::{InventoryError, Result};

/// A catalog entry together with its available quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: ItemId,
    pub name: String,
    pub unit_price: Money,
    pub available_quantity: i64,
    pub category: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

impl InventoryItem {
    pub fn new(
        id: impl Into<ItemId>,
        name: impl Into<String>,
        unit_price: Money,
        available_quantity: i64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            unit_price,
            available_quantity,
            category: None,
            description: None,
            image_url: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(InventoryError::InvalidItem("id must not be blank".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(InventoryError::InvalidItem("name must not be blank".to_string()));
        }
        if self.unit_price.is_negative() {
            return Err(InventoryError::InvalidItem(format!(
                "unit price must not be negative, got {}",
                self.unit_price
            )));
        }
        if self.available_quantity < 0 {
            return Err(InventoryError::InvalidItem(format!(
                "available quantity must not be negative, got {}",
                self.available_quantity
            )));
        }
        Ok(())
    }
}

/// Answer to an availability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub item_id: ItemId,
    /// True when current stock covers the requested quantity.
    pub available: bool,
    pub available_quantity: i64,
    pub unit_price: Money,
    pub name: String,
    pub image_url: Option<String>,
}
