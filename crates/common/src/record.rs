//! The checkout record handed from checkout to order creation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CheckoutId, ItemId, Money, OrderId, UserId};

/// Payment method selected at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    MobilePayment,
    BankTransfer,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::DebitCard => "DEBIT_CARD",
            PaymentMethod::MobilePayment => "MOBILE_PAYMENT",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::Cash => "CASH",
        }
    }

    /// Card methods carry an expiry date that is checked at checkout.
    pub fn is_card(&self) -> bool {
        matches!(self, PaymentMethod::CreditCard | PaymentMethod::DebitCard)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREDIT_CARD" => Ok(PaymentMethod::CreditCard),
            "DEBIT_CARD" => Ok(PaymentMethod::DebitCard),
            "MOBILE_PAYMENT" => Ok(PaymentMethod::MobilePayment),
            "BANK_TRANSFER" => Ok(PaymentMethod::BankTransfer),
            "CASH" => Ok(PaymentMethod::Cash),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

/// Snapshot of one purchased line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetail {
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub unit_price: Money,
    pub quantity: u32,
    pub subtotal: Money,
}

impl ItemDetail {
    pub fn new(
        name: Option<String>,
        image_url: Option<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            name,
            image_url,
            unit_price,
            quantity,
            subtotal: unit_price.times(quantity),
        }
    }
}

/// Everything order creation needs, captured at checkout time.
///
/// The record is self-contained: the cart is cleared right after checkout, so
/// the consumer must never need to look anything up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRecord {
    /// Correlation id of the checkout saga that produced this record.
    pub checkout_id: CheckoutId,
    /// Order reference handed to the payment processor; the order is created under it.
    pub order_id: OrderId,
    pub user_id: UserId,
    pub payment_method: PaymentMethod,
    pub total_price: Money,
    pub items: BTreeMap<ItemId, ItemDetail>,
    pub placed_at: DateTime<Utc>,
}

impl CheckoutRecord {
    /// Channel key; used for tracing, not for ordering.
    pub fn routing_key(&self) -> String {
        self.user_id.to_string()
    }

    pub fn total_quantity(&self) -> u32 {
        self.items.values().map(|detail| detail.quantity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_method_wire_names() {
        let json = serde_json::to_string(&PaymentMethod::MobilePayment).unwrap();
        assert_eq!(json, "\"MOBILE_PAYMENT\"");
        assert_eq!("bank_transfer".parse::<PaymentMethod>().unwrap(), PaymentMethod::BankTransfer);
        assert!("CHEQUE".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn item_detail_computes_subtotal() {
        let detail = ItemDetail::new(Some("Milk".into()), None, Money::from_cents(249), 4);
        assert_eq!(detail.subtotal, Money::from_cents(996));
    }

    #[test]
    fn record_is_keyed_by_user() {
        let user_id = UserId::new();
        let mut items = BTreeMap::new();
        items.insert(ItemId::from("X"), ItemDetail::new(None, None, Money::from_units(10), 2));
        items.insert(ItemId::from("Y"), ItemDetail::new(None, None, Money::from_units(1), 1));

        let record = CheckoutRecord {
            checkout_id: CheckoutId::new(),
            order_id: OrderId::new(),
            user_id,
            payment_method: PaymentMethod::Cash,
            total_price: Money::from_units(21),
            items,
            placed_at: Utc::now(),
        };

        assert_eq!(record.routing_key(), user_id.to_string());
        assert_eq!(record.total_quantity(), 3);
    }
}
