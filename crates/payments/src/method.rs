//! Method-specific payment payloads and their validation.
//!
//! Checkout submits one optional block per method; only the block matching the
//! selected [`PaymentMethod`] is read. Shape checks and the card expiry check
//! both run before anything is mutated.

use chrono::{Datelike, NaiveDate};
use common::PaymentMethod;
use serde::{Deserialize, Serialize};

use crate::{PaymentError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    pub card_number: String,
    pub cardholder_name: String,
    /// `MM/YY`.
    pub expiry_date: String,
    pub cvv: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileDetails {
    pub phone_number: String,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankTransferDetails {
    pub account_number: String,
    pub routing_number: String,
    pub bank_name: String,
    pub account_holder: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashDetails {
    pub confirmed: Option<bool>,
    pub notes: Option<String>,
}

impl CashDetails {
    pub fn confirmed() -> Self {
        Self {
            confirmed: Some(true),
            notes: None,
        }
    }
}

/// The payload blocks submitted alongside a payment method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_card: Option<CardDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debit_card: Option<CardDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_payment: Option<MobileDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_transfer: Option<BankTransferDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash: Option<CashDetails>,
}

impl PaymentPayload {
    pub fn credit_card(details: CardDetails) -> Self {
        Self {
            credit_card: Some(details),
            ..Self::default()
        }
    }

    pub fn debit_card(details: CardDetails) -> Self {
        Self {
            debit_card: Some(details),
            ..Self::default()
        }
    }

    pub fn mobile(details: MobileDetails) -> Self {
        Self {
            mobile_payment: Some(details),
            ..Self::default()
        }
    }

    pub fn bank_transfer(details: BankTransferDetails) -> Self {
        Self {
            bank_transfer: Some(details),
            ..Self::default()
        }
    }

    pub fn cash(details: CashDetails) -> Self {
        Self {
            cash: Some(details),
            ..Self::default()
        }
    }
}

/// The validated block for the selected method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentDetails {
    Card(CardDetails),
    Mobile(MobileDetails),
    BankTransfer(BankTransferDetails),
    Cash(CashDetails),
}

impl PaymentDetails {
    /// Picks the block for `method` and checks its shape.
    ///
    /// A missing cash block counts as a confirmed cash payment.
    pub fn from_payload(method: PaymentMethod, payload: &PaymentPayload) -> Result<Self> {
        match method {
            PaymentMethod::CreditCard => {
                let card = required(&payload.credit_card, "Credit card details are required")?;
                validate_card(card)?;
                Ok(PaymentDetails::Card(card.clone()))
            }
            PaymentMethod::DebitCard => {
                let card = required(&payload.debit_card, "Debit card details are required")?;
                validate_card(card)?;
                Ok(PaymentDetails::Card(card.clone()))
            }
            PaymentMethod::MobilePayment => {
                let mobile =
                    required(&payload.mobile_payment, "Mobile payment details are required")?;
                validate_mobile(mobile)?;
                Ok(PaymentDetails::Mobile(mobile.clone()))
            }
            PaymentMethod::BankTransfer => {
                let bank =
                    required(&payload.bank_transfer, "Bank transfer details are required")?;
                validate_bank_transfer(bank)?;
                Ok(PaymentDetails::BankTransfer(bank.clone()))
            }
            PaymentMethod::Cash => {
                let cash = payload.cash.clone().unwrap_or_else(CashDetails::confirmed);
                if cash.confirmed != Some(true) {
                    return Err(PaymentError::details("Cash payment must be confirmed"));
                }
                Ok(PaymentDetails::Cash(cash))
            }
        }
    }

    /// Rejects cards whose expiry month lies before `today`'s month.
    pub fn check_expiry(&self, today: NaiveDate) -> Result<()> {
        let PaymentDetails::Card(card) = self else {
            return Ok(());
        };
        let (month, year) = parse_expiry(&card.expiry_date)?;
        if (year, month) < (today.year(), today.month()) {
            return Err(PaymentError::CardExpired {
                expiry: card.expiry_date.clone(),
            });
        }
        Ok(())
    }

    /// Log-safe description; never includes full account numbers.
    pub fn summary(&self) -> String {
        match self {
            PaymentDetails::Card(card) => format!("card ending {}", last_four(&card.card_number)),
            PaymentDetails::Mobile(mobile) => format!("mobile via {}", mobile.provider),
            PaymentDetails::BankTransfer(bank) => {
                format!("account ending {} at {}", last_four(&bank.account_number), bank.bank_name)
            }
            PaymentDetails::Cash(_) => "cash".to_string(),
        }
    }
}

/// Shape and expiry validation in one call, as checkout runs it.
pub fn validate_payment(
    method: PaymentMethod,
    payload: &PaymentPayload,
    today: NaiveDate,
) -> Result<PaymentDetails> {
    let details = PaymentDetails::from_payload(method, payload)?;
    details.check_expiry(today)?;
    Ok(details)
}

fn required<'a, T>(block: &'a Option<T>, message: &str) -> Result<&'a T> {
    block.as_ref().ok_or_else(|| PaymentError::details(message))
}

fn not_blank(value: &str, message: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PaymentError::details(message));
    }
    Ok(())
}

fn digits_between(value: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&value.len()) && value.bytes().all(|b| b.is_ascii_digit())
}

fn last_four(value: &str) -> &str {
    value.get(value.len().saturating_sub(4)..).unwrap_or(value)
}

fn validate_card(card: &CardDetails) -> Result<()> {
    not_blank(&card.card_number, "Card number is required")?;
    if !digits_between(&card.card_number, 13, 19) {
        return Err(PaymentError::details(
            "Card number must be between 13 and 19 digits",
        ));
    }
    not_blank(&card.cardholder_name, "Cardholder name is required")?;
    parse_expiry(&card.expiry_date)?;
    if !digits_between(&card.cvv, 3, 3) {
        return Err(PaymentError::details("CVV must be 3 digits"));
    }
    Ok(())
}

/// Parses `MM/YY` into (month, four-digit year).
fn parse_expiry(expiry: &str) -> Result<(u32, i32)> {
    let invalid = || PaymentError::details("Expiry date must be in MM/YY format");

    let (month, year) = expiry.split_once('/').ok_or_else(invalid)?;
    if !digits_between(month, 2, 2) || !digits_between(year, 2, 2) {
        return Err(invalid());
    }
    let month: u32 = month.parse().map_err(|_| invalid())?;
    let year: i32 = year.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok((month, 2000 + year))
}

fn validate_mobile(mobile: &MobileDetails) -> Result<()> {
    not_blank(&mobile.phone_number, "Phone number is required")?;
    let digits = mobile
        .phone_number
        .strip_prefix('+')
        .unwrap_or(&mobile.phone_number);
    if !digits_between(digits, 8, 15) || digits.starts_with('0') {
        return Err(PaymentError::details("Invalid phone number format"));
    }
    not_blank(&mobile.provider, "Provider is required")
}

fn validate_bank_transfer(bank: &BankTransferDetails) -> Result<()> {
    not_blank(&bank.account_number, "Bank account number is required")?;
    if !digits_between(&bank.account_number, 8, 17) {
        return Err(PaymentError::details(
            "Bank account number must be between 8 and 17 digits",
        ));
    }
    if !digits_between(&bank.routing_number, 9, 9) {
        return Err(PaymentError::details("Routing number must be exactly 9 digits"));
    }
    not_blank(&bank.bank_name, "Bank name is required")?;
    not_blank(&bank.account_holder, "Account holder name is required")
}
