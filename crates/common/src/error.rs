//! Error classification shared by every service.

use serde::{Deserialize, Serialize};

/// The `kind` reported alongside every error message.
///
/// Each crate's error enum maps its variants onto one of these, so callers can
/// branch on the kind without depending on the crate that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    InsufficientStock,
    InvalidPaymentDetails,
    CardExpired,
    EmptyCart,
    InvalidTransition,
    TerminalOrder,
    InvalidState,
    AlreadyDelivered,
    AlreadyCancelled,
    ServiceUnavailable,
    Forbidden,
    /// Optimistic concurrency check failed; the caller may retry.
    Conflict,
    /// A status change committed but stock could not be fully restored.
    CompensationFailed,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::InsufficientStock => "InsufficientStock",
            ErrorKind::InvalidPaymentDetails => "InvalidPaymentDetails",
            ErrorKind::CardExpired => "CardExpired",
            ErrorKind::EmptyCart => "EmptyCart",
            ErrorKind::InvalidTransition => "InvalidTransition",
            ErrorKind::TerminalOrder => "TerminalOrder",
            ErrorKind::InvalidState => "InvalidState",
            ErrorKind::AlreadyDelivered => "AlreadyDelivered",
            ErrorKind::AlreadyCancelled => "AlreadyCancelled",
            ErrorKind::ServiceUnavailable => "ServiceUnavailable",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::CompensationFailed => "CompensationFailed",
            ErrorKind::Internal => "Internal",
        }
    }

    /// Validation kinds are raised before any state is mutated.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidArgument
                | ErrorKind::InvalidPaymentDetails
                | ErrorKind::CardExpired
                | ErrorKind::EmptyCart
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
