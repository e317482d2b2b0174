//! Payment processor.
//!
//! Validates the method-specific payload submitted at checkout and records
//! a payment that is captured synchronously. There is no gateway behind the
//! processor: a valid payload always yields a `COMPLETED` payment.

pub mod error;
pub mod method;
pub mod payment;
pub mod processor;

pub use error::{PaymentError, Result};
pub use method::{
    BankTransferDetails, CardDetails, CashDetails, MobileDetails, PaymentDetails, PaymentPayload,
    validate_payment,
};
pub use payment::{Payment, PaymentStatus};
pub use processor::{PaymentProcessor, PaymentReceipt, PaymentRequest, PaymentService};
