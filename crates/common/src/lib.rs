//! Shared building blocks for the order fulfillment pipeline.
//!
//! Every service crate speaks in these types: identifiers, [`Money`], the
//! requester identity handed down by the gateway, the [`ErrorKind`]
//! classification used in error payloads, and the [`CheckoutRecord`] contract
//! that flows from checkout to order creation.

pub mod access;
pub mod clock;
pub mod error;
pub mod money;
pub mod record;
pub mod retry;
pub mod types;

pub use access::{Requester, Role};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::ErrorKind;
pub use money::Money;
pub use record::{CheckoutRecord, ItemDetail, PaymentMethod};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use types::{AggregateId, CheckoutId, ItemId, OrderId, PaymentId, UserId};
