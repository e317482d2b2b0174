//! Checkout saga.
//!
//! Checkout spans three services that share no transaction: the inventory
//! ledger, the order lifecycle manager and the payment processor. For one
//! user's cart the coordinator:
//! 1. Rejects an empty cart and validates the payment payload
//! 2. Deducts every line from stock, in cart order
//! 3. Publishes the checkout record that becomes the order
//! 4. Captures payment
//! 5. Clears the cart
//!
//! Each step commits on its own and is journaled under the checkout id. A
//! checkout that fails after deducting stock is not rolled back inline; the
//! [`Reconciler`] finds it in the journal and gives the stock back.

pub mod aggregate;
pub mod cart;
pub mod channel;
pub mod coordinator;
pub mod error;
pub mod events;
mod journal;
pub mod reconciliation;
pub mod state;

pub use aggregate::{CheckoutSaga, SagaFailure};
pub use cart::{Cart, CartLine, CartStore, InMemoryCartStore};
pub use channel::{ChannelPublisher, CheckoutPublisher};
pub use coordinator::{CheckoutConfig, CheckoutCoordinator, CheckoutRequest, CheckoutResponse};
pub use error::{CheckoutError, Result};
pub use events::{CheckoutEvent, CheckoutStep, SagaLine};
pub use reconciliation::{ReconciliationReport, Reconciler};
pub use state::SagaState;
