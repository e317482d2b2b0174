//! Shared application state.

use std::path::Path;
use std::sync::Arc;

use common::CheckoutRecord;
use domain::{CompensationConfig, OrderService, RecordListener};
use event_store::EventStore;
use inventory::{InventoryItem, InventoryLedger};
use payments::PaymentProcessor;
use saga::{ChannelPublisher, CheckoutCoordinator, InMemoryCartStore, Reconciler};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::SeedError;

pub type Checkout<S> =
    CheckoutCoordinator<S, InMemoryCartStore, InventoryLedger, PaymentProcessor, ChannelPublisher>;

/// Services every handler can reach.
pub struct AppState<S: EventStore> {
    pub ledger: InventoryLedger,
    pub carts: InMemoryCartStore,
    pub payments: PaymentProcessor,
    pub orders: Arc<OrderService<S, InventoryLedger>>,
    pub checkout: Checkout<S>,
    pub reconciler: Reconciler<S, InventoryLedger, ChannelPublisher>,
}

impl<S: EventStore> AppState<S> {
    /// Loads catalog entries from a JSON array of items.
    pub async fn seed_inventory(&self, path: &Path) -> Result<usize, SeedError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let items: Vec<InventoryItem> = serde_json::from_str(&raw)?;
        let count = self.ledger.seed(items).await?;
        tracing::info!(count, path = %path.display(), "inventory seeded");
        Ok(count)
    }
}

/// Wires the in-process services around `store`.
///
/// Returns the listener and the receiving end of the checkout record channel
/// separately; the caller decides where the listener runs.
pub fn create_default_state<S: EventStore + Clone + 'static>(
    store: S,
    config: &Config,
) -> (
    Arc<AppState<S>>,
    RecordListener<S, InventoryLedger>,
    mpsc::Receiver<CheckoutRecord>,
) {
    let checkout_config = config.checkout();
    let ledger = InventoryLedger::new();
    let carts = InMemoryCartStore::new();
    let payments = PaymentProcessor::new();
    let (publisher, records) = ChannelPublisher::channel(config.channel_capacity);

    let orders = Arc::new(
        OrderService::new(store.clone(), ledger.clone()).with_compensation(CompensationConfig {
            timeout: config.rpc_timeout,
            retry: checkout_config.retry.clone(),
        }),
    );

    let checkout = CheckoutCoordinator::new(
        store.clone(),
        carts.clone(),
        ledger.clone(),
        payments.clone(),
        publisher.clone(),
    )
    .with_config(checkout_config.clone());

    let reconciler = Reconciler::new(store, ledger.clone(), orders.clone(), publisher)
        .with_config(checkout_config);

    let listener = RecordListener::new(orders.clone());

    let state = Arc::new(AppState {
        ledger,
        carts,
        payments,
        orders,
        checkout,
        reconciler,
    });

    (state, listener, records)
}
