//! HTTP front end for the fulfillment pipeline.
//!
//! Callers are identified by gateway headers (see [`identity`]). Handlers
//! map every failure to a `{"error", "kind"}` body with a status derived
//! from the kind.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use state::{AppState, create_default_state};

/// Builds the router over `state`, with `/metrics` served from `metrics_handle`.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route(
            "/inventory/items/{id}/availability",
            get(routes::inventory::availability::<S>),
        )
        .route(
            "/cart",
            get(routes::cart::get::<S>).delete(routes::cart::clear::<S>),
        )
        .route("/cart/items", post(routes::cart::add_item::<S>))
        .route("/checkout", post(routes::checkouts::checkout::<S>))
        .route(
            "/checkouts/reconciliation",
            get(routes::checkouts::pending::<S>),
        )
        .route("/checkouts/{id}", get(routes::checkouts::get::<S>))
        .route(
            "/checkouts/{id}/reconcile",
            post(routes::checkouts::reconcile::<S>),
        )
        .route(
            "/checkouts/{id}/redeliver",
            post(routes::checkouts::redeliver::<S>),
        )
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/all", get(routes::orders::list_all::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/status", put(routes::orders::update_status::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route(
            "/orders/{id}/compensation/retry",
            post(routes::orders::retry_compensation::<S>),
        )
        .route("/payments", get(routes::payments::list::<S>))
        .route("/payments/{id}", get(routes::payments::get::<S>))
        .route("/payments/{id}/refund", post(routes::payments::refund::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
