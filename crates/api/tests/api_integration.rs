//! Integration tests for the API server.

use std::sync::Arc;

use api::{AppState, Config};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{CheckoutRecord, Money, UserId};
use domain::RecordListener;
use event_store::InMemoryEventStore;
use inventory::{InventoryItem, InventoryLedger};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: Arc<AppState<InMemoryEventStore>>,
    listener: RecordListener<InMemoryEventStore, InventoryLedger>,
    records: mpsc::Receiver<CheckoutRecord>,
}

fn setup() -> TestApp {
    let (state, listener, records) =
        api::create_default_state(InMemoryEventStore::new(), &Config::default());
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder()
        .handle();
    TestApp {
        router: api::create_app(state.clone(), metrics_handle),
        state,
        listener,
        records,
    }
}

fn admin() -> (UserId, &'static str) {
    (UserId::new(), "ADMIN")
}

fn user() -> (UserId, &'static str) {
    (UserId::new(), "USER")
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    who: Option<(UserId, &str)>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some((user_id, role)) = who {
        request = request
            .header("x-user-id", user_id.to_string())
            .header("x-user-role", role);
    }
    let body = match body {
        Some(value) => {
            request = request.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&value).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn seed_item(app: &TestApp, id: &str, price_cents: i64, quantity: i64) {
    app.state
        .ledger
        .upsert_item(InventoryItem::new(id, "Widget", Money::from_cents(price_cents), quantity))
        .await
        .unwrap();
}

async fn stock_of(app: &TestApp, id: &str) -> i64 {
    app.state.ledger.quantity_of(&id.into()).await.unwrap()
}

fn card_checkout() -> Value {
    json!({
        "payment_method": "CREDIT_CARD",
        "credit_card": {
            "card_number": "4111111111111111",
            "cardholder_name": "Ada Lovelace",
            "expiry_date": "12/99",
            "cvv": "123",
        },
    })
}

#[tokio::test]
async fn test_availability_reports_price_and_stock() {
    let app = setup();
    seed_item(&app, "SKU-0", 999, 2).await;

    let (status, body) = send(
        &app.router,
        "GET",
        "/inventory/items/SKU-0/availability?quantity=3",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], false);
    assert_eq!(body["available_quantity"], 2);
    assert_eq!(body["unit_price"], 999);

    let (status, body) = send(
        &app.router,
        "GET",
        "/inventory/items/NOPE/availability",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NotFound");
}

#[tokio::test]
async fn test_seed_file_loads_catalog() {
    let app = setup();
    let path = std::env::temp_dir().join(format!("seed-{}.json", UserId::new()));
    std::fs::write(
        &path,
        json!([
            { "id": "A", "name": "Alpha", "unit_price": 100, "available_quantity": 3 },
            { "id": "B", "name": "Beta", "unit_price": 250, "available_quantity": 0 },
        ])
        .to_string(),
    )
    .unwrap();

    let count = app.state.seed_inventory(&path).await.unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(count, 2);
    assert_eq!(stock_of(&app, "A").await, 3);
    assert_eq!(stock_of(&app, "B").await, 0);
}

#[tokio::test]
async fn test_metrics_endpoint_is_plain_text() {
    let app = setup();
    let response = app
        .router
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_checkout_flow_end_to_end() {
    let mut app = setup();
    seed_item(&app, "SKU-1", 1250, 5).await;
    let shopper = user();

    let (status, cart) = send(
        &app.router,
        "POST",
        "/cart/items",
        Some(shopper),
        Some(json!({ "item_id": "SKU-1", "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["total"], 2500);
    assert_eq!(cart["lines"][0]["name"], "Widget");

    let (status, checkout) = send(
        &app.router,
        "POST",
        "/checkout",
        Some(shopper),
        Some(card_checkout()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{checkout}");
    assert_eq!(checkout["total_amount"], 2500);
    assert_eq!(checkout["payment_status"], "COMPLETED");
    let order_id = checkout["order_id"].as_str().unwrap().to_string();
    let checkout_id = checkout["checkout_id"].as_str().unwrap().to_string();

    let record = app.records.recv().await.unwrap();
    assert!(app.listener.handle(&record).await);

    let (status, order) = send(
        &app.router,
        "GET",
        &format!("/orders/{order_id}"),
        Some(shopper),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "PENDING");
    assert_eq!(order["total_price"], 2500);

    assert_eq!(stock_of(&app, "SKU-1").await, 3);

    let (_, cart) = send(&app.router, "GET", "/cart", Some(shopper), None).await;
    assert_eq!(cart["lines"], json!([]));

    let (status, saga) = send(
        &app.router,
        "GET",
        &format!("/checkouts/{checkout_id}"),
        Some(shopper),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saga["state"], "COMPLETED");

    let (status, payments) = send(&app.router, "GET", "/payments", Some(shopper), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payments.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_restores_stock() {
    let mut app = setup();
    seed_item(&app, "SKU-2", 500, 4).await;
    let shopper = user();

    send(
        &app.router,
        "POST",
        "/cart/items",
        Some(shopper),
        Some(json!({ "item_id": "SKU-2", "quantity": 3 })),
    )
    .await;
    let (_, checkout) = send(
        &app.router,
        "POST",
        "/checkout",
        Some(shopper),
        Some(card_checkout()),
    )
    .await;
    let order_id = checkout["order_id"].as_str().unwrap().to_string();
    let record = app.records.recv().await.unwrap();
    app.listener.handle(&record).await;
    assert_eq!(stock_of(&app, "SKU-2").await, 1);

    let (status, body) = send(
        &app.router,
        "POST",
        &format!("/orders/{order_id}/cancel"),
        Some(shopper),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["order"]["status"], "CANCELLED");
    assert_eq!(stock_of(&app, "SKU-2").await, 4);

    let (status, body) = send(
        &app.router,
        "POST",
        &format!("/orders/{order_id}/cancel"),
        Some(shopper),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "AlreadyCancelled");
}

#[tokio::test]
async fn test_empty_cart_checkout_is_bad_request() {
    let app = setup();
    let (status, body) = send(
        &app.router,
        "POST",
        "/checkout",
        Some(user()),
        Some(card_checkout()),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "EmptyCart");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_adding_more_than_stock_conflicts() {
    let app = setup();
    seed_item(&app, "SKU-3", 100, 1).await;

    let (status, body) = send(
        &app.router,
        "POST",
        "/cart/items",
        Some(user()),
        Some(json!({ "item_id": "SKU-3", "quantity": 2 })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "InsufficientStock");
}

#[tokio::test]
async fn test_other_users_order_is_forbidden() {
    let mut app = setup();
    seed_item(&app, "SKU-4", 100, 2).await;
    let owner = user();

    send(
        &app.router,
        "POST",
        "/cart/items",
        Some(owner),
        Some(json!({ "item_id": "SKU-4", "quantity": 1 })),
    )
    .await;
    let (_, checkout) = send(&app.router, "POST", "/checkout", Some(owner), Some(card_checkout())).await;
    let order_id = checkout["order_id"].as_str().unwrap().to_string();
    let record = app.records.recv().await.unwrap();
    app.listener.handle(&record).await;

    let uri = format!("/orders/{order_id}");
    let (status, body) = send(&app.router, "GET", &uri, Some(user()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "Forbidden");

    let (status, _) = send(&app.router, "GET", &uri, Some(admin()), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app.router,
        "PUT",
        &format!("/orders/{order_id}/status"),
        Some(owner),
        Some(json!({ "status": "PROCESSING" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app.router,
        "PUT",
        &format!("/orders/{order_id}/status"),
        Some(admin()),
        Some(json!({ "status": "PROCESSING" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PROCESSING");
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let app = setup();
    let (status, body) = send(&app.router, "GET", "/orders", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "Forbidden");
}

#[tokio::test]
async fn test_reconciliation_console_is_admin_only() {
    let app = setup();

    let (status, _) = send(&app.router, "GET", "/checkouts/reconciliation", Some(user()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app.router, "GET", "/checkouts/reconciliation", Some(admin()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_malformed_ids_and_bodies_are_bad_requests() {
    let app = setup();

    let (status, body) = send(&app.router, "GET", "/orders/not-a-uuid", Some(user()), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "InvalidArgument");

    let (status, body) = send(
        &app.router,
        "POST",
        "/cart/items",
        Some(user()),
        Some(json!({ "item_id": "SKU-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "InvalidArgument");
}
