//! Order queries and lifecycle changes.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use common::{ItemId, OrderId, UserId};
use domain::{Order, OrderFilter, OrderStatus, OrderSummary};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use super::{JsonBody, parse_id, query};
use crate::error::ApiError;
use crate::identity::Identity;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    pub status: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub message: String,
    pub order: OrderSummary,
    pub restored: Vec<(ItemId, u32)>,
}

fn parse_status(raw: Option<&str>) -> Result<Option<OrderStatus>, ApiError> {
    raw.map(|s| s.parse::<OrderStatus>().map_err(ApiError::BadRequest))
        .transpose()
}

fn summaries(orders: Vec<Order>) -> Json<Vec<OrderSummary>> {
    Json(orders.iter().map(|order| order.summary()).collect())
}

/// GET /orders?status=: the requester's own orders, newest first.
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    params: Result<Query<OrderQuery>, QueryRejection>,
) -> Result<Json<Vec<OrderSummary>>, ApiError> {
    let params = query(params)?;
    let orders = match parse_status(params.status.as_deref())? {
        Some(status) => {
            state
                .orders
                .orders_for_user_with_status(requester.user_id, status)
                .await?
        }
        None => state.orders.orders_for_user(requester.user_id).await?,
    };
    Ok(summaries(orders))
}

/// GET /orders/all?status=&user_id=: every order. Admins only.
pub async fn list_all<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    params: Result<Query<OrderQuery>, QueryRejection>,
) -> Result<Json<Vec<OrderSummary>>, ApiError> {
    identity.require_admin("list all orders")?;
    let params = query(params)?;
    let user_id = params
        .user_id
        .as_deref()
        .map(|raw| {
            UserId::parse(raw)
                .map_err(|e| ApiError::BadRequest(format!("invalid user id {raw}: {e}")))
        })
        .transpose()?;
    let filter = OrderFilter {
        user_id,
        status: parse_status(params.status.as_deref())?,
    };
    Ok(summaries(state.orders.find_orders(filter).await?))
}

/// GET /orders/{id}
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    Path(id): Path<String>,
) -> Result<Json<OrderSummary>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let order = state.orders.get_order_for(&requester, order_id).await?;
    Ok(Json(order.summary()))
}

/// PUT /orders/{id}/status. Admins only.
#[tracing::instrument(skip(state, requester, req), fields(status = %req.status))]
pub async fn update_status<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<StatusUpdateRequest>,
) -> Result<Json<OrderSummary>, ApiError> {
    let order_id = parse_id(&id, "order")?;
    let status = req
        .status
        .parse::<OrderStatus>()
        .map_err(ApiError::BadRequest)?;
    let order = state
        .orders
        .update_status_for(&requester, order_id, status)
        .await?
        .into_result()?;
    Ok(Json(order.summary()))
}

/// POST /orders/{id}/cancel: by the owner or an admin.
#[tracing::instrument(skip(state, requester))]
pub async fn cancel<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let order_id = parse_id(&id, "order")?;
    let update = state.orders.cancel_for(&requester, order_id).await?;
    let restored = update
        .compensation
        .as_ref()
        .map(|report| report.restored.clone())
        .unwrap_or_default();
    let order = update.into_result()?;

    Ok(Json(CancelResponse {
        message: format!("order {order_id} cancelled, {} line(s) restored", restored.len()),
        order: order.summary(),
        restored,
    }))
}

/// POST /orders/{id}/compensation/retry. Admins only.
#[tracing::instrument(skip(state, identity))]
pub async fn retry_compensation<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<OrderSummary>, ApiError> {
    identity.require_admin("retry compensation")?;
    let order_id = parse_id(&id, "order")?;
    let order = state
        .orders
        .retry_compensation(order_id)
        .await?
        .into_result()?;
    Ok(Json(order.summary()))
}
