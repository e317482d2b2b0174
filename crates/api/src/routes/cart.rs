//! The requester's cart.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::{ItemId, Money, UserId};
use event_store::EventStore;
use inventory::{InventoryError, InventoryService};
use saga::{Cart, CartLine, CartStore};
use serde::{Deserialize, Serialize};

use super::JsonBody;
use crate::error::ApiError;
use crate::identity::Identity;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub item_id: ItemId,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub user_id: UserId,
    pub lines: Vec<CartLine>,
    pub total: Money,
}

impl From<Cart> for CartResponse {
    fn from(cart: Cart) -> Self {
        Self {
            total: cart.total(),
            user_id: cart.user_id,
            lines: cart.lines,
        }
    }
}

/// GET /cart
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.get_cart(requester.user_id).await?;
    Ok(Json(cart.into()))
}

/// POST /cart/items
///
/// Price, name and image are taken from the catalog now; checkout charges
/// the price captured here.
#[tracing::instrument(skip(state, requester, req), fields(user_id = %requester.user_id, item_id = %req.item_id))]
pub async fn add_item<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    JsonBody(req): JsonBody<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let requested = i64::from(req.quantity);
    let availability = state.ledger.check_availability(&req.item_id, requested).await?;
    if !availability.available {
        return Err(InventoryError::InsufficientStock {
            item_id: req.item_id,
            requested,
            available: availability.available_quantity,
        }
        .into());
    }

    let mut line = CartLine::new(req.item_id, req.quantity, availability.unit_price)
        .with_name(availability.name);
    if let Some(image_url) = availability.image_url {
        line = line.with_image(image_url);
    }

    let cart = state.carts.add_item(requester.user_id, line).await?;
    Ok(Json(cart.into()))
}

/// DELETE /cart
pub async fn clear<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
) -> Result<StatusCode, ApiError> {
    state.carts.clear(requester.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
