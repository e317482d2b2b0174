//! Stock availability.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use common::ItemId;
use event_store::EventStore;
use inventory::{Availability, InventoryService};
use serde::Deserialize;

use super::query;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    #[serde(default = "one")]
    pub quantity: i64,
}

fn one() -> i64 {
    1
}

/// GET /inventory/items/{id}/availability?quantity=
pub async fn availability<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    params: Result<Query<AvailabilityQuery>, QueryRejection>,
) -> Result<Json<Availability>, ApiError> {
    let params = query(params)?;
    let availability = state
        .ledger
        .check_availability(&ItemId::from(id), params.quantity)
        .await?;
    Ok(Json(availability))
}
