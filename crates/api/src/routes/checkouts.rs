//! Checkout and the reconciliation console.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::CheckoutRecord;
use event_store::EventStore;
use saga::{CheckoutRequest, CheckoutResponse, CheckoutSaga, ReconciliationReport};

use super::{JsonBody, parse_id};
use crate::error::ApiError;
use crate::identity::Identity;
use crate::state::AppState;

/// POST /checkout: checks out the requester's cart.
pub async fn checkout<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    JsonBody(request): JsonBody<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let response = state.checkout.checkout(requester.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /checkouts/{id}: the journaled saga, for its owner or an admin.
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    Path(id): Path<String>,
) -> Result<Json<CheckoutSaga>, ApiError> {
    let checkout_id = parse_id(&id, "checkout")?;
    let saga = state.checkout.get_saga(checkout_id).await?;
    let allowed = requester.is_admin() || saga.user_id().is_some_and(|owner| requester.may_access(owner));
    if !allowed {
        return Err(ApiError::Forbidden(format!(
            "checkout {checkout_id} belongs to another user"
        )));
    }
    Ok(Json(saga))
}

/// GET /checkouts/reconciliation: failed checkouts still holding stock.
pub async fn pending<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<Vec<CheckoutSaga>>, ApiError> {
    identity.require_admin("review failed checkouts")?;
    Ok(Json(state.reconciler.pending().await?))
}

/// POST /checkouts/{id}/reconcile
#[tracing::instrument(skip(state, identity))]
pub async fn reconcile<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<ReconciliationReport>, ApiError> {
    identity.require_admin("reconcile checkouts")?;
    let checkout_id = parse_id(&id, "checkout")?;
    Ok(Json(state.reconciler.reconcile(checkout_id).await?))
}

/// POST /checkouts/{id}/redeliver: publishes the checkout record again.
#[tracing::instrument(skip(state, identity))]
pub async fn redeliver<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<CheckoutRecord>, ApiError> {
    identity.require_admin("redeliver checkout records")?;
    let checkout_id = parse_id(&id, "checkout")?;
    Ok(Json(state.reconciler.redeliver(checkout_id).await?))
}
