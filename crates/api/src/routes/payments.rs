//! Payment lookups and refunds.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use common::Requester;
use event_store::EventStore;
use payments::{Payment, PaymentService};
use serde::Deserialize;

use super::{parse_id, parse_payment_id, query};
use crate::error::ApiError;
use crate::identity::Identity;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PaymentQuery {
    pub order_id: Option<String>,
    pub transaction_id: Option<String>,
}

fn ensure_access(requester: &Requester, payment: &Payment) -> Result<(), ApiError> {
    if requester.may_access(payment.user_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "payment {} belongs to another user",
            payment.id
        )))
    }
}

/// GET /payments?order_id=&transaction_id=
///
/// Without filters, users see their own payments and admins see all of them.
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    params: Result<Query<PaymentQuery>, QueryRejection>,
) -> Result<Json<Vec<Payment>>, ApiError> {
    let params = query(params)?;

    let payments = if let Some(transaction_id) = params.transaction_id {
        vec![state.payments.find_by_transaction(&transaction_id).await?]
    } else if let Some(order_id) = params.order_id {
        let order_id = parse_id(&order_id, "order")?;
        state.payments.payments_for_order(order_id).await
    } else if requester.is_admin() {
        state.payments.list_payments().await
    } else {
        state.payments.payments_for_user(requester.user_id).await
    };

    Ok(Json(
        payments
            .into_iter()
            .filter(|payment| requester.may_access(payment.user_id))
            .collect(),
    ))
}

/// GET /payments/{id}
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    Path(id): Path<String>,
) -> Result<Json<Payment>, ApiError> {
    let payment = state.payments.get_payment(parse_payment_id(&id)?).await?;
    ensure_access(&requester, &payment)?;
    Ok(Json(payment))
}

/// POST /payments/{id}/refund. Admins only.
#[tracing::instrument(skip(state, identity))]
pub async fn refund<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Payment>, ApiError> {
    identity.require_admin("refund payments")?;
    let payment = state.payments.refund(parse_payment_id(&id)?).await?;
    Ok(Json(payment))
}
