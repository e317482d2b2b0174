//! HTTP handlers, one module per resource.

pub mod cart;
pub mod checkouts;
pub mod inventory;
pub mod metrics;
pub mod orders;
pub mod payments;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, Query, Request};
use common::{AggregateId, PaymentId};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// JSON body whose rejections render as [`ApiError`].
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        Ok(JsonBody(value))
    }
}

pub(crate) fn query<T: DeserializeOwned>(
    query: Result<Query<T>, QueryRejection>,
) -> Result<T, ApiError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

pub(crate) fn parse_id(raw: &str, what: &str) -> Result<AggregateId, ApiError> {
    AggregateId::parse(raw).map_err(|e| ApiError::BadRequest(format!("invalid {what} id {raw}: {e}")))
}

pub(crate) fn parse_payment_id(raw: &str) -> Result<PaymentId, ApiError> {
    PaymentId::parse(raw).map_err(|e| ApiError::BadRequest(format!("invalid payment id {raw}: {e}")))
}
