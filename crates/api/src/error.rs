//! API error type with HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::ErrorKind;
use domain::DomainError;
use inventory::InventoryError;
use payments::PaymentError;
use saga::CheckoutError;
use serde::Serialize;
use thiserror::Error;

/// Everything a handler can fail with. Rendered as `{"error", "kind"}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    /// Identity headers are missing or malformed.
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// Startup failure while loading the inventory seed file.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse seed file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Inventory(#[from] InventoryError),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::BadRequest(_) => ErrorKind::InvalidArgument,
            ApiError::Unauthenticated(_) | ApiError::Forbidden(_) => ErrorKind::Forbidden,
            ApiError::Domain(e) => e.kind(),
            ApiError::Checkout(e) => e.kind(),
            ApiError::Inventory(e) => e.kind(),
            ApiError::Payment(e) => e.kind(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            _ => status_for(self.kind()),
        }
    }
}

/// HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidArgument
        | ErrorKind::InvalidPaymentDetails
        | ErrorKind::CardExpired
        | ErrorKind::EmptyCart => StatusCode::BAD_REQUEST,
        ErrorKind::InsufficientStock
        | ErrorKind::InvalidTransition
        | ErrorKind::TerminalOrder
        | ErrorKind::InvalidState
        | ErrorKind::AlreadyDelivered
        | ErrorKind::AlreadyCancelled
        | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::CompensationFailed | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let message = self.to_string();

        metrics::counter!("http_request_errors_total", "kind" => kind.as_str()).increment(1);
        if status.is_server_error() {
            tracing::error!(%kind, error = %message, "request failed");
        } else {
            tracing::debug!(%kind, error = %message, "request rejected");
        }

        (status, Json(ErrorBody { error: message, kind })).into_response()
    }
}
