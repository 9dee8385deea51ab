//! Error types for the Observer API server.
//!
//! [`ObserverError`] unifies all failure modes into a single enum that
//! can be converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rust_decimal::Decimal;

use colony_core::activity::ActivityError;
use colony_core::insurance::InsuranceError;
use colony_core::PhenomenonError;
use colony_ledger::StoreError;

/// Errors that can occur in the Observer API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// An invalid parameter or body was provided.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A UUID could not be parsed from the request path.
    #[error("invalid UUID: {0}")]
    InvalidUuid(String),

    /// The balance does not cover the price.
    #[error("insufficient funds: balance {balance} is below price {price}")]
    InsufficientFunds {
        /// Balance at the time of the attempt.
        balance: Decimal,
        /// Price that was asked.
        price: Decimal,
    },

    /// The ledger store could not be reached.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ObserverError {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            Self::StorageUnavailable(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl From<InsuranceError> for ObserverError {
    fn from(err: InsuranceError) -> Self {
        match err {
            InsuranceError::InsufficientFunds { balance, price } => {
                Self::InsufficientFunds { balance, price }
            }
            InsuranceError::UnknownParticipant(id) => Self::NotFound(format!("participant {id}")),
            InsuranceError::Store { source } => source.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<ActivityError> for ObserverError {
    fn from(err: ActivityError) -> Self {
        match err {
            ActivityError::UnknownParticipant(id) => Self::NotFound(format!("participant {id}")),
            ActivityError::Store { source } => source.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<PhenomenonError> for ObserverError {
    fn from(err: PhenomenonError) -> Self {
        match err {
            PhenomenonError::Store { source } => source.into(),
            invalid => Self::InvalidRequest(invalid.to_string()),
        }
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) | Self::InvalidUuid(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!(error = %self, status = status.as_u16(), "request failed");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
