//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lending::ServiceError;
use loan_store::StoreError;

/// Message returned when an operation is not legal in the loan's state.
pub const INVALID_FOR_STATE: &str = "invalid request for current state";

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Loan service error.
    Service(ServiceError),
}

impl ApiError {
    /// The operation was rejected by the loan's lifecycle state.
    pub fn invalid_for_state() -> Self {
        ApiError::BadRequest(INVALID_FOR_STATE.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Service(err) => service_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn service_error_to_response(err: ServiceError) -> (StatusCode, String) {
    match &err {
        ServiceError::LoanNotFound(_) | ServiceError::Store(StoreError::LoanNotFound(_)) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        ServiceError::InvalidTerms(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        ServiceError::Store(StoreError::Conflict { .. }) => (StatusCode::CONFLICT, err.to_string()),
        ServiceError::Store(_) => {
            tracing::error!(error = %err, "loan store failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            )
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}
