//! Error types for the logo agent HTTP surface.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use logo_agent::{CoordinatorError, ValidationError};

/// Errors rendered as JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body failed validation.
    #[error(transparent)]
    BadRequest(ValidationError),

    /// The payment proof was already consumed or is in use.
    #[error("payment proof reused")]
    ProofReused,

    /// The requested static resource does not exist.
    #[error("not found")]
    NotFound,

    /// Anything else; the message is returned to the client.
    #[error("{0}")]
    Internal(String),
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::Validation(details) => Self::BadRequest(details),
            CoordinatorError::MissingPayee => Self::Internal("PAYMENT_RECIPIENT must be set".to_owned()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("request task failed: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::BadRequest(details) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": "bad_request", "details": details }),
            ),
            Self::ProofReused => (
                StatusCode::CONFLICT,
                serde_json::json!({ "error": "payment_proof_reused" }),
            ),
            Self::NotFound => (StatusCode::NOT_FOUND, serde_json::json!({ "error": "not_found" })),
            Self::Internal(message) => {
                tracing::error!(error = %message, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "internal_error", "message": message }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
