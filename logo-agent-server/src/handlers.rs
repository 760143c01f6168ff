//! Axum route handlers for the logo agent.
//!
//! - `GET /health` - liveness check
//! - `GET /agent-registration.json` - static agent descriptor
//! - `POST /v1/logo` - payment-gated logo generation

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use logo_agent::{Outcome, RequestCoordinator};

use crate::error::ApiError;

/// Header carrying the payment proof.
pub const PAYMENT_TX_HEADER: &str = "x-payment-tx";

/// Header set on every payment-required response.
pub const PAYMENT_ACCEPTS_HEADER: &str = "x-payment-accepts";

/// Resource name advertised in payment challenges.
pub const LOGO_RESOURCE: &str = "POST /v1/logo";

/// Description advertised in payment challenges.
pub const LOGO_DESCRIPTION: &str = "Generate 3 logo icon candidates (transparent PNG)";

/// Maximum accepted request body, in bytes.
pub const BODY_LIMIT: usize = 1024 * 1024;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Request protocol driver.
    pub coordinator: Arc<RequestCoordinator>,
    /// Agent registration descriptor on disk.
    pub registration_file: Arc<PathBuf>,
}

impl AppState {
    /// Creates the state.
    #[must_use]
    pub fn new(coordinator: RequestCoordinator, registration_file: impl Into<PathBuf>) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            registration_file: Arc::new(registration_file.into()),
        }
    }
}

/// `GET /health`
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

/// `GET /agent-registration.json` - serves the registration file verbatim.
///
/// # Errors
///
/// Returns 404 if the file does not exist, 500 if it cannot be read.
pub async fn agent_registration(State(state): State<AppState>) -> Result<Response, ApiError> {
    match tokio::fs::read(state.registration_file.as_path()).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response()),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(ApiError::NotFound),
        Err(err) => Err(ApiError::Internal(format!(
            "cannot read {}: {err}",
            state.registration_file.display()
        ))),
    }
}

/// `POST /v1/logo` - runs one request through the coordinator.
///
/// The coordinator is driven on a spawned task so a client disconnect cannot
/// cancel generation halfway and strand a reserved proof.
///
/// # Errors
///
/// Returns 400 on validation failure, 409 on proof reuse, and 500 on any
/// internal failure. Unpaid requests get a 402 challenge, which is not an error.
pub async fn post_logo(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let proof = headers
        .get(PAYMENT_TX_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let coordinator = Arc::clone(&state.coordinator);
    let outcome =
        tokio::spawn(async move { coordinator.handle(&body, proof.as_deref()).await }).await??;

    match outcome {
        Outcome::Cached(result) | Outcome::Fresh(result) => Ok(Json(&*result).into_response()),
        Outcome::PaymentRequired { challenge, reason } => {
            tracing::debug!(%reason, payment_id = %challenge.payment_id, "payment required");
            Ok((
                StatusCode::PAYMENT_REQUIRED,
                [(PAYMENT_ACCEPTS_HEADER, "true")],
                Json(challenge.to_body()),
            )
                .into_response())
        }
        Outcome::ProofReused => Err(ApiError::ProofReused),
    }
}

/// Builds the router with all routes and the body size limit.
#[must_use]
pub fn logo_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/agent-registration.json", get(agent_registration))
        .route("/v1/logo", post(post_logo))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}
