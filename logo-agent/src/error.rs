//! Error types shared across the request pipeline.

use crate::generation::GenerationError;
use crate::request::ValidationError;
use crate::verifier::VerifierError;

/// Error type reported by [`ReplayGuard`](crate::store::ReplayGuard) and
/// [`JobStore`](crate::store::JobStore) back-ends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The back-end could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors that end a request without a payment verdict or result.
///
/// Payment rejections and proof reuse are not errors; they are reported as
/// [`Outcome`](crate::coordinator::Outcome) variants.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// The request body failed schema validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The payment verifier could not reach a verdict.
    #[error("payment verification failed: {0}")]
    Verifier(#[from] VerifierError),
    /// The replay guard or job store failed.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
    /// Generation or post-processing failed.
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
    /// No accepted payment method names a payee, so nothing can be sold.
    #[error("no payment recipient configured")]
    MissingPayee,
    /// The request could not be fingerprinted.
    #[error("fingerprint failed: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

impl CoordinatorError {
    /// Whether the client is at fault.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
