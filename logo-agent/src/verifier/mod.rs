//! Pluggable payment verification.
//!
//! A [`PaymentVerifier`] inspects the proof token a client attached to its
//! request and decides whether it pays for the challenge's accepted methods.
//! Verification is read-only: it never touches the replay guard or the job
//! store, which stay under the coordinator's control.
//!
//! # Policies
//!
//! - [`SyntacticVerifier`] - accepts any well-formed token (development policy)
//! - [`SettlementVerifier`] - checks a settled ERC-20 transfer through a
//!   [`SettlementLedger`]

mod settlement;
mod syntactic;

pub use settlement::*;
pub use syntactic::*;

use std::fmt::{self, Display, Formatter};

use async_trait::async_trait;
use serde::Serialize;

use crate::challenge::AcceptedMethod;

/// A client-supplied payment proof that passed verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProofToken(String);

impl ProofToken {
    /// Wraps a raw token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key under which the token is recorded by the replay guard.
    #[must_use]
    pub fn replay_key(&self) -> String {
        format!("tx:{}", self.0)
    }
}

impl Display for ProofToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a proof was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// No proof token was supplied.
    MissingProof,
    /// The token fails the minimal shape check.
    MalformedProof,
    /// No matching transfer exists on the ledger.
    SettlementNotFound,
    /// The transfer pays less than required.
    InsufficientAmount,
    /// The transfer pays someone other than the payee.
    WrongPayee,
    /// The transfer is older than the recency window.
    ProofTooOld,
}

impl RejectReason {
    /// Machine-readable reason code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingProof => "missing_proof",
            Self::MalformedProof => "malformed_proof",
            Self::SettlementNotFound => "settlement_not_found",
            Self::InsufficientAmount => "insufficient_amount",
            Self::WrongPayee => "wrong_payee",
            Self::ProofTooOld => "proof_too_old",
        }
    }
}

impl Display for RejectReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of verifying a proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The proof pays for the challenge.
    Accepted(ProofToken),
    /// The proof was missing or does not pay for the challenge.
    Rejected(RejectReason),
}

/// Infrastructure faults that prevent a verdict. These are not rejections.
#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    /// The settlement ledger could not be queried.
    #[error("ledger query failed: {0}")]
    Ledger(#[source] LedgerError),
}

/// Capability that decides whether a proof pays for a challenge.
///
/// Implementations must be swappable without changing the coordinator.
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    /// Verifies `proof` (the raw header value, if any) against `accepts`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifierError`] only when no verdict could be reached.
    async fn verify(
        &self,
        proof: Option<&str>,
        accepts: &[AcceptedMethod],
    ) -> Result<Verification, VerifierError>;
}

/// Extracts a trimmed, non-empty token from the raw proof value.
fn present_token(proof: Option<&str>) -> Result<&str, RejectReason> {
    proof
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(RejectReason::MissingProof)
}
