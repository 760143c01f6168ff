//! Well-formedness-only payment verification.

use async_trait::async_trait;

use super::{PaymentVerifier, ProofToken, RejectReason, Verification, VerifierError, present_token};
use crate::challenge::AcceptedMethod;

/// Accepts any proof token of at least [`Self::min_len`] characters.
///
/// This policy performs no settlement check and is meant for development and
/// for deployments where payment is verified out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntacticVerifier {
    min_len: usize,
}

impl SyntacticVerifier {
    /// Default minimum token length.
    pub const DEFAULT_MIN_LEN: usize = 10;

    /// Creates a verifier with a custom minimum token length.
    #[must_use]
    pub const fn with_min_len(min_len: usize) -> Self {
        Self { min_len }
    }

    /// Minimum accepted token length in characters.
    #[must_use]
    pub const fn min_len(&self) -> usize {
        self.min_len
    }
}

impl Default for SyntacticVerifier {
    fn default() -> Self {
        Self::with_min_len(Self::DEFAULT_MIN_LEN)
    }
}

#[async_trait]
impl PaymentVerifier for SyntacticVerifier {
    async fn verify(
        &self,
        proof: Option<&str>,
        _accepts: &[AcceptedMethod],
    ) -> Result<Verification, VerifierError> {
        let token = match present_token(proof) {
            Ok(token) => token,
            Err(reason) => return Ok(Verification::Rejected(reason)),
        };
        if token.chars().count() < self.min_len {
            return Ok(Verification::Rejected(RejectReason::MalformedProof));
        }
        Ok(Verification::Accepted(ProofToken::new(token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_proof() {
        let verifier = SyntacticVerifier::default();
        assert_eq!(
            verifier.verify(None, &[]).await.unwrap(),
            Verification::Rejected(RejectReason::MissingProof)
        );
        assert_eq!(
            verifier.verify(Some(""), &[]).await.unwrap(),
            Verification::Rejected(RejectReason::MissingProof)
        );
    }

    #[tokio::test]
    async fn test_short_proof_is_malformed() {
        let verifier = SyntacticVerifier::default();
        assert_eq!(
            verifier.verify(Some("0x1234567"), &[]).await.unwrap(),
            Verification::Rejected(RejectReason::MalformedProof)
        );
    }

    #[tokio::test]
    async fn test_accepts_trimmed_token() {
        let verifier = SyntacticVerifier::default();
        assert_eq!(
            verifier.verify(Some(" 0x123456789 "), &[]).await.unwrap(),
            Verification::Accepted(ProofToken::new("0x123456789"))
        );
    }

    #[tokio::test]
    async fn test_custom_min_len() {
        let verifier = SyntacticVerifier::with_min_len(3);
        assert_eq!(verifier.min_len(), 3);
        assert!(matches!(
            verifier.verify(Some("abc"), &[]).await.unwrap(),
            Verification::Accepted(_)
        ));
    }
}
