//! Settlement-backed payment verification.
//!
//! The proof token is interpreted as the hash of the transaction that paid for
//! the request. A [`SettlementLedger`] resolves it to the ERC-20 transfer it
//! recorded, and the transfer is checked against the challenge's accepted
//! methods: token contract, payee, amount and recency.
//!
//! Accepted tokens are the canonical `0x`-prefixed lower-case hash, so every
//! spelling of one transaction shares a single replay key.

use std::time::Duration;

use alloy_primitives::{Address, TxHash, U256};
use async_trait::async_trait;
#[cfg(feature = "telemetry")]
use tracing::instrument;

use super::{PaymentVerifier, ProofToken, RejectReason, Verification, VerifierError, present_token};
use crate::challenge::AcceptedMethod;
use crate::timestamp::UnixTimestamp;

/// Error type reported by [`SettlementLedger`] implementations.
pub type LedgerError = Box<dyn std::error::Error + Send + Sync>;

/// An ERC-20 `Transfer` recorded by a settled transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRecord {
    /// Token contract that emitted the transfer.
    pub token: Address,
    /// Sender.
    pub from: Address,
    /// Recipient.
    pub to: Address,
    /// Transferred amount in base units.
    pub value: U256,
    /// Timestamp of the block that included the transaction.
    pub block_timestamp: UnixTimestamp,
}

/// Read-only view of settled transfers.
#[async_trait]
pub trait SettlementLedger: Send + Sync {
    /// Looks up the token transfer recorded by `tx`.
    ///
    /// Returns `Ok(None)` when the transaction is unknown, pending, reverted,
    /// or carries no transfer.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the ledger cannot be queried.
    async fn transfer_by_tx(&self, tx: TxHash) -> Result<Option<TransferRecord>, LedgerError>;
}

/// Verifies proofs against settled transfers of one asset contract.
#[derive(Debug, Clone)]
pub struct SettlementVerifier<L> {
    ledger: L,
    asset_contract: Address,
    max_age: Duration,
}

impl<L> SettlementVerifier<L> {
    /// Default recency window for accepted transfers.
    pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

    /// Creates a verifier for transfers of `asset_contract`.
    pub const fn new(ledger: L, asset_contract: Address) -> Self {
        Self {
            ledger,
            asset_contract,
            max_age: Self::DEFAULT_MAX_AGE,
        }
    }

    /// Sets the maximum age of an accepted transfer.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Checks a resolved transfer against the accepted methods at `now`.
    fn check_transfer(
        &self,
        transfer: &TransferRecord,
        accepts: &[AcceptedMethod],
        now: UnixTimestamp,
    ) -> Result<(), RejectReason> {
        if transfer.token != self.asset_contract {
            return Err(RejectReason::SettlementNotFound);
        }
        let payable: Vec<&AcceptedMethod> = accepts
            .iter()
            .filter(|method| method.pay_to.parse::<Address>().ok() == Some(transfer.to))
            .collect();
        if payable.is_empty() {
            return Err(RejectReason::WrongPayee);
        }
        let covered = payable.iter().any(|method| {
            method
                .amount_base_units()
                .is_some_and(|required| transfer.value >= U256::from(required))
        });
        if !covered {
            return Err(RejectReason::InsufficientAmount);
        }
        if transfer.block_timestamp.age_at(now) > self.max_age {
            return Err(RejectReason::ProofTooOld);
        }
        Ok(())
    }
}

#[async_trait]
impl<L: SettlementLedger> PaymentVerifier for SettlementVerifier<L> {
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(asset = %self.asset_contract)))]
    async fn verify(
        &self,
        proof: Option<&str>,
        accepts: &[AcceptedMethod],
    ) -> Result<Verification, VerifierError> {
        let token = match present_token(proof) {
            Ok(token) => token,
            Err(reason) => return Ok(Verification::Rejected(reason)),
        };
        let Ok(tx) = token.parse::<TxHash>() else {
            return Ok(Verification::Rejected(RejectReason::MalformedProof));
        };
        let Some(transfer) = self
            .ledger
            .transfer_by_tx(tx)
            .await
            .map_err(VerifierError::Ledger)?
        else {
            return Ok(Verification::Rejected(RejectReason::SettlementNotFound));
        };
        Ok(
            match self.check_transfer(&transfer, accepts, UnixTimestamp::now()) {
                Ok(()) => Verification::Accepted(ProofToken::new(tx.to_string())),
                Err(reason) => Verification::Rejected(reason),
            },
        )
    }
}
