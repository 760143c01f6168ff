//! Replay guard and idempotency store.
//!
//! Both capabilities are traits so that durable or evicting back-ends can
//! replace the in-memory implementations. The in-memory versions are built on
//! [`DashMap`] and are meant to be constructed once at process start and
//! shared through an [`Arc`].

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::digest::Fingerprint;
use crate::error::StoreError;
use crate::fulfillment::FulfillmentResult;
use crate::verifier::ProofToken;

/// Records which payment proofs have already paid for a fulfilment.
///
/// Every method returns [`StoreError`] when the back-end fails.
#[async_trait]
pub trait ReplayGuard: Send + Sync {
    /// Whether `proof` has been consumed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the back-end cannot answer.
    async fn is_consumed(&self, proof: &ProofToken) -> Result<bool, StoreError>;

    /// Marks `proof` consumed. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the mark cannot be recorded.
    async fn consume(&self, proof: &ProofToken) -> Result<(), StoreError>;

    /// Atomically claims `proof` for an in-flight request.
    ///
    /// Returns `false` when the proof is consumed or already reserved.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the reservation cannot be recorded.
    async fn try_reserve(&self, proof: &ProofToken) -> Result<bool, StoreError>;

    /// Drops a reservation that was never consumed. Consumed proofs stay consumed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the reservation cannot be dropped.
    async fn release(&self, proof: &ProofToken) -> Result<(), StoreError>;
}

/// Maps request fingerprints to their fulfilment results.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Returns the stored result for `fingerprint`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the back-end cannot answer.
    async fn get(&self, fingerprint: &Fingerprint)
    -> Result<Option<Arc<FulfillmentResult>>, StoreError>;

    /// Stores `result` unless a result already exists; returns whichever is stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the result cannot be stored.
    async fn insert_if_absent(
        &self,
        fingerprint: Fingerprint,
        result: Arc<FulfillmentResult>,
    ) -> Result<Arc<FulfillmentResult>, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProofState {
    Reserved,
    Consumed,
}

/// In-memory [`ReplayGuard`], keyed by [`ProofToken::replay_key`].
#[derive(Debug, Default)]
pub struct MemoryReplayGuard {
    proofs: DashMap<String, ProofState>,
}

impl MemoryReplayGuard {
    /// Creates an empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReplayGuard for MemoryReplayGuard {
    async fn is_consumed(&self, proof: &ProofToken) -> Result<bool, StoreError> {
        Ok(self
            .proofs
            .get(&proof.replay_key())
            .is_some_and(|state| *state == ProofState::Consumed))
    }

    async fn consume(&self, proof: &ProofToken) -> Result<(), StoreError> {
        self.proofs.insert(proof.replay_key(), ProofState::Consumed);
        Ok(())
    }

    async fn try_reserve(&self, proof: &ProofToken) -> Result<bool, StoreError> {
        match self.proofs.entry(proof.replay_key()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(ProofState::Reserved);
                Ok(true)
            }
        }
    }

    async fn release(&self, proof: &ProofToken) -> Result<(), StoreError> {
        self.proofs
            .remove_if(&proof.replay_key(), |_, state| *state == ProofState::Reserved);
        Ok(())
    }
}

/// In-memory [`JobStore`]. Grows without bound.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: DashMap<Fingerprint, Arc<FulfillmentResult>>,
}

impl MemoryJobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Arc<FulfillmentResult>>, StoreError> {
        Ok(self.jobs.get(fingerprint).map(|entry| Arc::clone(entry.value())))
    }

    async fn insert_if_absent(
        &self,
        fingerprint: Fingerprint,
        result: Arc<FulfillmentResult>,
    ) -> Result<Arc<FulfillmentResult>, StoreError> {
        let entry = self.jobs.entry(fingerprint).or_insert(result);
        Ok(Arc::clone(entry.value()))
    }
}
