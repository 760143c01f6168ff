//! End-to-end payment-gated fulfilment protocol.
//!
//! [`RequestCoordinator::handle_request`] resolves every request to exactly
//! one [`Outcome`]:
//!
//! 1. Validate the request and compute its [`Fingerprint`].
//! 2. Serve a stored result if one exists. This path never touches payment state.
//! 3. Otherwise verify the attached proof; a rejection yields a fresh challenge.
//! 4. Reserve the proof in the replay guard; a proof that is consumed or held
//!    by another in-flight request is reported as reused.
//! 5. Generate, commit the proof, store and return the result.
//!
//! Requests sharing a fingerprint are serialized past step 3, so generation
//! runs at most once per fingerprint. Dropping the future returned by
//! [`RequestCoordinator::handle_request`] mid-generation leaves the proof
//! reserved; callers that may be cancelled should drive it on a spawned task.

use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::challenge::{ChallengeIssuer, PaymentChallenge};
use crate::digest::Fingerprint;
use crate::error::{CoordinatorError, StoreError};
use crate::fulfillment::FulfillmentResult;
use crate::generation::Orchestrator;
use crate::prompting::{GenerationSpec, build_prompts};
use crate::request::LogoRequest;
use crate::store::{JobStore, MemoryJobStore, MemoryReplayGuard, ReplayGuard};
use crate::verifier::{PaymentVerifier, ProofToken, RejectReason, SyntacticVerifier, Verification};

/// Terminal state of a handled request.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A stored result for the same fingerprint.
    Cached(Arc<FulfillmentResult>),
    /// A result generated for this request.
    Fresh(Arc<FulfillmentResult>),
    /// Payment is missing or was rejected.
    PaymentRequired {
        /// Fresh challenge describing how to pay.
        challenge: PaymentChallenge,
        /// Why the attached proof, if any, was not accepted.
        reason: RejectReason,
    },
    /// The proof was already consumed or is in use by another request.
    ProofReused,
}

impl Outcome {
    /// Returns the fulfilment result, if the request was fulfilled.
    #[must_use]
    pub fn result(&self) -> Option<&Arc<FulfillmentResult>> {
        match self {
            Self::Cached(result) | Self::Fresh(result) => Some(result),
            Self::PaymentRequired { .. } | Self::ProofReused => None,
        }
    }
}

/// What happens to a reserved proof when generation fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProofBurnPolicy {
    /// The proof is consumed only by a successful fulfilment; failures release it.
    #[default]
    OnSuccess,
    /// The proof is consumed once generation is attempted, even if it fails.
    Always,
}

/// Error returned when parsing a [`ProofBurnPolicy`] fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown proof burn policy `{0}`, expected `on-success` or `always`")]
pub struct ParseBurnPolicyError(String);

impl FromStr for ProofBurnPolicy {
    type Err = ParseBurnPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "on-success" => Ok(Self::OnSuccess),
            "always" => Ok(Self::Always),
            other => Err(ParseBurnPolicyError(other.to_owned())),
        }
    }
}

type LockTable = DashMap<Fingerprint, Arc<Mutex<()>>>;

/// Exclusive hold on one fingerprint; the table entry is removed when the
/// last holder leaves.
struct FingerprintLock<'a> {
    table: &'a LockTable,
    fingerprint: Fingerprint,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<'a> FingerprintLock<'a> {
    async fn acquire(table: &'a LockTable, fingerprint: Fingerprint) -> Self {
        let lock = Arc::clone(table.entry(fingerprint).or_default().value());
        let guard = lock.lock_owned().await;
        Self {
            table,
            fingerprint,
            guard: Some(guard),
        }
    }
}

impl Drop for FingerprintLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.table
            .remove_if(&self.fingerprint, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Composes challenge issuance, verification, replay protection, idempotency
/// and generation into the request protocol.
pub struct RequestCoordinator {
    issuer: ChallengeIssuer,
    orchestrator: Orchestrator,
    verifier: Arc<dyn PaymentVerifier>,
    replay_guard: Arc<dyn ReplayGuard>,
    job_store: Arc<dyn JobStore>,
    burn_policy: ProofBurnPolicy,
    in_flight: LockTable,
}

impl std::fmt::Debug for RequestCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field("issuer", &self.issuer)
            .field("orchestrator", &self.orchestrator)
            .field("burn_policy", &self.burn_policy)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`RequestCoordinator`].
///
/// Defaults: [`SyntacticVerifier`], [`MemoryReplayGuard`], [`MemoryJobStore`]
/// and [`ProofBurnPolicy::OnSuccess`].
pub struct RequestCoordinatorBuilder {
    issuer: ChallengeIssuer,
    orchestrator: Orchestrator,
    verifier: Arc<dyn PaymentVerifier>,
    replay_guard: Arc<dyn ReplayGuard>,
    job_store: Arc<dyn JobStore>,
    burn_policy: ProofBurnPolicy,
}

impl std::fmt::Debug for RequestCoordinatorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoordinatorBuilder")
            .field("burn_policy", &self.burn_policy)
            .finish_non_exhaustive()
    }
}

impl RequestCoordinatorBuilder {
    /// Sets the payment verifier.
    #[must_use]
    pub fn verifier(mut self, verifier: Arc<dyn PaymentVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Sets the replay guard.
    #[must_use]
    pub fn replay_guard(mut self, replay_guard: Arc<dyn ReplayGuard>) -> Self {
        self.replay_guard = replay_guard;
        self
    }

    /// Sets the idempotency store.
    #[must_use]
    pub fn job_store(mut self, job_store: Arc<dyn JobStore>) -> Self {
        self.job_store = job_store;
        self
    }

    /// Sets the policy applied to reserved proofs when generation fails.
    #[must_use]
    pub const fn burn_policy(mut self, burn_policy: ProofBurnPolicy) -> Self {
        self.burn_policy = burn_policy;
        self
    }

    /// Builds the coordinator.
    #[must_use]
    pub fn build(self) -> RequestCoordinator {
        RequestCoordinator {
            issuer: self.issuer,
            orchestrator: self.orchestrator,
            verifier: self.verifier,
            replay_guard: self.replay_guard,
            job_store: self.job_store,
            burn_policy: self.burn_policy,
            in_flight: LockTable::default(),
        }
    }
}

impl RequestCoordinator {
    /// Starts building a coordinator around an issuer and an orchestrator.
    #[must_use]
    pub fn builder(issuer: ChallengeIssuer, orchestrator: Orchestrator) -> RequestCoordinatorBuilder {
        RequestCoordinatorBuilder {
            issuer,
            orchestrator,
            verifier: Arc::new(SyntacticVerifier::default()),
            replay_guard: Arc::new(MemoryReplayGuard::new()),
            job_store: Arc::new(MemoryJobStore::new()),
            burn_policy: ProofBurnPolicy::default(),
        }
    }

    /// Returns the challenge issuer.
    #[must_use]
    pub const fn issuer(&self) -> &ChallengeIssuer {
        &self.issuer
    }

    /// Returns the burn policy in force.
    #[must_use]
    pub const fn burn_policy(&self) -> ProofBurnPolicy {
        self.burn_policy
    }

    /// Parses a raw JSON body and handles it.
    ///
    /// # Errors
    ///
    /// See [`Self::handle_request`]; malformed JSON is a
    /// [`CoordinatorError::Validation`].
    pub async fn handle(
        &self,
        body: &[u8],
        proof: Option<&str>,
    ) -> Result<Outcome, CoordinatorError> {
        self.ensure_payee()?;
        let request = LogoRequest::parse(body)?;
        self.handle_request(request, proof).await
    }

    /// Handles one request with the raw proof value, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::MissingPayee`] while the issuer has no
    /// payee, and [`CoordinatorError`] on validation failure, verifier or store
    /// faults, and generation failures. Payment rejections and proof reuse are
    /// reported as [`Outcome`]s.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(brand = %request.brand)))]
    #[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
    pub async fn handle_request(
        &self,
        request: LogoRequest,
        proof: Option<&str>,
    ) -> Result<Outcome, CoordinatorError> {
        self.ensure_payee()?;
        request.validate()?;
        let spec = GenerationSpec::from_request(&request);
        let prompts = build_prompts(&spec);
        let fingerprint = Fingerprint::compute(&request, &spec, &prompts)?;

        if let Some(result) = self.job_store.get(&fingerprint).await? {
            #[cfg(feature = "telemetry")]
            tracing::info!(%fingerprint, "serving stored result");
            return Ok(Outcome::Cached(result));
        }

        let token = match self.verifier.verify(proof, self.issuer.accepts()).await? {
            Verification::Accepted(token) => token,
            Verification::Rejected(reason) => {
                let challenge = self.issuer.issue();
                #[cfg(feature = "telemetry")]
                tracing::info!(
                    %fingerprint,
                    payment_id = %challenge.payment_id,
                    reason = %reason,
                    "payment required"
                );
                return Ok(Outcome::PaymentRequired { challenge, reason });
            }
        };

        let _lock = FingerprintLock::acquire(&self.in_flight, fingerprint).await;
        if let Some(result) = self.job_store.get(&fingerprint).await? {
            #[cfg(feature = "telemetry")]
            tracing::info!(%fingerprint, "result stored while waiting");
            return Ok(Outcome::Cached(result));
        }

        if !self.replay_guard.try_reserve(&token).await? {
            #[cfg(feature = "telemetry")]
            tracing::warn!(%fingerprint, proof = %token, "payment proof reused");
            return Ok(Outcome::ProofReused);
        }

        let candidates = match self.orchestrator.run(&prompts).await {
            Ok(candidates) => candidates,
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::error!(%fingerprint, error = %err, policy = ?self.burn_policy, "generation failed");
                self.settle_failed_proof(&token).await;
                return Err(err.into());
            }
        };

        if let Err(err) = self.replay_guard.consume(&token).await {
            #[cfg(feature = "telemetry")]
            tracing::error!(proof = %token, error = %err, "failed to commit consumed proof");
        }

        let result = Arc::new(FulfillmentResult::fulfilled(
            self.issuer.pricing(),
            fingerprint,
            candidates,
        ));
        let stored = match self
            .job_store
            .insert_if_absent(fingerprint, Arc::clone(&result))
            .await
        {
            Ok(stored) => stored,
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::error!(%fingerprint, error = %err, "failed to store result");
                result
            }
        };

        #[cfg(feature = "telemetry")]
        tracing::info!(%fingerprint, candidates = stored.candidates.len(), "request fulfilled");
        Ok(Outcome::Fresh(stored))
    }

    fn ensure_payee(&self) -> Result<(), CoordinatorError> {
        if self.issuer.has_payee() {
            Ok(())
        } else {
            Err(CoordinatorError::MissingPayee)
        }
    }

    /// Applies the burn policy to a proof whose generation failed.
    #[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
    async fn settle_failed_proof(&self, token: &ProofToken) {
        let settled: Result<(), StoreError> = match self.burn_policy {
            ProofBurnPolicy::OnSuccess => self.replay_guard.release(token).await,
            ProofBurnPolicy::Always => self.replay_guard.consume(token).await,
        };
        if let Err(err) = settled {
            #[cfg(feature = "telemetry")]
            tracing::error!(proof = %token, error = %err, "failed to settle proof after generation failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use alloy_primitives::{Address, TxHash, U256, address};
    use async_trait::async_trait;

    use super::*;
    use crate::amount::USDC_DECIMALS;
    use crate::challenge::PricingTerms;
    use crate::digest::Digest;
    use crate::generation::{Generator, GeneratorError, PostProcessError, PostProcessor};
    use crate::timestamp::UnixTimestamp;
    use crate::verifier::{LedgerError, SettlementLedger, SettlementVerifier, TransferRecord, VerifierError};

    const PROOF_A: &str = "0xaaaaaaaaaaaaaaaa";
    const PROOF_B: &str = "0xbbbbbbbbbbbbbbbb";

    #[derive(Default)]
    struct FakeGenerator {
        calls: AtomicUsize,
        failing: AtomicBool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Generator for FakeGenerator {
        async fn generate(&self, prompt: &str, _size: u32) -> Result<Vec<u8>, GeneratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(GeneratorError::Upstream {
                    status: 503,
                    body: "overloaded".into(),
                });
            }
            Ok(prompt.as_bytes().to_vec())
        }
    }

    struct FakeProcessor;

    #[async_trait]
    impl PostProcessor for FakeProcessor {
        async fn normalize(&self, raw: &[u8], size: u32) -> Result<Vec<u8>, PostProcessError> {
            let mut out = size.to_be_bytes().to_vec();
            out.extend_from_slice(raw);
            Ok(out)
        }
    }

    /// Job store that never keeps anything and fails every write.
    struct BrokenJobStore;

    #[async_trait]
    impl JobStore for BrokenJobStore {
        async fn get(
            &self,
            _fingerprint: &Fingerprint,
        ) -> Result<Option<Arc<FulfillmentResult>>, StoreError> {
            Ok(None)
        }

        async fn insert_if_absent(
            &self,
            _fingerprint: Fingerprint,
            _result: Arc<FulfillmentResult>,
        ) -> Result<Arc<FulfillmentResult>, StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }
    }

    struct Harness {
        coordinator: Arc<RequestCoordinator>,
        generator: Arc<FakeGenerator>,
        guard: Arc<MemoryReplayGuard>,
    }

    fn issuer() -> ChallengeIssuer {
        ChallengeIssuer::new(
            PricingTerms {
                scheme: "erc20".into(),
                network: "base".into(),
                asset: "USDC".into(),
                decimals: USDC_DECIMALS,
                price: 10.0,
                recipient: "0x1111111111111111111111111111111111111111".into(),
            },
            "POST /v1/logo",
            "Generate 3 logo icon candidates (transparent PNG)",
        )
        .unwrap()
    }

    fn harness_with(
        generator: FakeGenerator,
        policy: ProofBurnPolicy,
        job_store: Option<Arc<dyn JobStore>>,
    ) -> Harness {
        let generator = Arc::new(generator);
        let guard = Arc::new(MemoryReplayGuard::new());
        let orchestrator = Orchestrator::new(Arc::clone(&generator) as Arc<dyn Generator>, Arc::new(FakeProcessor));
        let mut builder = RequestCoordinator::builder(issuer(), orchestrator)
            .replay_guard(Arc::clone(&guard) as Arc<dyn ReplayGuard>)
            .burn_policy(policy);
        if let Some(job_store) = job_store {
            builder = builder.job_store(job_store);
        }
        Harness {
            coordinator: Arc::new(builder.build()),
            generator,
            guard,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeGenerator::default(), ProofBurnPolicy::OnSuccess, None)
    }

    impl Harness {
        fn calls(&self) -> usize {
            self.generator.calls.load(Ordering::SeqCst)
        }

        async fn consumed(&self, proof: &str) -> bool {
            self.guard.is_consumed(&ProofToken::new(proof)).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_missing_proof_yields_challenge() {
        let h = harness();
        let outcome = h
            .coordinator
            .handle(br#"{"brand":"Acme"}"#, None)
            .await
            .unwrap();
        let Outcome::PaymentRequired { challenge, reason } = outcome else {
            panic!("expected payment required, got {outcome:?}");
        };
        assert_eq!(reason, RejectReason::MissingProof);
        assert!(!challenge.accepts.is_empty());
        assert_eq!(challenge.accepts[0].max_amount_required, "10000000");
        assert!(challenge.payment_id.as_str().starts_with("pay_"));
        assert_eq!(h.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_proof_yields_challenge() {
        let h = harness();
        let outcome = h
            .coordinator
            .handle(br#"{"brand":"Acme"}"#, Some("short"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            Outcome::PaymentRequired {
                reason: RejectReason::MalformedProof,
                ..
            }
        ));
        assert_eq!(h.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_body_is_validationerror() {
        let h = harness();
        let err = h.coordinator.handle(br#"{"brand":""}"#, Some(PROOF_A)).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Validation(_)));
        assert!(err.is_client_error());
        let err = h.coordinator.handle(b"not json", None).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Validation(_)));
        assert_eq!(h.calls(), 0);
        assert!(!h.consumed(PROOF_A).await);
    }

    #[tokio::test]
    async fn test_fresh_then_cached_is_identical() {
        let h = harness();
        let fresh = h
            .coordinator
            .handle(br#"{"brand":"Acme"}"#, Some(PROOF_A))
            .await
            .unwrap();
        let Outcome::Fresh(first) = fresh else {
            panic!("expected fresh result, got {fresh:?}");
        };
        assert_eq!(first.status, "fulfilled");
        assert_eq!(first.candidates.len(), 3);
        for candidate in &first.candidates {
            let sizes: Vec<u32> = candidate.files.iter().map(|f| f.size).collect();
            assert_eq!(sizes, [1024, 512, 256]);
            for file in &candidate.files {
                assert_eq!(file.sha256, Digest::of(&file.data));
            }
        }
        assert_eq!(h.calls(), 3);
        assert!(h.consumed(PROOF_A).await);

        let cached = h
            .coordinator
            .handle(br#"{ "brand": "Acme" }"#, None)
            .await
            .unwrap();
        let Outcome::Cached(second) = cached else {
            panic!("expected cached result, got {cached:?}");
        };
        assert_eq!(
            serde_json::to_vec(&*first).unwrap(),
            serde_json::to_vec(&*second).unwrap()
        );
        assert_eq!(h.calls(), 3);
    }

    #[tokio::test]
    async fn test_cache_hit_ignores_new_proof() {
        let h = harness();
        h.coordinator
            .handle(br#"{"brand":"Acme"}"#, Some(PROOF_A))
            .await
            .unwrap();
        let outcome = h
            .coordinator
            .handle(br#"{"brand":"Acme"}"#, Some(PROOF_B))
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Cached(_)));
        assert!(!h.consumed(PROOF_B).await);
        assert_eq!(h.calls(), 3);
    }

    #[tokio::test]
    async fn test_reused_proof_on_other_request() {
        let h = harness();
        h.coordinator
            .handle(br#"{"brand":"Acme"}"#, Some(PROOF_A))
            .await
            .unwrap();
        let outcome = h
            .coordinator
            .handle(br#"{"brand":"Globex"}"#, Some(PROOF_A))
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::ProofReused));
        assert_eq!(h.calls(), 3);
    }

    #[tokio::test]
    async fn test_failure_releases_proof_on_success_policy() {
        let h = harness();
        h.generator.failing.store(true, Ordering::SeqCst);
        let err = h
            .coordinator
            .handle(br#"{"brand":"Acme"}"#, Some(PROOF_A))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Generation(_)));
        assert!(!err.is_client_error());
        assert!(!h.consumed(PROOF_A).await);

        h.generator.failing.store(false, Ordering::SeqCst);
        let outcome = h
            .coordinator
            .handle(br#"{"brand":"Acme"}"#, Some(PROOF_A))
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Fresh(_)));
        assert!(h.consumed(PROOF_A).await);
    }

    #[tokio::test]
    async fn test_failure_burns_proof_on_always_policy() {
        let h = harness_with(FakeGenerator::default(), ProofBurnPolicy::Always, None);
        h.generator.failing.store(true, Ordering::SeqCst);
        let err = h
            .coordinator
            .handle(br#"{"brand":"Acme"}"#, Some(PROOF_A))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Generation(_)));
        assert!(h.consumed(PROOF_A).await);

        h.generator.failing.store(false, Ordering::SeqCst);
        let outcome = h
            .coordinator
            .handle(br#"{"brand":"Acme"}"#, Some(PROOF_A))
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::ProofReused));
    }

    #[tokio::test]
    async fn test_store_failure_still_returns_result() {
        let h = harness_with(
            FakeGenerator::default(),
            ProofBurnPolicy::OnSuccess,
            Some(Arc::new(BrokenJobStore)),
        );
        let outcome = h
            .coordinator
            .handle(br#"{"brand":"Acme"}"#, Some(PROOF_A))
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Fresh(_)));
        assert!(h.consumed(PROOF_A).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_fingerprint_generates_once() {
        let h = harness_with(
            FakeGenerator {
                delay: Some(Duration::from_millis(50)),
                ..FakeGenerator::default()
            },
            ProofBurnPolicy::OnSuccess,
            None,
        );
        let tasks: Vec<_> = [PROOF_A, PROOF_B]
            .into_iter()
            .map(|proof| {
                let coordinator = Arc::clone(&h.coordinator);
                tokio::spawn(async move {
                    coordinator
                        .handle(br#"{"brand":"Acme"}"#, Some(proof))
                        .await
                        .unwrap()
                })
            })
            .collect();
        let mut fresh = 0;
        let mut cached = 0;
        for task in tasks {
            match task.await.unwrap() {
                Outcome::Fresh(_) => fresh += 1,
                Outcome::Cached(_) => cached += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!((fresh, cached), (1, 1));
        assert_eq!(h.calls(), 3);
        assert!(h.coordinator.in_flight.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_proof_concurrently_accepted_once() {
        let h = harness_with(
            FakeGenerator {
                delay: Some(Duration::from_millis(50)),
                ..FakeGenerator::default()
            },
            ProofBurnPolicy::OnSuccess,
            None,
        );
        let tasks: Vec<_> = [&br#"{"brand":"Acme"}"#[..], &br#"{"brand":"Globex"}"#[..]]
            .into_iter()
            .map(|body| {
                let coordinator = Arc::clone(&h.coordinator);
                tokio::spawn(async move { coordinator.handle(body, Some(PROOF_A)).await.unwrap() })
            })
            .collect();
        let mut fresh = 0;
        let mut reused = 0;
        for task in tasks {
            match task.await.unwrap() {
                Outcome::Fresh(_) => fresh += 1,
                Outcome::ProofReused => reused += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!((fresh, reused), (1, 1));
        assert_eq!(h.calls(), 3);
    }

    const USDC: Address = address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
    const PAYEE: Address = address!("0x1111111111111111111111111111111111111111");

    /// Ledger answering every lookup with the same transfer.
    struct StubLedger {
        transfer: Option<TransferRecord>,
        down: bool,
    }

    #[async_trait]
    impl SettlementLedger for StubLedger {
        async fn transfer_by_tx(&self, _tx: TxHash) -> Result<Option<TransferRecord>, LedgerError> {
            if self.down {
                return Err("rpc unavailable".into());
            }
            Ok(self.transfer)
        }
    }

    fn paid(to: Address, value: u64) -> StubLedger {
        StubLedger {
            transfer: Some(TransferRecord {
                token: USDC,
                from: address!("0x2222222222222222222222222222222222222222"),
                to,
                value: U256::from(value),
                block_timestamp: UnixTimestamp::now(),
            }),
            down: false,
        }
    }

    fn settlement_harness(ledger: StubLedger) -> Harness {
        let generator = Arc::new(FakeGenerator::default());
        let guard = Arc::new(MemoryReplayGuard::new());
        let orchestrator = Orchestrator::new(Arc::clone(&generator) as Arc<dyn Generator>, Arc::new(FakeProcessor));
        let coordinator = RequestCoordinator::builder(issuer(), orchestrator)
            .verifier(Arc::new(SettlementVerifier::new(ledger, USDC)))
            .replay_guard(Arc::clone(&guard) as Arc<dyn ReplayGuard>)
            .build();
        Harness {
            coordinator: Arc::new(coordinator),
            generator,
            guard,
        }
    }

    #[tokio::test]
    async fn test_settlement_proof_spellings_share_replay_key() {
        let h = settlement_harness(paid(PAYEE, 10_000_000));
        let lower = format!("0x{}", "ab".repeat(32));

        let first = h.coordinator.handle(br#"{"brand":"Acme"}"#, Some(&lower)).await.unwrap();
        assert!(matches!(first, Outcome::Fresh(_)));
        assert!(h.consumed(&lower).await);

        let upper = format!("0x{}", "AB".repeat(32));
        let second = h.coordinator.handle(br#"{"brand":"Globex"}"#, Some(&upper)).await.unwrap();
        assert!(matches!(second, Outcome::ProofReused), "got {second:?}");

        let bare = "ab".repeat(32);
        let third = h.coordinator.handle(br#"{"brand":"Initech"}"#, Some(&bare)).await.unwrap();
        assert!(matches!(third, Outcome::ProofReused), "got {third:?}");
        assert_eq!(h.calls(), 3);
    }

    #[tokio::test]
    async fn test_settlement_rejection_leaves_guard_untouched() {
        let tx = format!("0x{}", "cd".repeat(32));
        let cases = [
            (paid(address!("0x9999999999999999999999999999999999999999"), 10_000_000), RejectReason::WrongPayee),
            (paid(PAYEE, 9_999_999), RejectReason::InsufficientAmount),
            (StubLedger { transfer: None, down: false }, RejectReason::SettlementNotFound),
        ];
        for (ledger, expected) in cases {
            let h = settlement_harness(ledger);
            let outcome = h.coordinator.handle(br#"{"brand":"Acme"}"#, Some(&tx)).await.unwrap();
            let Outcome::PaymentRequired { challenge, reason } = outcome else {
                panic!("expected payment required, got {outcome:?}");
            };
            assert_eq!(reason, expected);
            assert_eq!(challenge.accepts[0].pay_to, "0x1111111111111111111111111111111111111111");
            assert_eq!(h.calls(), 0);
            assert!(!h.consumed(&tx).await);
            assert!(h.guard.try_reserve(&ProofToken::new(tx.as_str())).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_ledger_fault_is_server_error() {
        let h = settlement_harness(StubLedger {
            transfer: None,
            down: true,
        });
        let tx = format!("0x{}", "ef".repeat(32));
        let err = h.coordinator.handle(br#"{"brand":"Acme"}"#, Some(&tx)).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Verifier(VerifierError::Ledger(_))));
        assert!(!err.is_client_error());
        assert_eq!(h.calls(), 0);
        assert!(!h.consumed(&tx).await);
    }

    #[tokio::test]
    async fn test_missing_payee_refuses_requests() {
        let issuer = ChallengeIssuer::new(
            PricingTerms {
                scheme: "erc20".into(),
                network: "base".into(),
                asset: "USDC".into(),
                decimals: USDC_DECIMALS,
                price: 10.0,
                recipient: "  ".into(),
            },
            "POST /v1/logo",
            "logo",
        )
        .unwrap();
        let generator = Arc::new(FakeGenerator::default());
        let orchestrator = Orchestrator::new(Arc::clone(&generator) as Arc<dyn Generator>, Arc::new(FakeProcessor));
        let coordinator = RequestCoordinator::builder(issuer, orchestrator).build();

        for proof in [None, Some(PROOF_A)] {
            let err = coordinator.handle(br#"{"brand":"Acme"}"#, proof).await.unwrap_err();
            assert!(matches!(err, CoordinatorError::MissingPayee));
        }
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_burn_policy_parsing() {
        assert_eq!("on-success".parse::<ProofBurnPolicy>(), Ok(ProofBurnPolicy::OnSuccess));
        assert_eq!("always".parse::<ProofBurnPolicy>(), Ok(ProofBurnPolicy::Always));
        assert!("never".parse::<ProofBurnPolicy>().is_err());
        assert_eq!(ProofBurnPolicy::default(), ProofBurnPolicy::OnSuccess);
    }
}
