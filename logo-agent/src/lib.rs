#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Payment-gated idempotent request protocol for the logo agent.
//!
//! A client posts a branding request. The request is validated, expanded into a
//! generation spec and a fixed set of prompts, and fingerprinted. A fingerprint
//! that was already fulfilled is answered from the job store for free; anything
//! else requires a payment proof. A missing or invalid proof yields a fresh
//! payment challenge. A valid proof is checked against the replay guard, the
//! generation collaborators are driven, and the first successful fulfillment is
//! cached under the fingerprint.
//!
//! # Modules
//!
//! - [`amount`] - Human price to asset base-unit conversion
//! - [`challenge`] - Payment challenge issuance
//! - [`coordinator`] - End-to-end request protocol
//! - [`digest`] - SHA-256 digests, canonical JSON and request fingerprints
//! - [`error`] - Coordinator and storage error types
//! - [`fulfillment`] - Fulfillment result wire types
//! - [`generation`] - Generator / post-processor capabilities and the orchestrator
//! - [`prompting`] - Generation spec derivation and prompt building
//! - [`request`] - Request schema and validation
//! - [`store`] - Replay guard and idempotency store
//! - [`timestamp`] - Unix timestamps for proof recency windows
//! - [`verifier`] - Pluggable payment verification
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod amount;
pub mod challenge;
pub mod coordinator;
pub mod digest;
pub mod error;
pub mod fulfillment;
pub mod generation;
pub mod prompting;
pub mod request;
pub mod store;
pub mod timestamp;
pub mod verifier;

pub use challenge::{AcceptedMethod, ChallengeIssuer, PaymentChallenge, PaymentId, PricingTerms};
pub use coordinator::{Outcome, ProofBurnPolicy, RequestCoordinator, RequestCoordinatorBuilder};
pub use digest::{Digest, Fingerprint};
pub use error::{CoordinatorError, StoreError};
pub use fulfillment::{Candidate, ExportedFile, FulfillmentResult, PricingSnapshot};
pub use generation::{
    GenerationError, Generator, GeneratorError, Orchestrator, OrchestratorConfig, PostProcessError,
    PostProcessor,
};
pub use request::{LogoRequest, ValidationError};
pub use store::{JobStore, MemoryJobStore, MemoryReplayGuard, ReplayGuard};
pub use verifier::{
    PaymentVerifier, ProofToken, RejectReason, SettlementLedger, SettlementVerifier,
    SyntacticVerifier, Verification, VerifierError,
};
