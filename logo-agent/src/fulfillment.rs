//! Fulfillment result wire types.
//!
//! A [`FulfillmentResult`] is immutable once stored: the same value is
//! serialized for the original success and for every idempotent replay, so
//! both responses are byte-identical.

use serde::{Deserialize, Serialize};

use crate::digest::{Digest, Fingerprint};

/// Status reported by a successful fulfillment.
pub const STATUS_FULFILLED: &str = "fulfilled";

/// Price terms in force when a result was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingSnapshot {
    /// Network name.
    pub network: String,
    /// Asset symbol.
    pub asset: String,
    /// Human price in whole asset units.
    pub price: f64,
}

/// One exported image file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedFile {
    /// Download file name (e.g. `logo_1_512.png`).
    pub name: String,
    /// MIME type of the payload.
    pub content_type: String,
    /// Edge length in pixels of the square image.
    pub size: u32,
    /// Whether the padding is transparent.
    pub transparent: bool,
    /// Content hash of [`Self::data`].
    pub sha256: Digest,
    /// Raw file bytes, base64 on the wire.
    #[serde(rename = "dataBase64", with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// One generated visual option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Zero-based position, aligned with the prompt list.
    pub index: usize,
    /// Prompt the candidate was generated from.
    pub prompt: String,
    /// Exported sizes in configured order.
    pub files: Vec<ExportedFile>,
}

/// Final result of a paid request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentResult {
    /// Always [`STATUS_FULFILLED`].
    pub status: String,
    /// Pricing snapshot.
    pub pricing: PricingSnapshot,
    /// Fingerprint of the request that was fulfilled.
    #[serde(rename = "requestHash")]
    pub fingerprint: Fingerprint,
    /// Candidates, index-aligned with the prompts.
    pub candidates: Vec<Candidate>,
}

impl FulfillmentResult {
    /// Creates a fulfilled result.
    #[must_use]
    pub fn fulfilled(
        pricing: PricingSnapshot,
        fingerprint: Fingerprint,
        candidates: Vec<Candidate>,
    ) -> Self {
        Self {
            status: STATUS_FULFILLED.to_owned(),
            pricing,
            fingerprint,
            candidates,
        }
    }
}

mod base64_bytes {
    use base64::prelude::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        BASE64_STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
