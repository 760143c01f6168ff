//! SHA-256 digests, canonical JSON, and request fingerprints.
//!
//! A [`Fingerprint`] is the sole identity of a request for idempotency: two
//! requests are the same iff their fingerprints are byte-for-byte equal. It is
//! computed over a canonical JSON rendering so that input key order and
//! whitespace never influence the result.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use alloy_primitives::hex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest as _, Sha256};

use crate::prompting::GenerationSpec;
use crate::request::LogoRequest;

/// Prefix used in the textual form of a [`Digest`].
pub const DIGEST_PREFIX: &str = "sha256:";

/// A 32-byte SHA-256 content hash.
///
/// Displayed and serialized as `sha256:<lowercase hex>`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Hashes `bytes` with SHA-256.
    #[must_use]
    pub fn of(bytes: impl AsRef<[u8]>) -> Self {
        Self(Sha256::digest(bytes.as_ref()).into())
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{DIGEST_PREFIX}{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

/// Error returned when parsing a `sha256:<hex>` string fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid digest: {0}")]
pub struct DigestParseError(String);

impl FromStr for Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s
            .strip_prefix(DIGEST_PREFIX)
            .ok_or_else(|| DigestParseError(format!("missing `{DIGEST_PREFIX}` prefix")))?;
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_part, &mut bytes)
            .map_err(|e| DigestParseError(e.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Content hash identifying a logically unique request.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(Digest);

impl Fingerprint {
    /// Computes the fingerprint of a request, its derived spec, and its prompts.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if any input fails to serialize, which
    /// does not happen for validated requests.
    pub fn compute(
        request: &LogoRequest,
        spec: &GenerationSpec,
        prompts: &[String],
    ) -> Result<Self, serde_json::Error> {
        #[derive(Serialize)]
        struct Material<'a> {
            body: &'a LogoRequest,
            spec: &'a GenerationSpec,
            prompts: &'a [String],
        }
        let value = serde_json::to_value(Material {
            body: request,
            spec,
            prompts,
        })?;
        Ok(Self(Digest::of(to_canonical_json(&value)?)))
    }

    /// Returns the underlying digest.
    #[must_use]
    pub const fn digest(&self) -> &Digest {
        &self.0
    }
}

impl From<Digest> for Fingerprint {
    fn from(digest: Digest) -> Self {
        Self(digest)
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.0)
    }
}

/// Renders a JSON value canonically: object keys sorted, no whitespace.
///
/// # Errors
///
/// Returns [`serde_json::Error`] if a string or key fails to encode.
pub fn to_canonical_json(value: &Value) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), serde_json::Error> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&serde_json::to_string(s)?),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(item, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompting::build_prompts;
    use serde_json::json;

    fn fingerprint_of(raw: &str) -> Fingerprint {
        let request = LogoRequest::parse(raw.as_bytes()).unwrap();
        let spec = GenerationSpec::from_request(&request);
        let prompts = build_prompts(&spec);
        Fingerprint::compute(&request, &spec, &prompts).unwrap()
    }

    #[test]
    fn test_digest_display_and_parse() {
        let digest = Digest::of(b"abc");
        let text = digest.to_string();
        assert_eq!(
            text,
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(text.parse::<Digest>().unwrap(), digest);
        assert!("ba7816bf".parse::<Digest>().is_err());
        assert!("sha256:zz".parse::<Digest>().is_err());
    }

    #[test]
    fn test_digest_serializes_as_string() {
        let digest = Digest::of(b"");
        let serialized = serde_json::to_value(digest).unwrap();
        assert_eq!(serialized, json!(digest.to_string()));
        let back: Digest = serde_json::from_value(serialized).unwrap();
        assert_eq!(back, digest);
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let value = json!({ "z": [ { "y": "yes", "b": null } ], "a": { "x": 10 } });
        assert_eq!(
            to_canonical_json(&value).unwrap(),
            r#"{"a":{"x":10},"z":[{"b":null,"y":"yes"}]}"#
        );
    }

    #[test]
    fn test_fingerprint_ignores_key_order_and_whitespace() {
        let a = fingerprint_of(r#"{"brand":"Acme","industry":"fintech","colors":["navy","gold"]}"#);
        let b = fingerprint_of(
            r#"{
                "colors": ["navy", "gold"],
                "industry": "fintech",
                "brand": "Acme"
            }"#,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_distinguishes_content() {
        let base = fingerprint_of(r#"{"brand":"Acme"}"#);
        assert_ne!(base, fingerprint_of(r#"{"brand":"Acme Co"}"#));
        assert_ne!(base, fingerprint_of(r#"{"brand":"Acme","requestId":"req-000001"}"#));
        assert_ne!(
            fingerprint_of(r#"{"brand":"Acme","colors":["red","blue"]}"#),
            fingerprint_of(r#"{"brand":"Acme","colors":["blue","red"]}"#)
        );
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(
            fingerprint_of(r#"{"brand":"Acme"}"#),
            fingerprint_of(r#"{"brand":"Acme"}"#)
        );
    }
}
