//! Payment challenge issuance.
//!
//! A [`PaymentChallenge`] tells an unpaid client how to pay: a fresh opaque
//! [`PaymentId`] and the ordered list of [`AcceptedMethod`]s. Issuing a
//! challenge has no side effects; a client may receive a different payment id
//! on every unpaid attempt.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amount::{AmountError, to_base_units};
use crate::fulfillment::PricingSnapshot;

/// Error code carried in the body of every payment-required response.
pub const PAYMENT_REQUIRED_ERROR: &str = "payment_required";

/// Opaque, globally unique payment session identifier (`pay_<32 hex>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    /// Prefix of every payment id.
    pub const PREFIX: &'static str = "pay_";

    /// Generates a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, Uuid::new_v4().simple()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PaymentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One way of paying for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedMethod {
    /// Payment scheme (e.g. `erc20`).
    pub scheme: String,
    /// Network name (e.g. `base`).
    pub network: String,
    /// Asset symbol (e.g. `USDC`).
    pub asset: String,
    /// Payee address.
    pub pay_to: String,
    /// Price in the asset's smallest unit, as a decimal string.
    pub max_amount_required: String,
    /// Resource being paid for (e.g. `POST /v1/logo`).
    pub resource: String,
    /// Human-readable description of what is bought.
    pub description: String,
}

impl AcceptedMethod {
    /// Parses [`Self::max_amount_required`] into base units.
    #[must_use]
    pub fn amount_base_units(&self) -> Option<u128> {
        self.max_amount_required.parse().ok()
    }
}

/// Machine-readable "payment required" descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentChallenge {
    /// Fresh payment session id.
    pub payment_id: PaymentId,
    /// Accepted payment methods, in order of preference.
    pub accepts: Vec<AcceptedMethod>,
}

impl PaymentChallenge {
    /// Renders the 402 response body:
    /// `{ "error": "payment_required", "paymentId": ..., "accepts": [...] }`.
    #[must_use]
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({
            "error": PAYMENT_REQUIRED_ERROR,
            "paymentId": self.payment_id,
            "accepts": self.accepts,
        })
    }
}

/// Pricing, network, asset and recipient configuration for a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingTerms {
    /// Payment scheme advertised to clients.
    pub scheme: String,
    /// Network name.
    pub network: String,
    /// Asset symbol.
    pub asset: String,
    /// Decimal exponent of the asset.
    pub decimals: u32,
    /// Human price in whole asset units.
    pub price: f64,
    /// Payee address.
    pub recipient: String,
}

/// Builds payment challenges for one resource.
#[derive(Debug, Clone)]
pub struct ChallengeIssuer {
    terms: PricingTerms,
    accepts: Vec<AcceptedMethod>,
}

impl ChallengeIssuer {
    /// Creates an issuer, converting the price into base units once.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError`] if the price cannot be expressed in base units.
    pub fn new(
        terms: PricingTerms,
        resource: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, AmountError> {
        let amount = to_base_units(terms.price, terms.decimals)?;
        let accepts = vec![AcceptedMethod {
            scheme: terms.scheme.clone(),
            network: terms.network.clone(),
            asset: terms.asset.clone(),
            pay_to: terms.recipient.clone(),
            max_amount_required: amount.to_string(),
            resource: resource.into(),
            description: description.into(),
        }];
        Ok(Self { terms, accepts })
    }

    /// Appends another accepted method after the primary one.
    #[must_use]
    pub fn with_method(mut self, method: AcceptedMethod) -> Self {
        self.accepts.push(method);
        self
    }

    /// Whether any accepted method names a payee.
    #[must_use]
    pub fn has_payee(&self) -> bool {
        self.accepts.iter().any(|method| !method.pay_to.trim().is_empty())
    }

    /// Returns the accepted methods shared by every issued challenge.
    #[must_use]
    pub fn accepts(&self) -> &[AcceptedMethod] {
        &self.accepts
    }

    /// Returns the pricing terms.
    #[must_use]
    pub const fn terms(&self) -> &PricingTerms {
        &self.terms
    }

    /// Returns the pricing snapshot embedded into fulfillments.
    #[must_use]
    pub fn pricing(&self) -> PricingSnapshot {
        PricingSnapshot {
            network: self.terms.network.clone(),
            asset: self.terms.asset.clone(),
            price: self.terms.price,
        }
    }

    /// Issues a challenge with a freshly generated payment id.
    #[must_use]
    pub fn issue(&self) -> PaymentChallenge {
        PaymentChallenge {
            payment_id: PaymentId::generate(),
            accepts: self.accepts.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::USDC_DECIMALS;

    fn terms(price: f64) -> PricingTerms {
        PricingTerms {
            scheme: "erc20".into(),
            network: "base".into(),
            asset: "USDC".into(),
            decimals: USDC_DECIMALS,
            price,
            recipient: "0x1111111111111111111111111111111111111111".into(),
        }
    }

    fn issuer(price: f64) -> ChallengeIssuer {
        ChallengeIssuer::new(terms(price), "POST /v1/logo", "Generate 3 logo icon candidates")
            .unwrap()
    }

    #[test]
    fn test_amount_in_base_units() {
        assert_eq!(issuer(10.0).accepts()[0].max_amount_required, "10000000");
        assert_eq!(issuer(0.000_001).accepts()[0].max_amount_required, "1");
        assert_eq!(issuer(10.0).accepts()[0].amount_base_units(), Some(10_000_000));
    }

    #[test]
    fn test_invalid_price_rejected() {
        assert!(ChallengeIssuer::new(terms(-2.0), "r", "d").is_err());
    }

    #[test]
    fn test_payment_ids_are_fresh() {
        let issuer = issuer(10.0);
        let a = issuer.issue();
        let b = issuer.issue();
        assert_ne!(a.payment_id, b.payment_id);
        assert_eq!(a.accepts, b.accepts);
        let id = a.payment_id.as_str();
        assert!(id.starts_with(PaymentId::PREFIX));
        assert_eq!(id.len(), PaymentId::PREFIX.len() + 32);
        assert!(id[PaymentId::PREFIX.len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_body_shape() {
        let challenge = issuer(10.0).issue();
        let body = challenge.to_body();
        assert_eq!(body["error"], PAYMENT_REQUIRED_ERROR);
        assert_eq!(body["paymentId"], challenge.payment_id.as_str());
        let method = &body["accepts"][0];
        assert_eq!(method["scheme"], "erc20");
        assert_eq!(method["payTo"], "0x1111111111111111111111111111111111111111");
        assert_eq!(method["maxAmountRequired"], "10000000");
        assert_eq!(method["resource"], "POST /v1/logo");
    }

    #[test]
    fn test_extra_methods_keep_order() {
        let mut extra = issuer(10.0).accepts()[0].clone();
        extra.network = "base-sepolia".into();
        let issuer = issuer(10.0).with_method(extra);
        let challenge = issuer.issue();
        assert_eq!(challenge.accepts.len(), 2);
        assert_eq!(challenge.accepts[0].network, "base");
        assert_eq!(challenge.accepts[1].network, "base-sepolia");
    }
}
