//! Server configuration.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax. A
//! missing file means all defaults.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 3000
//! public_base_url = "https://logo.example.com"
//!
//! [payment]
//! network = "base"
//! asset = "USDC"
//! price = 10.0
//! recipient = "$PAYMENT_RECIPIENT"
//! burn_policy = "on-success"
//!
//! [openai]
//! api_key = "${OPENAI_API_KEY}"
//! model = "gpt-image-1"
//! ```
//!
//! # Environment Variables
//!
//! These override the file values:
//!
//! - `HOST`, `PORT`, `PUBLIC_BASE_URL`
//! - `PAYMENT_NETWORK`, `PAYMENT_ASSET`, `PRICE_USDC`, `PAYMENT_RECIPIENT`, `REQUIRE_RECIPIENT`
//! - `OPENAI_API_KEY`, `OPENAI_IMAGE_MODEL`

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use logo_agent::amount::{AmountError, USDC_DECIMALS};
use logo_agent::{ChallengeIssuer, OrchestratorConfig, PricingTerms, ProofBurnPolicy};
use logo_agent_imaging::OpenAiImageGenerator;
use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file exists but cannot be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML for this schema.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// An override variable holds an unusable value.
    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
    /// The price cannot be expressed in base units.
    #[error("invalid price: {0}")]
    Price(#[from] AmountError),
    /// A payment recipient is required but not configured.
    #[error("PAYMENT_RECIPIENT must be set")]
    MissingRecipient,
    /// No `OpenAI` API key is configured.
    #[error("OPENAI_API_KEY must be set")]
    MissingApiKey,
}

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `3000`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL (default: `http://localhost:<port>`).
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Static agent registration descriptor served at `/agent-registration.json`.
    #[serde(default = "default_registration_file")]
    pub registration_file: PathBuf,

    /// Pricing and payment verification.
    #[serde(default)]
    pub payment: PaymentConfig,

    /// Image generation API.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Candidate export settings.
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Pricing terms and payment verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// Payment scheme advertised to clients.
    pub scheme: String,
    /// Network name.
    pub network: String,
    /// Asset symbol.
    pub asset: String,
    /// Decimal exponent of the asset.
    pub decimals: u32,
    /// Price in whole asset units.
    pub price: f64,
    /// Payee address.
    pub recipient: String,
    /// Refuse to start without a recipient.
    pub require_recipient: bool,
    /// Minimum accepted proof length.
    pub min_proof_len: usize,
    /// What happens to a proof when generation fails.
    pub burn_policy: ProofBurnPolicy,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            scheme: "erc20".to_owned(),
            network: "base".to_owned(),
            asset: "USDC".to_owned(),
            decimals: USDC_DECIMALS,
            price: 10.0,
            recipient: String::new(),
            require_recipient: false,
            min_proof_len: 10,
            burn_policy: ProofBurnPolicy::default(),
        }
    }
}

impl PaymentConfig {
    /// Whether a payee address is configured.
    #[must_use]
    pub fn has_recipient(&self) -> bool {
        !is_unset(&self.recipient)
    }

    /// Returns the pricing terms for the challenge issuer.
    #[must_use]
    pub fn pricing_terms(&self) -> PricingTerms {
        PricingTerms {
            scheme: self.scheme.clone(),
            network: self.network.clone(),
            asset: self.asset.clone(),
            decimals: self.decimals,
            price: self.price,
            recipient: if self.has_recipient() {
                self.recipient.trim().to_owned()
            } else {
                String::new()
            },
        }
    }

    /// Builds the challenge issuer for `resource`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Price`] if the price cannot be converted.
    pub fn challenge_issuer(&self, resource: &str, description: &str) -> Result<ChallengeIssuer, ConfigError> {
        Ok(ChallengeIssuer::new(self.pricing_terms(), resource, description)?)
    }
}

/// `OpenAI` Images API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// API key. Supports `$VAR` / `${VAR}` expansion.
    pub api_key: String,
    /// Image model.
    pub model: String,
    /// API base URL.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: OpenAiImageGenerator::DEFAULT_MODEL.to_owned(),
            base_url: OpenAiImageGenerator::DEFAULT_BASE_URL.to_owned(),
            timeout_secs: None,
        }
    }
}

/// Candidate generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Size requested from the image API.
    pub source_size: u32,
    /// Exported sizes, in output order.
    pub export_sizes: Vec<u32>,
    /// Limit applied to every generation and post-processing call, in seconds.
    pub call_timeout_secs: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            source_size: defaults.source_size,
            export_sizes: defaults.export_sizes,
            call_timeout_secs: None,
        }
    }
}

impl GenerationConfig {
    /// Converts into orchestrator settings.
    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            source_size: self.source_size,
            export_sizes: self.export_sizes.clone(),
            call_timeout: self.call_timeout_secs.map(Duration::from_secs),
        }
    }
}

const fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    3000
}

fn default_registration_file() -> PathBuf {
    PathBuf::from("public/agent-registration.json")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_base_url: None,
            registration_file: default_registration_file(),
            payment: PaymentConfig::default(),
            openai: OpenAiConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from `path` and the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or an
    /// override variable is invalid.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = if path.exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_owned(),
                source,
            })?
        } else {
            String::new()
        };
        Self::from_toml(&content, |name| std::env::var(name).ok())
    }

    /// Parses `content`, expanding and overriding values through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if parsing fails or an override is invalid.
    pub fn from_toml<F>(content: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expanded = expand_env_vars(content, &lookup);
        let mut config: Self = toml::from_str(&expanded)?;
        config.apply_overrides(&lookup)?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.host = parse_env("HOST", host)?;
        }
        if let Some(port) = lookup("PORT") {
            self.port = parse_env("PORT", port)?;
        }
        if let Some(url) = lookup("PUBLIC_BASE_URL") {
            self.public_base_url = Some(url);
        }
        if let Some(network) = lookup("PAYMENT_NETWORK") {
            self.payment.network = network;
        }
        if let Some(asset) = lookup("PAYMENT_ASSET") {
            self.payment.asset = asset;
        }
        if let Some(price) = lookup("PRICE_USDC") {
            self.payment.price = parse_env("PRICE_USDC", price)?;
        }
        if let Some(recipient) = lookup("PAYMENT_RECIPIENT") {
            self.payment.recipient = recipient;
        }
        if let Some(required) = lookup("REQUIRE_RECIPIENT") {
            self.payment.require_recipient = required == "true";
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.openai.api_key = key;
        }
        if let Some(model) = lookup("OPENAI_IMAGE_MODEL") {
            self.openai.model = model;
        }
        Ok(())
    }

    /// Checks the settings required to serve paid requests.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingApiKey`] without an API key,
    /// [`ConfigError::MissingRecipient`] when a required recipient is absent,
    /// and [`ConfigError::Price`] for an unconvertible price.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if is_unset(&self.openai.api_key) {
            return Err(ConfigError::MissingApiKey);
        }
        if self.payment.require_recipient && !self.payment.has_recipient() {
            return Err(ConfigError::MissingRecipient);
        }
        logo_agent::amount::to_base_units(self.payment.price, self.payment.decimals)?;
        Ok(())
    }

    /// Externally reachable base URL.
    #[must_use]
    pub fn public_base_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.port))
    }
}

/// Empty, or an unexpanded `$VAR` reference.
fn is_unset(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.starts_with('$')
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { name, value })
}

/// Expands `$VAR` and `${VAR}` patterns through `lookup`.
///
/// Unresolved variables are left as-is.
fn expand_env_vars<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }

        let mut var_name = String::new();
        let mut closed = false;
        while let Some(&c) = chars.peek() {
            if braced {
                if c == '}' {
                    chars.next();
                    closed = true;
                    break;
                }
            } else if !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            var_name.push(c);
            chars.next();
        }

        match lookup(&var_name).filter(|_| !var_name.is_empty()) {
            Some(value) => result.push_str(&value),
            None => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&var_name);
                if closed {
                    result.push('}');
                }
            }
        }
    }

    result
}
