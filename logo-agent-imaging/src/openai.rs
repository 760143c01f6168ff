//! A [`Generator`] backed by the `OpenAI` Images API.
//!
//! [`OpenAiImageGenerator`] sends `POST {base}/images/generations` with a
//! bearer token and reads the first returned image, either inline
//! (`b64_json`) or by downloading the hosted `url`.
//!
//! ## Error Handling
//!
//! Failures are reported as [`GeneratorError`]s:
//! - transport failures carry an [`OpenAiClientError`] with request context
//! - HTTP 429 is [`GeneratorError::RateLimited`]
//! - other non-success statuses are [`GeneratorError::Upstream`]
//! - responses without a usable image are [`GeneratorError::Malformed`]

use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use http::StatusCode;
use logo_agent::generation::{Generator, GeneratorError};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::instrument;

/// Errors raised while building or sending requests to the Images API.
#[derive(Debug, thiserror::Error)]
pub enum OpenAiClientError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

impl OpenAiClientError {
    fn transport(context: &'static str, source: reqwest::Error) -> GeneratorError {
        GeneratorError::Transport(Box::new(Self::Http { context, source }))
    }
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: String,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    b64_json: Option<String>,
    url: Option<String>,
}

/// Client for the `OpenAI` Images API.
#[derive(Clone)]
pub struct OpenAiImageGenerator {
    /// Base URL of the API (e.g. `https://api.openai.com/v1/`)
    base_url: Url,
    /// Full URL of `POST /images/generations`
    generations_url: Url,
    /// Shared Reqwest HTTP client
    client: Client,
    /// Bearer token
    api_key: String,
    /// Image model name
    model: String,
    /// Optional per-request timeout
    timeout: Option<Duration>,
}

impl std::fmt::Debug for OpenAiImageGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiImageGenerator")
            .field("base_url", &self.base_url.as_str())
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OpenAiImageGenerator {
    /// Public API base URL.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1/";

    /// Default image model.
    pub const DEFAULT_MODEL: &'static str = "gpt-image-1";

    /// Constructs a client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`OpenAiClientError`] if URL construction fails.
    pub fn try_new(base_url: Url, api_key: impl Into<String>) -> Result<Self, OpenAiClientError> {
        let generations_url =
            base_url
                .join("./images/generations")
                .map_err(|e| OpenAiClientError::UrlParse {
                    context: "Failed to construct ./images/generations URL",
                    source: e,
                })?;
        Ok(Self {
            base_url,
            generations_url,
            client: Client::new(),
            api_key: api_key.into(),
            model: Self::DEFAULT_MODEL.to_owned(),
            timeout: None,
        })
    }

    /// Constructs a client from a base URL string, normalizing the trailing slash.
    ///
    /// # Errors
    ///
    /// Returns [`OpenAiClientError`] if the URL cannot be parsed.
    pub fn from_base_url(base_url: &str, api_key: impl Into<String>) -> Result<Self, OpenAiClientError> {
        let mut normalized = base_url.trim_end_matches('/').to_owned();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| OpenAiClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Self::try_new(url, api_key)
    }

    /// Sets the image model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets a timeout for every request.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the base URL used by this client.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed `./images/generations` URL.
    #[must_use]
    pub const fn generations_url(&self) -> &Url {
        &self.generations_url
    }

    /// Returns the configured model.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request_image(&self, prompt: &str, size: u32) -> Result<GeneratedImage, GeneratorError> {
        let context = "POST /images/generations";
        let body = GenerationRequest {
            model: &self.model,
            prompt,
            size: format!("{size}x{size}"),
        };
        let mut req = self
            .client
            .post(self.generations_url.clone())
            .bearer_auth(&self.api_key)
            .json(&body);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req
            .send()
            .await
            .map_err(|e| OpenAiClientError::transport(context, e))?;
        let response = check_status(response, context).await?;
        let parsed = response
            .json::<GenerationResponse>()
            .await
            .map_err(|e| GeneratorError::Malformed(format!("{context}: {e}")))?;
        parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| GeneratorError::Malformed("response missing data[0]".to_owned()))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, GeneratorError> {
        let context = "GET image url";
        let url = Url::parse(url)
            .map_err(|e| GeneratorError::Malformed(format!("invalid image url: {e}")))?;
        let mut req = self.client.get(url);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req
            .send()
            .await
            .map_err(|e| OpenAiClientError::transport(context, e))?;
        let response = check_status(response, context).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| OpenAiClientError::transport(context, e))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Generator for OpenAiImageGenerator {
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "openai.images.generate", skip_all, err, fields(model = %self.model, size))
    )]
    async fn generate(&self, prompt: &str, size: u32) -> Result<Vec<u8>, GeneratorError> {
        let image = self.request_image(prompt, size).await?;
        if let Some(encoded) = image.b64_json {
            return BASE64_STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| GeneratorError::Malformed(format!("invalid b64_json: {e}")));
        }
        if let Some(url) = image.url {
            #[cfg(feature = "telemetry")]
            tracing::debug!("downloading hosted image");
            return self.download(&url).await;
        }
        Err(GeneratorError::Malformed(
            "response missing b64_json/url".to_owned(),
        ))
    }
}

/// Maps a non-success response to [`GeneratorError`].
async fn check_status(response: Response, context: &'static str) -> Result<Response, GeneratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(GeneratorError::RateLimited);
    }
    let body = response
        .text()
        .await
        .map_err(|e| OpenAiClientError::transport(context, e))?;
    Err(GeneratorError::Upstream {
        status: status.as_u16(),
        body,
    })
}
