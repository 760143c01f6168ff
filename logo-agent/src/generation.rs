//! Generation orchestration.
//!
//! The [`Orchestrator`] turns prompts into [`Candidate`]s by calling an
//! external [`Generator`] once per prompt and a [`PostProcessor`] once per
//! export size. Candidates are produced concurrently and returned
//! index-aligned with the prompts. Any failure aborts the whole run; partial
//! results are never returned.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::try_join_all;
#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::digest::Digest;
use crate::fulfillment::{Candidate, ExportedFile};

/// Boxed error source used by external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Content type of the default export format.
pub const PNG_CONTENT_TYPE: &str = "image/png";

/// Errors reported by a [`Generator`].
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
    /// The upstream service throttled the request.
    #[error("rate limited by image service")]
    RateLimited,
    /// The upstream service answered with a non-success status.
    #[error("image service returned {status}: {body}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The response did not contain an image.
    #[error("malformed image service response: {0}")]
    Malformed(String),
}

/// Errors reported by a [`PostProcessor`].
#[derive(Debug, thiserror::Error)]
pub enum PostProcessError {
    /// The raw image could not be decoded.
    #[error("cannot decode image: {0}")]
    Decode(String),
    /// The normalized image could not be encoded.
    #[error("cannot encode image: {0}")]
    Encode(String),
    /// The worker running the conversion failed.
    #[error("image worker failed: {0}")]
    Task(String),
}

/// Errors that abort a generation run.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Generating a raw image failed.
    #[error("candidate {index}: {source}")]
    Generator {
        /// Candidate index.
        index: usize,
        /// Underlying failure.
        #[source]
        source: GeneratorError,
    },
    /// Normalizing a raw image failed.
    #[error("candidate {index} at {size}px: {source}")]
    PostProcess {
        /// Candidate index.
        index: usize,
        /// Requested export size.
        size: u32,
        /// Underlying failure.
        #[source]
        source: PostProcessError,
    },
    /// An external call exceeded the configured timeout.
    #[error("candidate {index}: {stage} timed out after {after:?}")]
    Timeout {
        /// Candidate index.
        index: usize,
        /// Which call timed out.
        stage: &'static str,
        /// Configured limit.
        after: Duration,
    },
}

/// External image generation service.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produces raw image bytes for `prompt` at `size` x `size` pixels.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError`] if no image could be produced.
    async fn generate(&self, prompt: &str, size: u32) -> Result<Vec<u8>, GeneratorError>;
}

/// Image normalizer producing export files.
#[async_trait]
pub trait PostProcessor: Send + Sync {
    /// Converts `raw` into a square `size` x `size` image with transparent padding.
    ///
    /// # Errors
    ///
    /// Returns [`PostProcessError`] if the conversion fails.
    async fn normalize(&self, raw: &[u8], size: u32) -> Result<Vec<u8>, PostProcessError>;

    /// MIME type of the produced files.
    fn content_type(&self) -> &'static str {
        PNG_CONTENT_TYPE
    }
}

/// File extension for an export MIME type; unknown types get `bin`.
fn file_extension(content_type: &str) -> &'static str {
    match content_type {
        PNG_CONTENT_TYPE => "png",
        "image/webp" => "webp",
        "image/jpeg" => "jpg",
        "image/svg+xml" => "svg",
        _ => "bin",
    }
}

/// Tunables of an [`Orchestrator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Size requested from the generator.
    pub source_size: u32,
    /// Export sizes, in output order.
    pub export_sizes: Vec<u32>,
    /// Limit applied to every external call, if any.
    pub call_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            source_size: 1024,
            export_sizes: vec![1024, 512, 256],
            call_timeout: None,
        }
    }
}

/// Drives generation and post-processing for a set of prompts.
#[derive(Clone)]
pub struct Orchestrator {
    generator: Arc<dyn Generator>,
    post_processor: Arc<dyn PostProcessor>,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator with the default configuration.
    pub fn new(generator: Arc<dyn Generator>, post_processor: Arc<dyn PostProcessor>) -> Self {
        Self {
            generator,
            post_processor,
            config: OrchestratorConfig::default(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Produces one candidate per prompt.
    ///
    /// # Errors
    ///
    /// Returns the first [`GenerationError`] hit by any candidate; the
    /// remaining in-flight work is dropped.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(candidates = prompts.len())))]
    pub async fn run(&self, prompts: &[String]) -> Result<Vec<Candidate>, GenerationError> {
        try_join_all(
            prompts
                .iter()
                .enumerate()
                .map(|(index, prompt)| self.candidate(index, prompt)),
        )
        .await
    }

    async fn candidate(&self, index: usize, prompt: &str) -> Result<Candidate, GenerationError> {
        let raw = self
            .bounded(index, "generate", self.generator.generate(prompt, self.config.source_size))
            .await?
            .map_err(|source| GenerationError::Generator { index, source })?;

        let mut files = Vec::with_capacity(self.config.export_sizes.len());
        for &size in &self.config.export_sizes {
            let data = self
                .bounded(index, "normalize", self.post_processor.normalize(&raw, size))
                .await?
                .map_err(|source| GenerationError::PostProcess {
                    index,
                    size,
                    source,
                })?;
            let content_type = self.post_processor.content_type();
            files.push(ExportedFile {
                name: format!("logo_{}_{size}.{}", index + 1, file_extension(content_type)),
                content_type: content_type.to_owned(),
                size,
                transparent: true,
                sha256: Digest::of(&data),
                data,
            });
        }

        #[cfg(feature = "telemetry")]
        tracing::debug!(index, files = files.len(), "candidate ready");

        Ok(Candidate {
            index,
            prompt: prompt.to_owned(),
            files,
        })
    }

    /// Applies the configured call timeout to `fut`.
    async fn bounded<T>(
        &self,
        index: usize,
        stage: &'static str,
        fut: impl Future<Output = T> + Send,
    ) -> Result<T, GenerationError> {
        match self.config.call_timeout {
            Some(after) => tokio::time::timeout(after, fut)
                .await
                .map_err(|_| GenerationError::Timeout {
                    index,
                    stage,
                    after,
                }),
            None => Ok(fut.await),
        }
    }
}
