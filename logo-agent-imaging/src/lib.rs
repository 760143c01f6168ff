#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! External collaborators for logo generation.
//!
//! This crate provides the production implementations of the generation
//! capabilities defined in [`logo_agent::generation`]:
//!
//! - [`OpenAiImageGenerator`] - a [`Generator`](logo_agent::Generator) calling
//!   the `OpenAI` Images API over HTTP
//! - [`PngNormalizer`] - a [`PostProcessor`](logo_agent::PostProcessor)
//!   producing square PNGs with transparent padding
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod normalize;
pub mod openai;

pub use normalize::PngNormalizer;
pub use openai::{OpenAiClientError, OpenAiImageGenerator};
