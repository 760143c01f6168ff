//! HTTP surface of the payment-gated logo agent.
//!
//! # Modules
//!
//! - [`handlers`] - Axum route handlers and router builder
//! - [`error`] - JSON error responses
//! - [`config`] - Server configuration with environment variable expansion
//! - [`util`] - Graceful shutdown

pub mod config;
pub mod error;
pub mod handlers;
pub mod util;

pub use config::{ConfigError, ServerConfig};
pub use handlers::{AppState, logo_router};
