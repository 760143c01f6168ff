//! Payment-gated logo agent HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p logo-agent-server --release
//!
//! # Run with custom config path
//! CONFIG=/path/to/config.toml cargo run -p logo-agent-server
//!
//! # Configure logging level
//! RUST_LOG=debug cargo run -p logo-agent-server
//! ```
//!
//! A `.env` file in the working directory is loaded before the configuration.
//! See [`logo_agent_server::config`] for the recognized environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use clap::Parser;
use logo_agent::{Orchestrator, RequestCoordinator, SyntacticVerifier};
use logo_agent_imaging::{OpenAiImageGenerator, PngNormalizer};
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use logo_agent_server::config::ServerConfig;
use logo_agent_server::handlers::{AppState, LOGO_DESCRIPTION, LOGO_RESOURCE, logo_router};
use logo_agent_server::util::SigDown;

/// Payment-gated logo generation service.
#[derive(Debug, Parser)]
#[command(name = "logo-agent", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "CONFIG", default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!("logo agent failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load_from(&cli.config)?;
    config.validate()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        public_base_url = %config.public_base_url(),
        network = %config.payment.network,
        asset = %config.payment.asset,
        price = config.payment.price,
        burn_policy = ?config.payment.burn_policy,
        model = %config.openai.model,
        "Loaded configuration"
    );
    if !config.payment.has_recipient() {
        tracing::warn!("PAYMENT_RECIPIENT is empty; POST /v1/logo will fail until it is set");
    }

    let mut generator = OpenAiImageGenerator::from_base_url(&config.openai.base_url, config.openai.api_key.clone())?
        .with_model(config.openai.model.clone());
    if let Some(secs) = config.openai.timeout_secs {
        generator = generator.with_timeout(Duration::from_secs(secs));
    }
    let orchestrator = Orchestrator::new(Arc::new(generator), Arc::new(PngNormalizer::new()))
        .with_config(config.generation.orchestrator_config());

    let issuer = config.payment.challenge_issuer(LOGO_RESOURCE, LOGO_DESCRIPTION)?;
    let coordinator = RequestCoordinator::builder(issuer, orchestrator)
        .verifier(Arc::new(SyntacticVerifier::with_min_len(config.payment.min_proof_len)))
        .burn_policy(config.payment.burn_policy)
        .build();

    let state = AppState::new(coordinator, config.registration_file.clone());
    let app = logo_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let sig_down = SigDown::try_new()?;

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("logo agent listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(sig_down.shutdown_signal())
        .await?;
    sig_down.recv().await;

    tracing::info!("logo agent shut down gracefully");
    Ok(())
}
