//! Moderation Core - content moderation decision engine
//!
//! This service moderates text, image and audio content through ordered
//! chains of interchangeable analysis providers and always answers with a
//! verdict: ALLOW, FLAG or ESCALATE.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

mod api;
mod config;
mod domain;
mod engine;
mod error;
mod logging;
mod providers;

use crate::api::build_router;
use crate::config::Config;
use crate::domain::Modality;
use crate::engine::MultimodalCombiner;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The multimodal combiner, read-only after startup.
    pub combiner: Arc<MultimodalCombiner>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Note: No .env file loaded ({e})");
    }

    logging::init();

    tracing::info!("Starting Moderation Core v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        safe_threshold = config.moderation.safe_threshold,
        flag_threshold = config.moderation.flag_threshold,
        provider_timeout_ms = config.moderation.provider_timeout_ms,
        prefilter_enabled = config.prefilter.enabled,
        "Configuration loaded"
    );

    // Provider chains are fixed for the process lifetime
    let timeout = Duration::from_millis(config.moderation.provider_timeout_ms);
    let registry = providers::build_registry(&config.providers, timeout).map_err(|e| {
        tracing::error!(error = %e, "Failed to build provider registry");
        anyhow::anyhow!("Provider registry error: {}", e)
    })?;

    let combiner = MultimodalCombiner::from_config(&registry, &config)
        .map_err(|e| anyhow::anyhow!("Engine wiring error: {}", e))?;

    for modality in Modality::ALL {
        tracing::info!(
            modality = %modality,
            providers = ?combiner.provider_names(modality),
            "Provider chain ready"
        );
    }

    let state = AppState {
        combiner: Arc::new(combiner),
    };

    let app = build_router(state, config.server.max_body_bytes);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(address = %addr, "Server listening");
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
