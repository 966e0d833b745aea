//! Main entry point for the image generation orchestrator

use image_gen_orchestrator::{config::Settings, AppState};
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::load()?;
    settings.validate()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    if settings.logging.format == "pretty" {
        registry.with(fmt::layer().pretty()).init();
    } else {
        registry.with(fmt::layer().json()).init();
    }

    info!("Starting image generation orchestrator");
    info!(
        "Loaded configuration: server={}:{}, providers={}",
        settings.server.host,
        settings.server.port,
        settings.providers.len()
    );

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let cleanup_interval = Duration::from_secs(settings.rate_limit.cleanup_interval_secs);

    let state = AppState::from_settings(settings)?;

    let loaded = state.registry.reload().await?;
    if loaded == 0 {
        warn!("No image providers loaded; generation requests will fail until configs are added");
    }

    state.limiter.start_cleanup(cleanup_interval).await;

    let app = state
        .blob_router()
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CorsLayer::permissive());

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    state.limiter.stop_cleanup().await;
    info!("Shutdown complete");

    Ok(())
}
