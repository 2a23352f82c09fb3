//! MIA API Server
//!
//! Serves the query pipeline over HTTP.
//!
//! Author: hephaex@gmail.com

use anyhow::Context;
use mia_api::{create_router, state::AppState};
use mia_core::{config::AppConfig, telemetry};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration: optional file, environment on top
    let config = match std::env::var("MIA_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };

    telemetry::init_tracing(&config.logging, std::io::stdout)?;
    tracing::debug!(config = ?config.redacted(), "Configuration loaded");

    // Provider clients are built once; missing credentials stop startup here
    let pipeline = mia_rag::build_pipeline(&config)
        .await
        .context("Failed to initialize query pipeline")?;

    let state = Arc::new(AppState::new(config.server.clone(), Arc::new(pipeline)));
    let app = create_router(state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("MIA API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C, then report not-ready while in-flight requests drain
async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, shutting down");
    state.set_ready(false);
}
