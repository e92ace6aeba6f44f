// Main entry point for the catalog sync server

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use server_core::{
    kernel::{build_pipeline, RunDispatcher},
    server::build_app,
    Config,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,catalog_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting catalog sync server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        repository = %format!("{}/{}", config.repository_owner, config.repository_name),
        canonical_branch = %config.canonical_branch,
        data_types = ?config.enabled_data_types,
        "Configuration loaded"
    );

    // Build pipeline
    let pipeline = build_pipeline(&config).context("Failed to build pipeline")?;
    let dispatcher = Arc::new(RunDispatcher::new(pipeline));

    // Build application
    let app = build_app(dispatcher);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}
