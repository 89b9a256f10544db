//! Subgate Web server
//!
//! Paystack-backed subscription gate.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use subgate_web::config::AppConfig;
use subgate_web::cors::cors_layer;
use subgate_web::handlers::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Local secrets first; neither file is required
    dotenv::from_filename("key.env").ok();
    dotenv::dotenv().ok();

    let config = AppConfig::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if config.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!(?config, "Configuration loaded");

    let (state, processor_handle) =
        AppState::from_config(&config).context("cannot start subscription gate")?;
    tokio::spawn(processor_handle.run());

    let app = router(Arc::new(state)).layer(cors_layer(&config.cors_origins));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;

    tracing::info!(
        "Subgate Web {} listening on {} (callback {})",
        subgate_web::VERSION,
        addr,
        config.callback_url()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
