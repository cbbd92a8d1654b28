use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rbf_manager::api::{self, ApiState};
use rbf_manager::services::chain::EsploraChainData;
use rbf_manager::{EngineConfig, RbfEngine};

#[tokio::main]
async fn main() -> Result<()> {
    // initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env()?;
    tracing::info!(
        "Network: {}, esplora: {}, sweep fee rate: {} sat/vB",
        config.network,
        config.esplora_url,
        config.sweep_fee_rate
    );
    if let Some(redirect) = &config.redirect {
        tracing::info!(
            "Payments above {} sats are redirected to {}",
            redirect.threshold().to_sat(),
            redirect.address()
        );
    }

    let chain = EsploraChainData::new(&config.esplora_url)
        .context("Failed to create esplora client")?;
    let port = config.port;

    let api_state = ApiState {
        engine: Arc::new(RbfEngine::new(config, Arc::new(chain))),
    };
    let app = api::router(api_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("RBF manager listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down gracefully...");
}
