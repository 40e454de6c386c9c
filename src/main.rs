//! bank_aggregator - Open-Banking aggregation backend
//!
//! Connects to several sandbox banks on behalf of a user and serves a
//! merged view of accounts, balances and transactions, plus payments and
//! product agreements, over a small JSON API.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bank_aggregator::api::{self, AppState};
use bank_aggregator::{BankAggregator, Config};

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bank_aggregator=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let production = std::env::var("ENVIRONMENT").is_ok_and(|env| env == "production");
    init_tracing(production);

    // Load configuration
    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(
        providers = ?config.provider_codes(),
        environment = %config.environment,
        "Starting bank aggregator"
    );

    let aggregator = Arc::new(BankAggregator::from_config(&config)?);

    let shutdown = CancellationToken::new();
    let state = AppState::new(aggregator, config.request_timeout).with_shutdown(shutdown.clone());
    let app = api::build_router(state, &config.cors_origin);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("Server stopped. Goodbye!");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then cancel every in-flight operation
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }

    shutdown.cancel();
}
