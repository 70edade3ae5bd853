//! relay-gateway server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints and the
//! background sweeps for the Hub and the rate limiter.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use relay_gateway::app_state::AppState;
use relay_gateway::config::{GatewayConfig, LogFormat};
use relay_gateway::persistence::{InMemoryWebhookStore, PostgresWebhookStore, WebhookStore};
use relay_gateway::router::build_app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    init_tracing(config.log_format);
    tracing::info!(addr = %config.listen_addr, "starting relay-gateway");

    let store = build_store(&config).await?;
    let state = AppState::new(store, &config)?;
    spawn_sweeps(&state, &config);

    let dispatcher = Arc::clone(&state.dispatcher);
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    dispatcher.shutdown().await;
    tracing::info!("relay-gateway stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn build_store(config: &GatewayConfig) -> anyhow::Result<Arc<dyn WebhookStore>> {
    if !config.persistence_enabled {
        tracing::warn!("persistence disabled; webhooks are kept in memory");
        return Ok(Arc::new(InMemoryWebhookStore::new()));
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
        .connect(&config.database_url)
        .await
        .context("connecting to PostgreSQL")?;
    let store = PostgresWebhookStore::new(pool);
    store.migrate().await?;
    tracing::info!("webhook store ready");
    Ok(Arc::new(store))
}

fn spawn_sweeps(state: &AppState, config: &GatewayConfig) {
    let hub = Arc::clone(&state.hub);
    let hub_every = Duration::from_secs(config.hub_sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(hub_every);
        loop {
            ticker.tick().await;
            hub.sweep_closed().await;
        }
    });

    let limiter = Arc::clone(&state.rate_limiter);
    let window = state.rate_policy.window;
    let limiter_every = Duration::from_secs(config.rate_limit_sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(limiter_every);
        loop {
            ticker.tick().await;
            let removed = limiter.sweep(window);
            if removed > 0 {
                tracing::debug!(removed, "swept idle rate-limit records");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
