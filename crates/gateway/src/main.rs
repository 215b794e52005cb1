//! Courier ingress gateway binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use courier_common::config::AppConfig;
use courier_common::redis_pool::create_redis_pool;
use courier_dispatch::{MetricsRegistry, RedisPublisher};

use courier_gateway::routes::create_router;
use courier_gateway::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("courier_gateway=debug,courier_dispatch=info,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting Courier gateway...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to the bus
    let redis = create_redis_pool(&config.redis_url).await?;
    tracing::info!("Redis connection established");

    // Build application state
    let metrics = Arc::new(MetricsRegistry::new());
    let publisher = RedisPublisher::new(redis).with_max_len(config.stream_max_len);
    let state = AppState::new(Arc::new(publisher), metrics);

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.gateway_port));
    tracing::info!("Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received shutdown signal, stopping gracefully...");
        })
        .await?;

    tracing::info!("Courier gateway stopped.");
    Ok(())
}
