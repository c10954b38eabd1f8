//! Chainscore API Server
//!
//! REST API for multi-chain wallet credit scores
//!
//! Usage:
//!   cargo run --bin chainscore_api
//!
//! Environment:
//!   CHAINSCORE_PORT - Server port (default: 8080, `PORT` takes precedence)
//!   CHAINSCORE_HOST - Server host (default: 0.0.0.0)
//!   RUST_LOG        - Log filter (default: info)

use chainscore::api::{create_router, start_cleanup_task, AppState, RateLimitConfig, RateLimiter};
use chainscore::utils::constants::{APP_VERSION, CACHE_CLEANUP_INTERVAL_SECS};
use chainscore::{AppConfig, ScoreOrchestrator};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    print_banner();

    let config = AppConfig::from_env()?;
    let orchestrator = Arc::new(ScoreOrchestrator::from_config(&config).await?);

    let chains = orchestrator.chains();
    if chains.is_empty() {
        warn!("⚠️ No chain data sources configured - every score request will fail");
    }
    info!(
        "🧠 Model {} | chains: {}",
        orchestrator.model().version(),
        chains.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
    );

    let cache_sweeper =
        orchestrator.spawn_cache_cleanup(Duration::from_secs(CACHE_CLEANUP_INTERVAL_SECS));
    let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::from_env()));
    let limiter_sweeper = start_cleanup_task(rate_limiter.clone());
    info!("🧹 Background cleanup tasks started");

    let state = Arc::new(AppState::new(orchestrator.clone(), rate_limiter));
    let app = create_router(state);

    // PORT wins for container platforms, CHAINSCORE_PORT for local dev
    let host = std::env::var("CHAINSCORE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("CHAINSCORE_PORT"))
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    info!("🚀 Chainscore API starting on http://{}", addr);
    info!("Endpoints:");
    info!("  GET  /v1/score/:wallet?chain=sei|eth|sol - Wallet credit score");
    info!("  POST /v1/score                          - Wallet credit score (JSON body)");
    info!("  GET  /v1/health                         - Engine status");
    info!("  GET  /v1/health/chains                  - Data source probes");
    info!("Press Ctrl+C for graceful shutdown");

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Shutdown signal received, cleaning up...");
    cache_sweeper.abort();
    limiter_sweeper.abort();

    let stats = orchestrator.cache().stats();
    info!(
        "   Cache: {} entries, {} hits / {} misses ({:.1}% hit rate)",
        stats.entries,
        stats.hits,
        stats.misses,
        stats.hit_rate
    );
    info!("👋 Chainscore API shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("⚠️ Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}

fn print_banner() {
    println!(
        r#"
    ┌──────────────────────────────────────────────┐
    │   C H A I N S C O R E   A P I   v{:<10}  │
    │   Wallet credit scoring · Sei · ETH · SOL    │
    └──────────────────────────────────────────────┘
    "#,
        APP_VERSION
    );
}
