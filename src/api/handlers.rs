//! API Request Handlers

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use super::middleware::RateLimiter;
use super::types::*;
use crate::core::orchestrator::{ChainHealth, ScoreOrchestrator, ScoreResponse};
use crate::models::errors::{AppError, ErrorKind};
use crate::models::types::Chain;

/// Shared application state
pub struct AppState {
    pub orchestrator: Arc<ScoreOrchestrator>,
    pub rate_limiter: Arc<RateLimiter>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(orchestrator: Arc<ScoreOrchestrator>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            orchestrator,
            rate_limiter,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

type HandlerResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// AppError → HTTP status + error envelope
fn failure(err: &AppError, start: Instant) -> (StatusCode, Json<ApiResponse<()>>) {
    let status = StatusCode::from_u16(err.code.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if err.kind() == ErrorKind::InternalError {
        error!(code = err.code_str(), "Internal error: {}", err);
    }
    (status, Json(ApiResponse::error(ApiError::from(err), elapsed_ms(start))))
}

// ============================================
// Health Check
// ============================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthData>> {
    let start = Instant::now();

    let data = HealthData {
        report: state.orchestrator.health(),
        uptime_seconds: state.uptime_seconds(),
    };

    Json(ApiResponse::success(data, elapsed_ms(start)))
}

/// Probe each configured chain's data source
pub async fn chain_health(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<ChainHealth>>> {
    let start = Instant::now();
    let probes = state.orchestrator.chain_health().await;
    Json(ApiResponse::success(probes, elapsed_ms(start)))
}

// ============================================
// Wallet Scoring
// ============================================

/// GET /v1/score/:wallet?chain=sei|eth|sol
pub async fn get_score(
    State(state): State<Arc<AppState>>,
    Path(wallet): Path<String>,
    Query(query): Query<ScoreQuery>,
) -> HandlerResult<ScoreResponse> {
    score_wallet(&state, &wallet, &query.chain).await
}

/// POST /v1/score {wallet, chain}
pub async fn post_score(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScoreRequest>,
) -> HandlerResult<ScoreResponse> {
    score_wallet(&state, &request.wallet, &request.chain).await
}

async fn score_wallet(state: &AppState, wallet: &str, chain: &str) -> HandlerResult<ScoreResponse> {
    let start = Instant::now();

    let chain = Chain::parse(chain).map_err(|e| failure(&e, start))?;
    let response = state
        .orchestrator
        .get_score(wallet, chain)
        .await
        .map_err(|e| failure(&e, start))?;

    info!(
        "📊 {} {} → {} ({})",
        chain,
        wallet.trim(),
        response.result.score,
        response.band
    );

    Ok(Json(ApiResponse::success(response, elapsed_ms(start))))
}
