//! API Request/Response Types

use serde::{Deserialize, Serialize};

use crate::core::orchestrator::HealthReport;
use crate::models::errors::AppError;

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    pub latency_ms: f64,
    pub timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, latency_ms: f64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            latency_ms,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(error: ApiError, latency_ms: f64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            latency_ms,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// API Error
#[derive(Debug, Serialize)]
pub struct ApiError {
    /// Caller-facing category (INVALID_ADDRESS, SOURCE_UNAVAILABLE, ...)
    pub kind: String,
    /// Internal error code for support/monitoring
    pub code: String,
    pub message: String,
    /// bad_input | retry_later | degraded | internal
    pub hint: String,
}

impl ApiError {
    pub fn rate_limited(retry_after: u64) -> Self {
        Self {
            kind: "RATE_LIMITED".to_string(),
            code: "RATE_LIMITED".to_string(),
            message: format!("Rate limit exceeded. Retry after {} seconds", retry_after),
            hint: "retry_later".to_string(),
        }
    }
}

impl From<&AppError> for ApiError {
    fn from(err: &AppError) -> Self {
        let kind = err.kind();
        Self {
            kind: kind.as_str().to_string(),
            code: err.code_str().to_string(),
            message: err.message.clone(),
            hint: kind.hint().to_string(),
        }
    }
}

// ============================================
// Scoring
// ============================================

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub wallet: String,
    #[serde(default = "default_chain")]
    pub chain: String,
}

#[derive(Debug, Deserialize)]
pub struct ScoreQuery {
    #[serde(default = "default_chain")]
    pub chain: String,
}

fn default_chain() -> String {
    "sei".to_string()
}

// ============================================
// Health Check
// ============================================

#[derive(Debug, Serialize)]
pub struct HealthData {
    #[serde(flatten)]
    pub report: HealthReport,
    pub uptime_seconds: u64,
}
