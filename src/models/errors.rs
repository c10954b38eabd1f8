//! Centralized Error Handling Module
//!
//! Setiap kegagalan memiliki kode error yang unik, dan setiap kode
//! dipetakan ke satu `ErrorKind` yang dilihat oleh caller.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - RPC_xxx: upstream RPC / indexer errors
//! - SRC_xxx: chain data source errors (after retries)
//! - MODEL_xxx: scoring model artifact errors
//! - REQ_xxx: request errors
//! - CFG_xxx: configuration errors

use std::fmt;
use std::sync::Arc;

/// Application-wide error type
///
/// `Clone` so a single failed computation can be handed to every waiter
/// sharing it; the source error is reference-counted for that reason.
#[derive(Debug, Clone)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new AppError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    /// Caller-facing category
    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// What the caller can do about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Client input malformed, never retried
    InvalidAddress,
    /// A chain data source exhausted its retries or is not configured
    SourceUnavailable,
    /// Trained model could not be loaded; scoring degrades to rules
    ModelUnavailable,
    /// Overall request deadline exceeded
    Timeout,
    /// Unexpected defect
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidAddress => "INVALID_ADDRESS",
            Self::SourceUnavailable => "SOURCE_UNAVAILABLE",
            Self::ModelUnavailable => "MODEL_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Short hint separating "bad input" from "try again later" from "service degraded"
    pub fn hint(&self) -> &'static str {
        match self {
            Self::InvalidAddress => "bad_input",
            Self::SourceUnavailable | Self::Timeout => "retry_later",
            Self::ModelUnavailable => "degraded",
            Self::InternalError => "internal",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidAddress => 400,
            Self::SourceUnavailable | Self::ModelUnavailable => 503,
            Self::Timeout => 504,
            Self::InternalError => 500,
        }
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // RPC Errors (1xx)
    // ============================================
    /// RPC connection failed / reset
    RpcConnectionFailed,
    /// RPC request exceeded the per-call timeout
    RpcTimeout,
    /// RPC rate limited (HTTP 429 or JSON-RPC -32005)
    RpcRateLimited,
    /// Upstream returned HTTP 5xx
    RpcServerError,
    /// RPC returned a JSON-RPC error object
    RpcError,
    /// Upstream reports the resource does not exist
    RpcNotFound,
    /// Upstream rejected our credentials (HTTP 401/403)
    RpcUnauthorized,
    /// Invalid RPC response
    RpcInvalidResponse,

    // ============================================
    // Source Errors (2xx)
    // ============================================
    /// Retries exhausted for a chain data source
    SourceUnavailable,
    /// No adapter registered for the requested chain
    ChainNotConfigured,

    // ============================================
    // Model Errors (3xx)
    // ============================================
    /// Model artifact not found at the configured location
    ModelArtifactMissing,
    /// Model artifact present but unreadable or inconsistent
    ModelArtifactCorrupt,

    // ============================================
    // Request Errors (4xx)
    // ============================================
    /// Address does not match the chain's grammar
    InvalidAddress,
    /// Unknown chain name
    UnsupportedChain,
    /// Request deadline exceeded
    RequestTimeout,

    // ============================================
    // Configuration Errors (5xx)
    // ============================================
    /// Missing environment variable
    ConfigMissingEnv,
    /// Invalid configuration value
    ConfigInvalidValue,

    // ============================================
    // Generic Errors (9xx)
    // ============================================
    /// Unexpected defect
    Internal,
}

/// How the retry loop treats a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retry with backoff
    Transient,
    /// Do not retry; not-found is an empty wallet
    Permanent,
    /// Misconfiguration, surface immediately
    Fatal,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            // RPC Errors
            Self::RpcConnectionFailed => "RPC_CONNECTION_FAILED",
            Self::RpcTimeout => "RPC_TIMEOUT",
            Self::RpcRateLimited => "RPC_RATE_LIMITED",
            Self::RpcServerError => "RPC_SERVER_ERROR",
            Self::RpcError => "RPC_ERROR",
            Self::RpcNotFound => "RPC_NOT_FOUND",
            Self::RpcUnauthorized => "RPC_UNAUTHORIZED",
            Self::RpcInvalidResponse => "RPC_INVALID_RESPONSE",

            // Source Errors
            Self::SourceUnavailable => "SRC_UNAVAILABLE",
            Self::ChainNotConfigured => "SRC_CHAIN_NOT_CONFIGURED",

            // Model Errors
            Self::ModelArtifactMissing => "MODEL_ARTIFACT_MISSING",
            Self::ModelArtifactCorrupt => "MODEL_ARTIFACT_CORRUPT",

            // Request Errors
            Self::InvalidAddress => "REQ_INVALID_ADDRESS",
            Self::UnsupportedChain => "REQ_UNSUPPORTED_CHAIN",
            Self::RequestTimeout => "REQ_TIMEOUT",

            // Configuration Errors
            Self::ConfigMissingEnv => "CFG_MISSING_ENV",
            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",

            // Generic
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// Map to the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAddress | Self::UnsupportedChain => ErrorKind::InvalidAddress,
            Self::RpcConnectionFailed
            | Self::RpcTimeout
            | Self::RpcRateLimited
            | Self::RpcServerError
            | Self::RpcError
            | Self::RpcNotFound
            | Self::RpcUnauthorized
            | Self::RpcInvalidResponse
            | Self::SourceUnavailable
            | Self::ChainNotConfigured => ErrorKind::SourceUnavailable,
            Self::ModelArtifactMissing | Self::ModelArtifactCorrupt => ErrorKind::ModelUnavailable,
            Self::RequestTimeout => ErrorKind::Timeout,
            Self::ConfigMissingEnv | Self::ConfigInvalidValue | Self::Internal => {
                ErrorKind::InternalError
            }
        }
    }

    /// Get HTTP status code for API responses
    pub fn http_status(&self) -> u16 {
        match self {
            Self::RpcRateLimited => 429,
            _ => self.kind().http_status(),
        }
    }

    /// Classification used by the adapter retry loop
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::RpcConnectionFailed
            | Self::RpcTimeout
            | Self::RpcRateLimited
            | Self::RpcServerError => FailureClass::Transient,
            Self::RpcUnauthorized
            | Self::ConfigMissingEnv
            | Self::ConfigInvalidValue
            | Self::ChainNotConfigured => FailureClass::Fatal,
            _ => FailureClass::Permanent,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        self.failure_class() == FailureClass::Transient
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    /// RPC connection failed
    pub fn rpc_connection_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcConnectionFailed, msg)
    }

    /// RPC timeout
    pub fn rpc_timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcTimeout, msg)
    }

    /// RPC rate limited
    pub fn rpc_rate_limited() -> Self {
        Self::new(ErrorCode::RpcRateLimited, "Rate limited (HTTP 429)")
    }

    /// Upstream resource not found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcNotFound, msg)
    }

    /// Malformed upstream payload
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcInvalidResponse, msg)
    }

    /// Retries exhausted, keeping the last failure as source
    pub fn source_unavailable(msg: impl Into<String>, last: Option<AppError>) -> Self {
        match last {
            Some(last) => Self::with_source(ErrorCode::SourceUnavailable, msg, last),
            None => Self::new(ErrorCode::SourceUnavailable, msg),
        }
    }

    /// Chain without a registered adapter
    pub fn chain_not_configured(chain: &str) -> Self {
        Self::new(
            ErrorCode::ChainNotConfigured,
            format!("No data source configured for chain: {}", chain),
        )
    }

    /// Invalid wallet address
    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidAddress, msg)
    }

    /// Unknown chain
    pub fn unsupported_chain(chain: &str) -> Self {
        Self::new(
            ErrorCode::UnsupportedChain,
            format!("Unsupported chain: {}", chain),
        )
    }

    /// Request deadline exceeded
    pub fn timeout(deadline_ms: u64) -> Self {
        Self::new(
            ErrorCode::RequestTimeout,
            format!("Request exceeded deadline of {}ms", deadline_ms),
        )
    }

    /// Missing environment variable
    pub fn missing_env(key_name: &str) -> Self {
        Self::new(
            ErrorCode::ConfigMissingEnv,
            format!("Missing environment variable: {}", key_name),
        )
    }

    /// Invalid configuration value
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalidValue, msg)
    }

    /// Internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<eyre::Report> for AppError {
    fn from(err: eyre::Report) -> Self {
        Self::new(ErrorCode::Internal, err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorCode::Internal, "IO error", err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::with_source(ErrorCode::RpcTimeout, "Request timeout", err)
        } else if err.is_connect() {
            Self::with_source(ErrorCode::RpcConnectionFailed, "Connection failed", err)
        } else if err.is_decode() {
            Self::with_source(ErrorCode::RpcInvalidResponse, "Undecodable response body", err)
        } else if err.is_builder() {
            Self::with_source(ErrorCode::ConfigInvalidValue, "Invalid endpoint URL", err)
        } else {
            // Body/read errors mid-stream are almost always a reset connection
            Self::with_source(ErrorCode::RpcConnectionFailed, "Request failed", err)
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::RpcInvalidResponse, "JSON parse error", err)
    }
}
