//! RPC Client Module - shared transport for every chain adapter
//!
//! 1. One `reqwest::Client` (connection pool, gzip, User-Agent) shared by all adapters
//! 2. Explicit bounded retry loop: exponential backoff 250ms→500ms→1s→... with ±20% jitter
//! 3. Typed classification of every failure: transient / permanent / fatal
//! 4. Per-attempt deadline, never an unbounded wait
//! 5. Per-host rate budget (semaphore) shared by all adapters hitting the same provider
//!
//! Not-found is not a failure here: JSON-RPC `null` results and HTTP 404 come back as
//! `RpcNotFound` (permanent) and the adapters turn them into empty sub-records.

use alloy_primitives::{Bytes, U256};
use dashmap::DashMap;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::models::config::RetryPolicy;
use crate::models::errors::{AppError, AppResult, ErrorCode, FailureClass};
use crate::utils::constants::{parse_hex_quantity, USER_AGENT as USER_AGENT_CONST};

// ============================================
// Transport
// ============================================

/// Shared HTTP plumbing: connection pool, retry policy and per-host budgets
pub struct HttpTransport {
    client: reqwest::Client,
    retry: RetryPolicy,
    /// host -> concurrency slots
    budgets: DashMap<String, Arc<Semaphore>>,
    concurrency_per_host: usize,
}

impl HttpTransport {
    pub fn new(retry: RetryPolicy, concurrency_per_host: usize) -> AppResult<Self> {
        Ok(Self {
            client: Self::build_client()?,
            retry,
            budgets: DashMap::new(),
            concurrency_per_host: concurrency_per_host.max(1),
        })
    }

    /// Build HTTP client with custom headers (gzip on, per-attempt deadline enforced by the retry loop)
    fn build_client() -> AppResult<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        reqwest::Client::builder()
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| AppError::with_source(ErrorCode::Internal, "Failed to build HTTP client", e))
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn budget_for(&self, url: &str) -> Arc<Semaphore> {
        let host = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| format!("{}:{}", h, u.port_or_known_default().unwrap_or(0))))
            .unwrap_or_else(|| url.to_string());
        self.budgets
            .entry(host)
            .or_insert_with(|| Arc::new(Semaphore::new(self.concurrency_per_host)))
            .clone()
    }

    /// Bounded retry loop around one upstream operation
    ///
    /// Transient failures are retried with backoff; permanent and fatal failures
    /// return immediately. Exhaustion yields `SourceUnavailable` wrapping the last error.
    pub async fn with_retry<T, F, Fut>(&self, label: &str, url: &str, op: F) -> AppResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let budget = self.budget_for(url);
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.retry.backoff(attempt);
                debug!(
                    "⏳ {} retry {}/{} after {}ms",
                    label,
                    attempt + 1,
                    attempts,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let outcome = tokio::time::timeout(self.retry.per_call_timeout, async {
                let _permit = budget
                    .acquire()
                    .await
                    .map_err(|_| AppError::internal("rate budget closed"))?;
                op().await
            })
            .await;

            let err = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err,
                Err(_) => AppError::rpc_timeout(format!(
                    "{} exceeded {}ms",
                    label,
                    self.retry.per_call_timeout.as_millis()
                )),
            };

            match err.code.failure_class() {
                FailureClass::Transient => {
                    if err.code == ErrorCode::RpcRateLimited {
                        warn!("⏳ {} rate limited, backing off (attempt {}/{})", label, attempt + 1, attempts);
                    } else {
                        debug!("⚠️ {} attempt {}/{} failed: {}", label, attempt + 1, attempts, err);
                    }
                    last_error = Some(err);
                }
                FailureClass::Permanent | FailureClass::Fatal => return Err(err),
            }
        }

        warn!("❌ {} unavailable after {} attempts", label, attempts);
        Err(AppError::source_unavailable(
            format!("{} unavailable after {} attempts", label, attempts),
            last_error,
        ))
    }

    /// Map an HTTP status to a typed failure (None = success)
    fn check_status(status: StatusCode, label: &str) -> Option<AppError> {
        if status.is_success() {
            return None;
        }
        let err = match status.as_u16() {
            429 => AppError::rpc_rate_limited(),
            404 => AppError::not_found(format!("{}: HTTP 404", label)),
            401 | 403 => AppError::new(
                ErrorCode::RpcUnauthorized,
                format!("{}: HTTP {} (check API key)", label, status.as_u16()),
            ),
            500..=599 => AppError::new(ErrorCode::RpcServerError, format!("{}: HTTP {}", label, status)),
            _ => AppError::new(ErrorCode::RpcError, format!("{}: HTTP {}", label, status)),
        };
        Some(err)
    }

    async fn execute_get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        label: &str,
    ) -> AppResult<T> {
        let response = self.client.get(url).query(query).send().await?;
        if let Some(err) = Self::check_status(response.status(), label) {
            return Err(err);
        }
        Ok(response.json::<T>().await?)
    }

    async fn execute_rpc(
        &self,
        url: &str,
        payload: &serde_json::Value,
        label: &str,
    ) -> AppResult<serde_json::Value> {
        let response = self.client.post(url).json(payload).send().await?;
        if let Some(err) = Self::check_status(response.status(), label) {
            return Err(err);
        }

        let json: RpcResponse = response.json().await?;
        if let Some(error) = json.error {
            return Err(error.into_app_error(label));
        }
        Ok(json.result.unwrap_or(serde_json::Value::Null))
    }
}

// ============================================
// JSON-RPC provider
// ============================================

/// JSON-RPC endpoint bound to a shared transport
#[derive(Clone)]
pub struct RpcProvider {
    transport: Arc<HttpTransport>,
    url: String,
    /// Network name for logging
    network_name: String,
}

impl RpcProvider {
    pub fn new(transport: Arc<HttpTransport>, url: impl Into<String>, network_name: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
            network_name: network_name.into(),
        }
    }

    /// Execute JSON-RPC call with retry
    ///
    /// A `null` result deserializes into `Option<_>` targets as `None` and is
    /// `RpcNotFound` for any other target type.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> AppResult<T> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });
        let label = format!("{} {}", self.network_name, method);

        let value = self
            .transport
            .with_retry(&label, &self.url, || self.transport.execute_rpc(&self.url, &payload, &label))
            .await?;

        let is_null = value.is_null();
        serde_json::from_value::<T>(value).map_err(|e| {
            if is_null {
                AppError::not_found(format!("{}: null result", label))
            } else {
                AppError::with_source(ErrorCode::RpcInvalidResponse, format!("{}: unexpected result shape", label), e)
            }
        })
    }

    /// Native balance in base units
    pub async fn get_balance(&self, address: &str) -> AppResult<U256> {
        let raw: String = self.call("eth_getBalance", serde_json::json!([address, "latest"])).await?;
        parse_hex_quantity(&raw)
            .ok_or_else(|| AppError::invalid_response(format!("bad eth_getBalance quantity: {}", raw)))
    }

    /// Execute eth_call (EVM chains only)
    pub async fn eth_call(&self, to: &str, data: &Bytes) -> AppResult<Bytes> {
        let params = serde_json::json!([{ "to": to, "data": data.to_string() }, "latest"]);
        let raw: String = self.call("eth_call", params).await?;
        let bytes = hex::decode(raw.trim_start_matches("0x"))
            .map_err(|e| AppError::with_source(ErrorCode::RpcInvalidResponse, "eth_call returned non-hex", e))?;
        Ok(Bytes::from(bytes))
    }

    pub async fn block_number(&self) -> AppResult<u64> {
        let raw: String = self.call("eth_blockNumber", serde_json::json!([])).await?;
        parse_hex_quantity(&raw)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| AppError::invalid_response(format!("bad block number: {}", raw)))
    }

    /// Get RPC URL (masked for logging)
    pub fn masked_url(&self) -> String {
        mask_url(&self.url)
    }
}

// ============================================
// REST provider (indexers, Cosmos LCD)
// ============================================

#[derive(Clone)]
pub struct RestProvider {
    transport: Arc<HttpTransport>,
    base_url: String,
    name: String,
}

impl RestProvider {
    pub fn new(transport: Arc<HttpTransport>, base_url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            name: name.into(),
        }
    }

    /// GET `{base}{path}` with retry; HTTP 404 is `RpcNotFound`
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> AppResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let label = format!("{} GET {}", self.name, path);
        self.transport
            .with_retry(&label, &url, || self.transport.execute_get::<T>(&url, query, &label))
            .await
    }

    pub fn masked_url(&self) -> String {
        mask_url(&self.base_url)
    }
}

/// Hide API keys embedded in provider URLs
pub fn mask_url(url: &str) -> String {
    if let Some((base, _key)) = url.split_once("/v2/") {
        return format!("{}/v2/***HIDDEN***", base);
    }
    url.split('?').next().unwrap_or(url).to_string()
}

/// Treat not-found as "nothing there"
pub fn or_empty<T: Default>(result: AppResult<T>) -> AppResult<T> {
    match result {
        Err(e) if e.code == ErrorCode::RpcNotFound => Ok(T::default()),
        other => other,
    }
}

// ============================================
// JSON-RPC wire types
// ============================================

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// JSON-RPC error structure
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    /// Rate limit error (HTTP 429 equivalents, code -32005)
    pub fn is_rate_limit(&self) -> bool {
        self.code == -32005 || self.code == 429 || self.message.to_lowercase().contains("rate limit")
    }

    /// Node-side trouble that a retry can fix
    pub fn is_server_side(&self) -> bool {
        let msg = self.message.to_lowercase();
        self.code == -32603
            || msg.contains("timeout")
            || msg.contains("timed out")
            || msg.contains("header not found")
            || msg.contains("unavailable")
            || msg.contains("busy")
    }

    /// Check if this is a method not found error (code -32601)
    pub fn is_method_not_found(&self) -> bool {
        self.code == -32601
    }

    fn into_app_error(self, label: &str) -> AppError {
        let code = if self.is_rate_limit() {
            ErrorCode::RpcRateLimited
        } else if self.is_server_side() {
            ErrorCode::RpcServerError
        } else {
            ErrorCode::RpcError
        };
        AppError::new(code, format!("{}: RPC error {} ({})", label, self.message, self.code))
    }
}
