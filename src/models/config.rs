//! Configuration module for chainscore
//!
//! Semua nilai konfigurasi dibaca dari environment di sini, sekali saat start.
//! Defaults live in utils/constants.rs.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use super::errors::{AppError, AppResult};
use crate::utils::constants::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL_SECS, DEFAULT_CONCURRENCY_PER_HOST,
    DEFAULT_REQUEST_DEADLINE_MS, DEFAULT_RETRY_BASE_MS, DEFAULT_RETRY_JITTER_PERCENT,
    DEFAULT_RETRY_MAX_ATTEMPTS, DEFAULT_RETRY_MAX_MS, DEFAULT_RPC_TIMEOUT_MS,
    DEFAULT_SEI_EXPLORER_URL, DEFAULT_SEI_REST_URL, DEFAULT_SEI_RPC_URL, DEFAULT_SOLANA_RPC_URL,
    MAX_FACTOR_WEIGHT_SHARE,
};

// ============================================
// Env helpers
// ============================================

/// Read `key`; unset means `default`, set-but-unparseable is a config error
fn env_parse<T: FromStr>(key: &str, default: T) -> AppResult<T> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse::<T>().map_err(|_| {
            AppError::invalid_config(format!("{} has invalid value: {}", key, raw))
        }),
        _ => Ok(default),
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.contains("YOUR_API_KEY"))
}

/// Accept only absolute http(s) URLs
pub fn validate_endpoint(name: &str, url: &str) -> AppResult<String> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| AppError::invalid_config(format!("{} is not a valid URL: {}", name, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(AppError::invalid_config(format!(
            "{} must be an http(s) URL with a host",
            name
        )));
    }
    Ok(url.trim_end_matches('/').to_string())
}

/// Validate an endpoint from the environment, disabling the chain on failure
fn endpoint_or_disable(name: &str, url: &str) -> Option<String> {
    match validate_endpoint(name, url) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!("⚠️ {} - chain disabled", e);
            None
        }
    }
}

// ============================================
// Retry policy
// ============================================

/// Bounded exponential backoff with jitter for upstream calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_percent: u64,
    /// Deadline for each single attempt
    pub per_call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_MS),
            jitter_percent: DEFAULT_RETRY_JITTER_PERCENT,
            per_call_timeout: Duration::from_millis(DEFAULT_RPC_TIMEOUT_MS),
        }
    }
}

impl RetryPolicy {
    fn from_env() -> AppResult<Self> {
        let policy = Self {
            max_attempts: env_parse("RPC_MAX_ATTEMPTS", DEFAULT_RETRY_MAX_ATTEMPTS)?,
            base_delay: Duration::from_millis(env_parse("RPC_BASE_DELAY_MS", DEFAULT_RETRY_BASE_MS)?),
            max_delay: Duration::from_millis(env_parse("RPC_MAX_DELAY_MS", DEFAULT_RETRY_MAX_MS)?),
            jitter_percent: DEFAULT_RETRY_JITTER_PERCENT,
            per_call_timeout: Duration::from_millis(env_parse("RPC_TIMEOUT_MS", DEFAULT_RPC_TIMEOUT_MS)?),
        };
        if policy.max_attempts == 0 {
            return Err(AppError::invalid_config("RPC_MAX_ATTEMPTS must be at least 1"));
        }
        Ok(policy)
    }

    /// Capped exponential delay before retry number `attempt` (1-based), without jitter
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay before retry `attempt`, with ±jitter_percent
    pub fn backoff(&self, attempt: u32) -> Duration {
        let capped = self.base_backoff(attempt).as_millis() as i64;
        let jitter_range = capped * self.jitter_percent as i64 / 100;
        let jitter: i64 = if jitter_range > 0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0
        };
        Duration::from_millis((capped + jitter).max(0) as u64)
    }

    /// Upper bound on the wall time of one fully retried call
    pub fn worst_case(&self) -> Duration {
        let sleeps: Duration = (1..self.max_attempts)
            .map(|a| {
                let base = self.base_backoff(a);
                base + base * self.jitter_percent as u32 / 100
            })
            .sum();
        self.per_call_timeout * self.max_attempts + sleeps
    }
}

// ============================================
// Chain endpoints
// ============================================

#[derive(Debug, Clone)]
pub struct SeiEndpoints {
    /// EVM JSON-RPC
    pub rpc_url: String,
    /// Blockscout REST API v2 base
    pub explorer_url: String,
    /// Cosmos REST (LCD) base
    pub rest_url: String,
}

#[derive(Debug, Clone)]
pub struct EthereumEndpoints {
    /// Alchemy-compatible JSON-RPC (alchemy_* methods required)
    pub rpc_url: String,
}

#[derive(Debug, Clone)]
pub struct SolanaEndpoints {
    pub rpc_url: String,
}

/// Resolve the Ethereum endpoint: ETHEREUM_RPC, ETH_HTTP_URL, then ALCHEMY_API_KEY
fn ethereum_rpc_from_env() -> Option<String> {
    if let Some(url) = env_opt("ETHEREUM_RPC").or_else(|| env_opt("ETH_HTTP_URL")) {
        return Some(url);
    }
    env_opt("ALCHEMY_API_KEY").map(|key| {
        info!("🔑 Using ALCHEMY_API_KEY (key hidden)");
        format!("https://eth-mainnet.g.alchemy.com/v2/{}", key)
    })
}

// ============================================
// Cache / model / scoring
// ============================================

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    /// `None` = unbounded
    pub capacity: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            capacity: Some(DEFAULT_CACHE_CAPACITY),
        }
    }
}

/// Where the trained model artifact lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// No artifact configured, rules only
    None,
    Local(PathBuf),
    /// Object storage over HTTPS (public or presigned)
    Remote(String),
}

impl ModelSource {
    pub fn from_env() -> Self {
        if let Some(path) = env_opt("MODEL_PATH") {
            return Self::Local(PathBuf::from(path));
        }
        if let Some(url) = env_opt("MODEL_URL") {
            return Self::Remote(url);
        }
        match (env_opt("MODEL_S3_BUCKET"), env_opt("MODEL_S3_KEY")) {
            (Some(bucket), Some(key)) => Self::Remote(format!(
                "https://{}.s3.amazonaws.com/{}",
                bucket,
                key.trim_start_matches('/')
            )),
            _ => Self::None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::None => "none".to_string(),
            Self::Local(path) => path.display().to_string(),
            Self::Remote(url) => url.split('?').next().unwrap_or(url).to_string(),
        }
    }
}

/// Maximum points per factor before scaling onto 0..=1000
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorWeights {
    pub account_age: f64,
    pub tx_activity: f64,
    pub balances: f64,
    pub defi: f64,
    pub staking: f64,
    pub governance: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            account_age: 25.0,
            tx_activity: 30.0,
            balances: 20.0,
            defi: 15.0,
            staking: 10.0,
            governance: 5.0,
        }
    }
}

impl FactorWeights {
    pub fn as_array(&self) -> [f64; 6] {
        [
            self.account_age,
            self.tx_activity,
            self.balances,
            self.defi,
            self.staking,
            self.governance,
        ]
    }

    pub fn total(&self) -> f64 {
        self.as_array().iter().sum()
    }
}

/// Feature values at which a rule sub-score reaches 1.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Saturation {
    pub account_age_days: f64,
    pub tx_count: f64,
    /// Transactions per day
    pub tx_velocity: f64,
    pub balance_diversity: f64,
    pub defi_protocols: f64,
    pub staking_ratio: f64,
    pub governance_participation: f64,
}

impl Default for Saturation {
    fn default() -> Self {
        Self {
            account_age_days: 365.0,
            tx_count: 500.0,
            tx_velocity: 0.1,
            balance_diversity: 0.8,
            defi_protocols: 3.0,
            staking_ratio: 0.5,
            governance_participation: 0.5,
        }
    }
}

/// Score cut points; must satisfy `low > medium`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    /// score >= low => Low risk
    pub low: u16,
    /// score >= medium => Medium risk
    pub medium: u16,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self { low: 700, medium: 500 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: FactorWeights,
    pub saturation: Saturation,
    pub thresholds: RiskThresholds,
}

impl ScoringConfig {
    /// Reject weights/thresholds that would break the score contract
    pub fn validate(&self) -> AppResult<()> {
        if self.weights.as_array().iter().any(|w| !w.is_finite() || *w <= 0.0) {
            return Err(AppError::invalid_config("factor weights must be positive"));
        }
        let total = self.weights.total();
        let heaviest = self.weights.as_array().into_iter().fold(0.0_f64, f64::max);
        if heaviest > total * MAX_FACTOR_WEIGHT_SHARE {
            return Err(AppError::invalid_config(format!(
                "no factor may exceed {:.0}% of the total weight (got {:.1} of {:.1})",
                MAX_FACTOR_WEIGHT_SHARE * 100.0,
                heaviest,
                total
            )));
        }
        let sat = &self.saturation;
        let saturations = [
            sat.account_age_days,
            sat.tx_count,
            sat.tx_velocity,
            sat.balance_diversity,
            sat.defi_protocols,
            sat.staking_ratio,
            sat.governance_participation,
        ];
        if saturations.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(AppError::invalid_config("saturation points must be positive"));
        }
        let t = &self.thresholds;
        if t.low <= t.medium || t.low > 1000 {
            return Err(AppError::invalid_config(format!(
                "risk thresholds must satisfy 1000 >= low > medium (got low={}, medium={})",
                t.low, t.medium
            )));
        }
        Ok(())
    }

    /// Load overrides from a JSON file; missing fields keep defaults
    pub fn load(path: &std::path::Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            AppError::invalid_config(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }
}

// ============================================
// Application config
// ============================================

/// Everything the engine needs, resolved once at process start
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sei: Option<SeiEndpoints>,
    pub ethereum: Option<EthereumEndpoints>,
    pub solana: Option<SolanaEndpoints>,
    pub retry: RetryPolicy,
    /// Concurrent calls allowed per upstream host
    pub concurrency_per_host: usize,
    pub cache: CacheConfig,
    pub request_deadline: Duration,
    pub model: ModelSource,
    pub scoring: ScoringConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sei: None,
            ethereum: None,
            solana: None,
            retry: RetryPolicy::default(),
            concurrency_per_host: DEFAULT_CONCURRENCY_PER_HOST,
            cache: CacheConfig::default(),
            request_deadline: Duration::from_millis(DEFAULT_REQUEST_DEADLINE_MS),
            model: ModelSource::None,
            scoring: ScoringConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        let sei = {
            let rpc = env_opt("SEI_RPC_URL").unwrap_or_else(|| DEFAULT_SEI_RPC_URL.to_string());
            let explorer = env_opt("SEI_EXPLORER_URL")
                .unwrap_or_else(|| DEFAULT_SEI_EXPLORER_URL.to_string());
            let rest = env_opt("SEI_REST_URL").unwrap_or_else(|| DEFAULT_SEI_REST_URL.to_string());
            match (
                endpoint_or_disable("SEI_RPC_URL", &rpc),
                endpoint_or_disable("SEI_EXPLORER_URL", &explorer),
                endpoint_or_disable("SEI_REST_URL", &rest),
            ) {
                (Some(rpc_url), Some(explorer_url), Some(rest_url)) => Some(SeiEndpoints {
                    rpc_url,
                    explorer_url,
                    rest_url,
                }),
                _ => None,
            }
        };

        let ethereum = match ethereum_rpc_from_env() {
            Some(url) => endpoint_or_disable("ETHEREUM_RPC", &url)
                .map(|rpc_url| EthereumEndpoints { rpc_url }),
            None => {
                warn!("⚠️ ETHEREUM_RPC / ALCHEMY_API_KEY not configured - Ethereum disabled");
                None
            }
        };

        let solana = {
            let rpc = env_opt("SOLANA_RPC_URL").unwrap_or_else(|| DEFAULT_SOLANA_RPC_URL.to_string());
            endpoint_or_disable("SOLANA_RPC_URL", &rpc).map(|rpc_url| SolanaEndpoints { rpc_url })
        };

        let capacity: usize = env_parse("CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY)?;
        let cache = CacheConfig {
            ttl: Duration::from_secs(env_parse("CACHE_TTL_SECONDS", DEFAULT_CACHE_TTL_SECS)?),
            capacity: (capacity > 0).then_some(capacity),
        };

        let scoring = match env_opt("SCORING_CONFIG_PATH") {
            Some(path) => ScoringConfig::load(std::path::Path::new(&path))?,
            None => ScoringConfig::default(),
        };

        let concurrency_per_host: usize =
            env_parse("RPC_CONCURRENCY_PER_HOST", DEFAULT_CONCURRENCY_PER_HOST)?;
        if concurrency_per_host == 0 {
            return Err(AppError::invalid_config("RPC_CONCURRENCY_PER_HOST must be at least 1"));
        }

        Ok(Self {
            sei,
            ethereum,
            solana,
            retry: RetryPolicy::from_env()?,
            concurrency_per_host,
            cache,
            request_deadline: Duration::from_millis(env_parse(
                "REQUEST_DEADLINE_MS",
                DEFAULT_REQUEST_DEADLINE_MS,
            )?),
            model: ModelSource::from_env(),
            scoring,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::errors::ErrorCode;

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            jitter_percent: 0,
            per_call_timeout: Duration::from_millis(50),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
        assert_eq!(policy.backoff(30), Duration::from_millis(500));
    }

    #[test]
    fn test_backoff_jitter_stays_in_range() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(1000),
            jitter_percent: 20,
            ..RetryPolicy::default()
        };
        for _ in 0..100 {
            let d = policy.backoff(1).as_millis();
            assert!((800..=1200).contains(&d), "jittered delay out of range: {}", d);
        }
    }

    #[test]
    fn test_worst_case_bound() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            jitter_percent: 20,
            per_call_timeout: Duration::from_millis(200),
        };
        // 3 * 200 + (120 + 240)
        assert_eq!(policy.worst_case(), Duration::from_millis(960));
    }

    #[test]
    fn test_validate_endpoint() {
        assert_eq!(
            validate_endpoint("X", "https://evm-rpc.sei-apis.com/").unwrap(),
            "https://evm-rpc.sei-apis.com"
        );
        assert!(validate_endpoint("X", "not a url").is_err());
        assert!(validate_endpoint("X", "ftp://example.com").is_err());
    }

    #[test]
    fn test_default_scoring_config_is_valid() {
        let config = ScoringConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.weights.total(), 105.0);
    }

    #[test]
    fn test_thresholds_must_be_monotonic() {
        let mut config = ScoringConfig::default();
        config.thresholds = RiskThresholds { low: 500, medium: 500 };
        assert!(config.validate().is_err());
        config.thresholds = RiskThresholds { low: 1200, medium: 500 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dominant_weight_is_rejected() {
        let mut config = ScoringConfig::default();
        config.weights = FactorWeights {
            account_age: 1000.0,
            tx_activity: 1.0,
            balances: 1.0,
            defi: 1.0,
            staking: 1.0,
            governance: 1.0,
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigInvalidValue);

        // exactly half is still allowed
        config.weights.account_age = 5.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_scoring_override() {
        let config: ScoringConfig =
            serde_json::from_str(r#"{"thresholds": {"low": 750}}"#).unwrap();
        assert_eq!(config.thresholds.low, 750);
        assert_eq!(config.thresholds.medium, 500);
        assert_eq!(config.weights, FactorWeights::default());
    }
}
