//! Score Orchestrator
//!
//! Coordinates one request end to end:
//! `Received → CacheCheck → HitReturn | ComputeInProgress → AdapterFetch → Extract → Score
//!  → CacheStore → Return`, with `ComputeFailed → ErrorReturn` on any failure.
//!
//! The request deadline bounds every waiter and the shared computation itself, so a
//! late result is dropped instead of cached.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use super::features::FeatureExtractor;
use super::scoring::ScoringModel;
use crate::models::config::AppConfig;
use crate::models::errors::{AppError, AppResult};
use crate::models::types::{Chain, ScoreResult, WalletQuery};
use crate::providers::adapter::{AdapterRegistry, ChainAdapter};
use crate::utils::cache::{CacheKey, CacheStats, ResultCache};
use crate::utils::constants::APP_VERSION;

/// Lifecycle of one scoring request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    CacheCheck,
    HitReturn,
    ComputeInProgress,
    AdapterFetch,
    Extract,
    Score,
    CacheStore,
    Return,
    ComputeFailed,
    ErrorReturn,
}

fn enter(state: RequestState) {
    debug!(state = ?state, "request state");
}

/// Score plus request metadata
#[derive(Debug, Clone, Serialize)]
pub struct ScoreResponse {
    #[serde(flatten)]
    pub result: ScoreResult,
    pub band: &'static str,
    pub latency_ms: u64,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    pub model_version: String,
    pub model_degraded: bool,
    pub model_loaded_at: DateTime<Utc>,
    pub chains: Vec<Chain>,
    pub cache: CacheStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainHealth {
    pub chain: Chain,
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct ScoreOrchestrator {
    adapters: AdapterRegistry,
    extractor: Arc<FeatureExtractor>,
    model: Arc<ScoringModel>,
    cache: Arc<ResultCache<ScoreResult>>,
    request_deadline: Duration,
}

impl ScoreOrchestrator {
    pub fn new(
        adapters: AdapterRegistry,
        model: Arc<ScoringModel>,
        cache: Arc<ResultCache<ScoreResult>>,
        request_deadline: Duration,
    ) -> Self {
        Self {
            adapters,
            extractor: Arc::new(FeatureExtractor::new()),
            model,
            cache,
            request_deadline,
        }
    }

    /// Wire adapters, model and cache from configuration (model load is a cold-start step)
    pub async fn from_config(config: &AppConfig) -> AppResult<Self> {
        let adapters = AdapterRegistry::from_config(config)?;
        let model = Arc::new(ScoringModel::load(&config.model, config.scoring.clone()).await);
        let cache = Arc::new(ResultCache::new(&config.cache));
        Ok(Self::new(adapters, model, cache, config.request_deadline))
    }

    pub fn cache(&self) -> &Arc<ResultCache<ScoreResult>> {
        &self.cache
    }

    pub fn model(&self) -> &Arc<ScoringModel> {
        &self.model
    }

    pub fn chains(&self) -> Vec<Chain> {
        self.adapters.chains()
    }

    pub fn request_deadline(&self) -> Duration {
        self.request_deadline
    }

    /// Score one wallet
    pub async fn get_score(&self, address: &str, chain: Chain) -> AppResult<ScoreResponse> {
        let span = info_span!(
            "score",
            request_id = %uuid::Uuid::new_v4(),
            chain = %chain,
            wallet = %address.trim()
        );
        self.run(address, chain).instrument(span).await
    }

    async fn run(&self, address: &str, chain: Chain) -> AppResult<ScoreResponse> {
        let started = Instant::now();
        enter(RequestState::Received);

        let outcome = self.resolve(address, chain).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok((result, cached)) => {
                enter(if cached { RequestState::HitReturn } else { RequestState::Return });
                info!(
                    latency_ms,
                    cached,
                    "{} {} | score {} | {}",
                    result.risk.emoji(),
                    result.chain,
                    result.score,
                    result.model_version
                );
                Ok(ScoreResponse {
                    band: result.band().as_str(),
                    result,
                    latency_ms,
                    cached,
                })
            }
            Err(e) => {
                enter(RequestState::ErrorReturn);
                warn!(
                    code = e.code_str(),
                    kind = e.kind().as_str(),
                    latency_ms,
                    "❌ Scoring failed: {}",
                    e
                );
                Err(e)
            }
        }
    }

    async fn resolve(&self, address: &str, chain: Chain) -> AppResult<(ScoreResult, bool)> {
        let query = WalletQuery::new(address, chain)?;
        let adapter = self.adapters.get(chain)?;

        enter(RequestState::CacheCheck);
        let key = CacheKey::new(chain, query.address());
        let deadline = self.request_deadline;
        let extractor = self.extractor.clone();
        let model = self.model.clone();

        let compute = move || async move {
            enter(RequestState::ComputeInProgress);
            match tokio::time::timeout(deadline, compute_score(adapter, extractor, model, query)).await {
                Ok(result) => result,
                Err(_) => Err(AppError::timeout(deadline.as_millis() as u64)),
            }
        };

        match tokio::time::timeout(deadline, self.cache.get_or_compute(key, compute)).await {
            Ok(result) => result,
            Err(_) => {
                enter(RequestState::ComputeFailed);
                Err(AppError::timeout(deadline.as_millis() as u64))
            }
        }
    }

    /// Engine status for health endpoints
    pub fn health(&self) -> HealthReport {
        let chains = self.adapters.chains();
        let status = if chains.is_empty() {
            "unavailable"
        } else if self.model.is_degraded() {
            "degraded"
        } else {
            "healthy"
        };
        HealthReport {
            status,
            version: APP_VERSION,
            model_version: self.model.version().to_string(),
            model_degraded: self.model.is_degraded(),
            model_loaded_at: self.model.loaded_at(),
            chains,
            cache: self.cache.stats(),
        }
    }

    /// Probe every configured adapter concurrently
    pub async fn chain_health(&self) -> Vec<ChainHealth> {
        let probes = self.adapters.chains().into_iter().filter_map(|chain| {
            let adapter = self.adapters.get(chain).ok()?;
            let deadline = self.request_deadline;
            Some(async move {
                let started = Instant::now();
                let outcome = match tokio::time::timeout(deadline, adapter.health_check()).await {
                    Ok(result) => result,
                    Err(_) => Err(AppError::timeout(deadline.as_millis() as u64)),
                };
                ChainHealth {
                    chain,
                    healthy: outcome.is_ok(),
                    latency_ms: started.elapsed().as_millis() as u64,
                    error: outcome.err().map(|e| e.to_string()),
                }
            })
        });
        join_all(probes).await
    }

    /// Periodic removal of expired cache entries
    pub fn spawn_cache_cleanup(&self, every: Duration) -> JoinHandle<()> {
        let cache = self.cache.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.cleanup_expired();
            }
        })
    }
}

/// Fetch → extract → score for one wallet
async fn compute_score(
    adapter: Arc<dyn ChainAdapter>,
    extractor: Arc<FeatureExtractor>,
    model: Arc<ScoringModel>,
    query: WalletQuery,
) -> AppResult<ScoreResult> {
    enter(RequestState::AdapterFetch);
    let record = adapter.fetch(query.address()).await.map_err(|e| {
        enter(RequestState::ComputeFailed);
        e
    })?;

    enter(RequestState::Extract);
    let features = extractor.extract(&record);
    debug!(?features, "features extracted");

    enter(RequestState::Score);
    let output = model.score(&features);

    enter(RequestState::CacheStore);
    Ok(ScoreResult {
        wallet: query.address().to_string(),
        chain: query.chain(),
        score: output.score,
        risk: output.risk,
        confidence: output.confidence,
        factors: output.factors,
        model_version: output.model_version,
        computed_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::ScoringConfig;
    use crate::models::errors::{ErrorCode, ErrorKind};
    use crate::models::types::{BalanceSheet, ProtocolExtras, RiskLevel, TransactionHistory};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EmptyAdapter {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl ChainAdapter for EmptyAdapter {
        fn chain(&self) -> Chain {
            Chain::Ethereum
        }
        async fn fetch_transactions(&self, _address: &str) -> AppResult<TransactionHistory> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(TransactionHistory::default())
        }
        async fn fetch_balances(&self, _address: &str) -> AppResult<BalanceSheet> {
            Ok(BalanceSheet::default())
        }
        async fn fetch_extras(&self, _address: &str) -> AppResult<ProtocolExtras> {
            Ok(ProtocolExtras::default())
        }
        async fn health_check(&self) -> AppResult<()> {
            Ok(())
        }
    }

    fn orchestrator(delay: Duration, deadline: Duration) -> (ScoreOrchestrator, Arc<EmptyAdapter>) {
        let adapter = Arc::new(EmptyAdapter {
            calls: AtomicUsize::new(0),
            delay,
        });
        let registry = AdapterRegistry::new().with(adapter.clone());
        let orchestrator = ScoreOrchestrator::new(
            registry,
            Arc::new(ScoringModel::rule_based(ScoringConfig::default())),
            Arc::new(ResultCache::with_ttl(Duration::from_secs(60))),
            deadline,
        );
        (orchestrator, adapter)
    }

    const WALLET: &str = "0x000000000000000000000000000000000000dEaD";

    #[tokio::test]
    async fn test_zero_wallet_scores_zero() {
        let (orch, _) = orchestrator(Duration::ZERO, Duration::from_secs(5));
        let response = orch.get_score(WALLET, Chain::Ethereum).await.unwrap();
        assert_eq!(response.result.score, 0);
        assert_eq!(response.result.risk, RiskLevel::High);
        assert_eq!(response.result.wallet, WALLET.to_lowercase());
        assert!(!response.cached);

        let again = orch.get_score(WALLET, Chain::Ethereum).await.unwrap();
        assert!(again.cached);
        assert_eq!(again.result, response.result);
    }

    #[tokio::test]
    async fn test_invalid_address_rejected_before_fetch() {
        let (orch, adapter) = orchestrator(Duration::ZERO, Duration::from_secs(5));
        let err = orch.get_score("0x1234", Chain::Ethereum).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAddress);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_chain() {
        let (orch, _) = orchestrator(Duration::ZERO, Duration::from_secs(5));
        let err = orch.get_score(WALLET, Chain::Sei).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ChainNotConfigured);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded_is_timeout_and_not_cached() {
        let (orch, _) = orchestrator(Duration::from_secs(30), Duration::from_secs(1));
        let err = orch.get_score(WALLET, Chain::Ethereum).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(orch.cache().is_empty());
    }

    #[tokio::test]
    async fn test_health_report() {
        let (orch, _) = orchestrator(Duration::ZERO, Duration::from_secs(5));
        let health = orch.health();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.chains, vec![Chain::Ethereum]);
        assert_eq!(health.model_version, "rules-v1");

        let chains = orch.chain_health().await;
        assert_eq!(chains.len(), 1);
        assert!(chains[0].healthy);
    }
}
