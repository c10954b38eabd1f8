//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chainscore::models::types::{
    AssetBalance, BalanceSheet, GovernanceSnapshot, ProtocolExtras, StakingSnapshot,
    TransactionHistory, TxObservation,
};
use chainscore::utils::constants::SEI_IBC_PRECOMPILE;
use chainscore::{
    AdapterRegistry, AppError, AppResult, Chain, ChainAdapter, ResultCache, ScoreOrchestrator,
    ScoringConfig, ScoringModel,
};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Well-formed Sei EVM address used across tests
pub fn scenario_wallet() -> String {
    format!("0x{}{}", "a".repeat(37), "111")
}

/// In-memory adapter with a call counter, optional latency and a failure switch
pub struct FakeAdapter {
    chain: Chain,
    transactions: TransactionHistory,
    balances: BalanceSheet,
    extras: ProtocolExtras,
    delay: Duration,
    fail: AtomicBool,
    calls: AtomicU32,
}

impl FakeAdapter {
    pub fn empty(chain: Chain) -> Self {
        Self {
            chain,
            transactions: TransactionHistory::default(),
            balances: BalanceSheet::default(),
            extras: ProtocolExtras::default(),
            delay: Duration::ZERO,
            fail: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        }
    }

    /// 50 txs over 400 days, 5 priced assets, 2 DeFi protocols,
    /// staking ratio 0.3, governance 1 of 10
    pub fn scenario() -> Self {
        let now = Utc::now();
        let observations = (0..50)
            .map(|i| {
                let (counterparties, method) = match i {
                    0 => (vec![SEI_IBC_PRECOMPILE.to_string()], Some("transfer".to_string())),
                    1 => (
                        vec!["0x5555555555555555555555555555555555555555".to_string()],
                        Some("swapExactTokensForTokens".to_string()),
                    ),
                    n => (vec![format!("0x{:040x}", 0x1000 + n % 3)], None),
                };
                TxObservation {
                    timestamp: Some(now - ChronoDuration::days(1 + 8 * i)),
                    counterparties,
                    method,
                }
            })
            .collect();

        let asset = |id: &str, amount: f64, native: bool| AssetBalance {
            asset_id: id.to_string(),
            symbol: Some(id.to_string()),
            amount,
            value_usd: Some(100.0),
            is_native: native,
        };

        Self {
            transactions: TransactionHistory {
                observations,
                total_count: 50,
                first_seen: Some(now - ChronoDuration::days(400)),
            },
            balances: BalanceSheet {
                assets: vec![
                    asset("SEI", 7.0, true),
                    asset("USDC", 100.0, false),
                    asset("WETH", 0.03, false),
                    asset("0x00000000000000000000000000000000000000a1", 12.0, false),
                    asset("0x00000000000000000000000000000000000000a2", 40.0, false),
                ],
            },
            extras: ProtocolExtras {
                staking: Some(StakingSnapshot {
                    staked_amount: 3.0,
                    delegations: 1,
                }),
                governance: Some(GovernanceSnapshot {
                    votes_cast: 1,
                    proposal_deadlines: (0..10)
                        .map(|i| now - ChronoDuration::days(10 + 25 * i))
                        .collect(),
                }),
            },
            ..Self::empty(Chain::Sei)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Completed `fetch_transactions` invocations (one per computation)
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainAdapter for FakeAdapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn fetch_transactions(&self, _address: &str) -> AppResult<TransactionHistory> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::source_unavailable("fake upstream down", None));
        }
        Ok(self.transactions.clone())
    }

    async fn fetch_balances(&self, _address: &str) -> AppResult<BalanceSheet> {
        Ok(self.balances.clone())
    }

    async fn fetch_extras(&self, _address: &str) -> AppResult<ProtocolExtras> {
        Ok(self.extras.clone())
    }

    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }
}

/// Orchestrator over one fake adapter with rule-based scoring
pub fn orchestrator_with(
    adapter: Arc<FakeAdapter>,
    ttl: Duration,
    deadline: Duration,
) -> ScoreOrchestrator {
    let registry = AdapterRegistry::new().with(adapter);
    let model = Arc::new(ScoringModel::rule_based(ScoringConfig::default()));
    let cache = Arc::new(ResultCache::with_ttl(ttl));
    ScoreOrchestrator::new(registry, model, cache, deadline)
}
