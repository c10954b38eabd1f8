//! Chain adapter capability trait and registry
//!
//! Setiap jaringan punya satu adapter. Adapter tidak menyimpan state per-call;
//! semua adapter berbagi satu `HttpTransport` (connection pool + rate budget).

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::ethereum::EthereumAdapter;
use super::rpc::HttpTransport;
use super::sei::SeiAdapter;
use super::solana::SolanaAdapter;
use crate::models::config::AppConfig;
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{
    BalanceSheet, Chain, ProtocolExtras, RawActivityRecord, Section, TransactionHistory,
};

/// Read-only data source for one network
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> Chain;

    async fn fetch_transactions(&self, address: &str) -> AppResult<TransactionHistory>;

    async fn fetch_balances(&self, address: &str) -> AppResult<BalanceSheet>;

    /// Staking and governance; `None` fields mean the chain has no such concept
    async fn fetch_extras(&self, address: &str) -> AppResult<ProtocolExtras>;

    /// Cheap liveness probe against the adapter's primary endpoint
    async fn health_check(&self) -> AppResult<()>;

    /// Run the three sub-fetches concurrently and join them
    ///
    /// Transactions and balances are required. Extras that exhausted their
    /// retries are recorded as unavailable and treated as empty.
    async fn fetch(&self, address: &str) -> AppResult<RawActivityRecord> {
        let (transactions, balances, extras) = tokio::join!(
            self.fetch_transactions(address),
            self.fetch_balances(address),
            self.fetch_extras(address)
        );

        let mut record = RawActivityRecord::empty(self.chain(), address, Utc::now());
        record.transactions = transactions?;
        record.balances = balances?;

        match extras {
            Ok(extras) => {
                record.staking = extras.staking;
                record.governance = extras.governance;
            }
            Err(e) if e.code == ErrorCode::SourceUnavailable => {
                warn!(
                    chain = %self.chain(),
                    "⚠️ Extras unavailable, continuing without staking/governance: {}",
                    e
                );
                record.unavailable_sections.push(Section::Staking);
                record.unavailable_sections.push(Section::Governance);
            }
            Err(e) => return Err(e),
        }

        Ok(record)
    }
}

/// One adapter per configured chain
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Chain, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the adapter for its chain
    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) {
        self.adapters.insert(adapter.chain(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Build every adapter whose endpoints are configured, on one shared transport
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let transport = Arc::new(HttpTransport::new(
            config.retry.clone(),
            config.concurrency_per_host,
        )?);
        let mut registry = Self::new();

        if let Some(sei) = &config.sei {
            registry.register(Arc::new(SeiAdapter::new(transport.clone(), sei)));
        }
        if let Some(eth) = &config.ethereum {
            registry.register(Arc::new(EthereumAdapter::new(transport.clone(), eth)));
        }
        if let Some(sol) = &config.solana {
            registry.register(Arc::new(SolanaAdapter::new(transport.clone(), sol)));
        }

        let chains: Vec<&str> = registry.chains().iter().map(|c| c.as_str()).collect();
        info!("🔗 Chain adapters ready: [{}]", chains.join(", "));
        Ok(registry)
    }

    /// Adapter for `chain`, or `ChainNotConfigured`
    pub fn get(&self, chain: Chain) -> AppResult<Arc<dyn ChainAdapter>> {
        self.adapters
            .get(&chain)
            .cloned()
            .ok_or_else(|| AppError::chain_not_configured(chain.as_str()))
    }

    /// Configured chains in stable order
    pub fn chains(&self) -> Vec<Chain> {
        Chain::ALL
            .into_iter()
            .filter(|c| self.adapters.contains_key(c))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
