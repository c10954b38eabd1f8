//! Type definitions for chainscore
//! Query, raw chain observations, feature vector and score result

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::{AppError, AppResult};

// ============================================
// Chains
// ============================================

/// Supported networks. Adding a network means adding a variant here
/// and an adapter for it in `providers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Sei,
    Ethereum,
    Solana,
}

impl Chain {
    pub const ALL: [Chain; 3] = [Chain::Sei, Chain::Ethereum, Chain::Solana];

    /// Parse user input (`sei`, `eth`/`ethereum`, `sol`/`solana`)
    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sei" => Ok(Self::Sei),
            "eth" | "ethereum" => Ok(Self::Ethereum),
            "sol" | "solana" => Ok(Self::Solana),
            other => Err(AppError::unsupported_chain(other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sei => "sei",
            Self::Ethereum => "eth",
            Self::Solana => "sol",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sei => "Sei",
            Self::Ethereum => "Ethereum",
            Self::Solana => "Solana",
        }
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            Self::Sei => "SEI",
            Self::Ethereum => "ETH",
            Self::Solana => "SOL",
        }
    }

    pub fn is_evm(&self) -> bool {
        matches!(self, Self::Sei | Self::Ethereum)
    }

    /// Check an address against this chain's grammar
    pub fn validate_address(&self, address: &str) -> AppResult<()> {
        if self.is_evm() {
            // 0x + 40 hex
            let well_formed = address.len() == 42
                && address.starts_with("0x")
                && Address::from_str(address).is_ok();
            if !well_formed {
                return Err(AppError::invalid_address(format!(
                    "{} address must be 0x followed by 40 hex characters: {}",
                    self.name(),
                    address
                )));
            }
        } else {
            let len_ok = (32..=44).contains(&address.len());
            let decoded = bs58::decode(address).into_vec();
            if !len_ok || !matches!(decoded, Ok(ref bytes) if bytes.len() == 32) {
                return Err(AppError::invalid_address(format!(
                    "Solana address must be base58 (32-44 chars, 32 bytes): {}",
                    address
                )));
            }
        }
        Ok(())
    }

    /// Canonical form used for cache keys and upstream queries
    pub fn normalize_address(&self, address: &str) -> String {
        if self.is_evm() {
            address.to_lowercase()
        } else {
            address.to_string()
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validated scoring request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WalletQuery {
    address: String,
    chain: Chain,
}

impl WalletQuery {
    /// Validate and normalize; malformed input is `InvalidAddress`
    pub fn new(address: &str, chain: Chain) -> AppResult<Self> {
        let trimmed = address.trim();
        chain.validate_address(trimmed)?;
        Ok(Self {
            address: chain.normalize_address(trimmed),
            chain,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }
}

// ============================================
// Raw activity (adapter output)
// ============================================

/// One observed transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxObservation {
    pub timestamp: Option<DateTime<Utc>>,
    /// Contract addresses / program ids touched (lowercased for EVM)
    pub counterparties: Vec<String>,
    /// Decoded method name, or the raw `0x` 4-byte selector
    pub method: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionHistory {
    /// Most recent transactions first, bounded by the adapter
    pub observations: Vec<TxObservation>,
    /// Total count reported upstream (may exceed `observations`)
    pub total_count: u64,
    /// Earliest known activity, when upstream can tell it directly
    pub first_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetBalance {
    /// Token contract / mint, or the native symbol
    pub asset_id: String,
    pub symbol: Option<String>,
    /// Amount in whole units (decimals applied when known)
    pub amount: f64,
    pub value_usd: Option<f64>,
    pub is_native: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub assets: Vec<AssetBalance>,
}

impl BalanceSheet {
    /// Liquid native balance (0 if absent)
    pub fn native_amount(&self) -> f64 {
        self.assets
            .iter()
            .filter(|a| a.is_native)
            .map(|a| a.amount)
            .sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StakingSnapshot {
    /// Staked amount in native units
    pub staked_amount: f64,
    pub delegations: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernanceSnapshot {
    pub votes_cast: u64,
    /// Voting end time of every known proposal
    pub proposal_deadlines: Vec<DateTime<Utc>>,
}

/// Protocol-specific extras; `None` means the chain has no such mechanism
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolExtras {
    pub staking: Option<StakingSnapshot>,
    pub governance: Option<GovernanceSnapshot>,
}

/// Sub-fetch sections of a raw record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Transactions,
    Balances,
    Staking,
    Governance,
}

impl Section {
    pub const COUNT: usize = 4;
}

/// Everything one adapter learned about one wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawActivityRecord {
    pub chain: Chain,
    pub address: String,
    pub transactions: TransactionHistory,
    pub balances: BalanceSheet,
    pub staking: Option<StakingSnapshot>,
    pub governance: Option<GovernanceSnapshot>,
    /// Sections whose fetch exhausted retries and were treated as empty
    pub unavailable_sections: Vec<Section>,
    pub observed_at: DateTime<Utc>,
}

impl RawActivityRecord {
    /// Record for a wallet that was never used
    pub fn empty(chain: Chain, address: &str, observed_at: DateTime<Utc>) -> Self {
        Self {
            chain,
            address: address.to_string(),
            transactions: TransactionHistory::default(),
            balances: BalanceSheet::default(),
            staking: None,
            governance: None,
            unavailable_sections: Vec::new(),
            observed_at,
        }
    }
}

// ============================================
// Feature vector
// ============================================

/// Feature order shared by every chain, the trained artifact and the API
pub const FEATURE_NAMES: [&str; 13] = [
    "account_age_days",
    "tx_count",
    "tx_velocity",
    "unique_counterparties",
    "balance_diversity_index",
    "asset_count",
    "stablecoin_share",
    "bluechip_share",
    "defi_interaction_count",
    "defi_category_count",
    "staking_ratio",
    "governance_participation",
    "data_completeness",
];

/// Fixed-schema, chain-agnostic summary of a wallet
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub account_age_days: f64,
    pub tx_count: f64,
    pub tx_velocity: f64,
    pub unique_counterparties: f64,
    pub balance_diversity_index: f64,
    pub asset_count: f64,
    pub stablecoin_share: f64,
    pub bluechip_share: f64,
    pub defi_interaction_count: f64,
    pub defi_category_count: f64,
    pub staking_ratio: f64,
    pub governance_participation: f64,
    pub data_completeness: f64,
}

impl FeatureVector {
    /// Values in `FEATURE_NAMES` order
    pub fn values(&self) -> [f64; 13] {
        [
            self.account_age_days,
            self.tx_count,
            self.tx_velocity,
            self.unique_counterparties,
            self.balance_diversity_index,
            self.asset_count,
            self.stablecoin_share,
            self.bluechip_share,
            self.defi_interaction_count,
            self.defi_category_count,
            self.staking_ratio,
            self.governance_participation,
            self.data_completeness,
        ]
    }

    /// (name, value) pairs in schema order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        FEATURE_NAMES.into_iter().zip(self.values())
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }
}

// ============================================
// Score result
// ============================================

/// Risk label derived from the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            RiskLevel::Low => "🟢",
            RiskLevel::Medium => "🟠",
            RiskLevel::High => "🔴",
        }
    }
}

/// Display band for a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScoreBand {
    Excellent,
    Good,
    Fair,
    Poor,
    VeryPoor,
}

impl ScoreBand {
    pub fn from_score(score: u16) -> Self {
        match score {
            850..=u16::MAX => Self::Excellent,
            700..=849 => Self::Good,
            500..=699 => Self::Fair,
            300..=499 => Self::Poor,
            _ => Self::VeryPoor,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
            Self::VeryPoor => "Very Poor",
        }
    }
}

/// Signed point contribution of one factor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreFactor {
    pub name: String,
    pub points: i32,
    pub max_points: i32,
}

/// Final, immutable scoring response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub wallet: String,
    pub chain: Chain,
    pub score: u16,
    pub risk: RiskLevel,
    pub confidence: f64,
    /// Ordered breakdown; points sum to `score`
    pub factors: Vec<ScoreFactor>,
    pub model_version: String,
    pub computed_at: DateTime<Utc>,
}

impl ScoreResult {
    pub fn band(&self) -> ScoreBand {
        ScoreBand::from_score(self.score)
    }

    pub fn factor_sum(&self) -> i32 {
        self.factors.iter().map(|f| f.points).sum()
    }

    /// One-line summary for logs / CLI
    pub fn summary(&self) -> String {
        format!(
            "{} {} | Score: {} ({}) | Risk: {} | Confidence: {:.0}% | Model: {}",
            self.risk.emoji(),
            self.wallet,
            self.score,
            self.band().as_str(),
            self.risk.as_str(),
            self.confidence * 100.0,
            self.model_version
        )
    }
}
