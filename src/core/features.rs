//! Feature Extraction Module
//!
//! Mengubah `RawActivityRecord` per-chain menjadi `FeatureVector` dengan
//! skema tetap. Pure: tanpa I/O, tidak pernah gagal, deterministik.

use alloy_primitives::keccak256;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::models::types::{Chain, FeatureVector, RawActivityRecord, Section};
use crate::utils::constants::{
    classify_asset, known_protocols, AssetClass, ProtocolCategory, ProtocolInfo, KNOWN_SIGNATURES,
};

/// Upper bound for transactions per day
pub const VELOCITY_CLIP: f64 = 50.0;

/// Trailing windows (days) averaged into tx_velocity
const VELOCITY_WINDOWS: [i64; 3] = [30, 90, 365];

/// Chain-agnostic feature extractor
///
/// Lookup tables (protocol allow-list, method selectors) are built once.
pub struct FeatureExtractor {
    protocols: HashMap<Chain, HashMap<String, ProtocolInfo>>,
    /// Method name or `0x` selector -> category
    signatures: HashMap<String, ProtocolCategory>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor {
    pub fn new() -> Self {
        let protocols = Chain::ALL
            .into_iter()
            .map(|chain| {
                let table = known_protocols(chain)
                    .into_iter()
                    .map(|p| (normalize_id(chain, p.address), p))
                    .collect();
                (chain, table)
            })
            .collect();

        let mut signatures = HashMap::new();
        for (signature, category) in KNOWN_SIGNATURES {
            let selector = format!("0x{}", hex::encode(&keccak256(signature.as_bytes())[..4]));
            signatures.insert(selector, category);
            if let Some((name, _)) = signature.split_once('(') {
                signatures.insert(name.to_string(), category);
            }
        }

        Self {
            protocols,
            signatures,
        }
    }

    pub fn extract(&self, record: &RawActivityRecord) -> FeatureVector {
        let observed_at = record.observed_at;
        let first_activity = first_activity(record);
        let account_age_days = first_activity
            .map(|first| days_between(first, observed_at))
            .unwrap_or(0.0);

        let (defi_interaction_count, defi_category_count) = self.defi_usage(record);
        let holdings = HoldingStats::from_record(record);

        FeatureVector {
            account_age_days,
            tx_count: record
                .transactions
                .total_count
                .max(record.transactions.observations.len() as u64) as f64,
            tx_velocity: tx_velocity(record, account_age_days),
            unique_counterparties: unique_counterparties(record),
            balance_diversity_index: holdings.diversity,
            asset_count: holdings.count as f64,
            stablecoin_share: holdings.stablecoin_share,
            bluechip_share: holdings.bluechip_share,
            defi_interaction_count,
            defi_category_count,
            staking_ratio: staking_ratio(record),
            governance_participation: governance_participation(record, first_activity),
            data_completeness: 1.0
                - record.unavailable_sections.len().min(Section::COUNT) as f64
                    / Section::COUNT as f64,
        }
    }

    /// Distinct recognized protocols and their distinct categories
    fn defi_usage(&self, record: &RawActivityRecord) -> (f64, f64) {
        let table = self.protocols.get(&record.chain);
        let mut protocols: HashSet<String> = HashSet::new();
        let mut categories: BTreeSet<ProtocolCategory> = BTreeSet::new();

        for obs in &record.transactions.observations {
            let known = obs.counterparties.iter().find_map(|cp| {
                table.and_then(|t| t.get(&normalize_id(record.chain, cp)))
            });
            if let Some(info) = known {
                protocols.insert(info.name.to_string());
                categories.insert(info.category);
                continue;
            }

            // Unlisted contract called with a well-known DeFi method
            if !record.chain.is_evm() {
                continue;
            }
            let category = obs.method.as_deref().and_then(|m| self.method_category(m));
            if let (Some(category), Some(contract)) = (category, obs.counterparties.first()) {
                protocols.insert(contract.to_lowercase());
                categories.insert(category);
            }
        }

        (protocols.len() as f64, categories.len() as f64)
    }

    fn method_category(&self, method: &str) -> Option<ProtocolCategory> {
        let method = method.trim();
        let key = if method.starts_with("0x") {
            method.get(..10)?.to_lowercase()
        } else {
            method.split('(').next().unwrap_or(method).to_string()
        };
        self.signatures.get(&key).copied()
    }
}

fn normalize_id(chain: Chain, id: &str) -> String {
    if chain.is_evm() {
        id.to_lowercase()
    } else {
        id.to_string()
    }
}

fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    ((to - from).num_seconds() as f64 / 86_400.0).max(0.0)
}

/// `first_seen`, else the oldest observed timestamp
fn first_activity(record: &RawActivityRecord) -> Option<DateTime<Utc>> {
    let oldest = record
        .transactions
        .observations
        .iter()
        .filter_map(|o| o.timestamp)
        .min();
    match (record.transactions.first_seen, oldest) {
        (Some(first), Some(oldest)) => Some(first.min(oldest)),
        (first, oldest) => first.or(oldest),
    }
}

fn tx_velocity(record: &RawActivityRecord, age_days: f64) -> f64 {
    if record.transactions.observations.is_empty() {
        return 0.0;
    }
    let observed_at = record.observed_at;
    let rates: Vec<f64> = VELOCITY_WINDOWS
        .iter()
        .map(|&window| {
            let start = observed_at - Duration::days(window);
            let count = record
                .transactions
                .observations
                .iter()
                .filter_map(|o| o.timestamp)
                .filter(|t| *t > start && *t <= observed_at)
                .count();
            count as f64 / (window as f64).min(age_days.max(1.0))
        })
        .collect();
    let mean = rates.iter().sum::<f64>() / rates.len() as f64;
    mean.clamp(0.0, VELOCITY_CLIP)
}

fn unique_counterparties(record: &RawActivityRecord) -> f64 {
    record
        .transactions
        .observations
        .iter()
        .flat_map(|o| o.counterparties.iter())
        .map(|cp| cp.to_lowercase())
        .collect::<HashSet<_>>()
        .len() as f64
}

struct HoldingStats {
    count: usize,
    diversity: f64,
    stablecoin_share: f64,
    bluechip_share: f64,
}

impl HoldingStats {
    fn from_record(record: &RawActivityRecord) -> Self {
        let held: Vec<_> = record
            .balances
            .assets
            .iter()
            .filter(|a| a.amount.is_finite() && a.amount > 0.0)
            .collect();
        let count = held.len();
        if count == 0 {
            return Self {
                count: 0,
                diversity: 0.0,
                stablecoin_share: 0.0,
                bluechip_share: 0.0,
            };
        }

        // USD weights only when every holding is priced
        let usd: Option<Vec<f64>> = held.iter().map(|a| a.value_usd.filter(|v| *v >= 0.0)).collect();
        let weights = match usd {
            Some(values) if values.iter().sum::<f64>() > 0.0 => values,
            _ => vec![1.0; count],
        };
        let total: f64 = weights.iter().sum();
        let diversity = if count < 2 {
            0.0
        } else {
            1.0 - weights.iter().map(|w| (w / total).powi(2)).sum::<f64>()
        };

        let class_share = |class: AssetClass| {
            held.iter()
                .filter(|a| classify_asset(&a.asset_id, a.symbol.as_deref(), a.is_native) == class)
                .count() as f64
                / count as f64
        };

        Self {
            count,
            diversity: diversity.clamp(0.0, 1.0),
            stablecoin_share: class_share(AssetClass::Stablecoin),
            bluechip_share: class_share(AssetClass::Bluechip),
        }
    }
}

fn staking_ratio(record: &RawActivityRecord) -> f64 {
    let Some(staking) = &record.staking else {
        return 0.0;
    };
    let staked = staking.staked_amount.max(0.0);
    let total = staked + record.balances.native_amount().max(0.0);
    if total > 0.0 {
        (staked / total).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn governance_participation(record: &RawActivityRecord, first_activity: Option<DateTime<Utc>>) -> f64 {
    let Some(gov) = &record.governance else {
        return 0.0;
    };
    let eligible = gov
        .proposal_deadlines
        .iter()
        .filter(|deadline| first_activity.map_or(true, |first| **deadline >= first))
        .count();
    if eligible == 0 {
        return 0.0;
    }
    (gov.votes_cast as f64 / eligible as f64).min(1.0)
}
