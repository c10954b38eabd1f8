//! Solana Provider Module
//!
//! Standard Solana JSON-RPC only:
//! 1. `getSignaturesForAddress` - bounded history with block times
//! 2. `getTransaction` - invoked program ids of the most recent signatures
//! 3. `getBalance` + `getTokenAccountsByOwner` (jsonParsed) - holdings
//! 4. `getProgramAccounts` on the Stake program - native stake by staker authority
//!
//! Solana has no on-chain governance record reachable here; `governance` is always `None`.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::adapter::ChainAdapter;
use super::rpc::{or_empty, HttpTransport, RpcProvider};
use crate::models::config::SolanaEndpoints;
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{
    AssetBalance, BalanceSheet, Chain, ProtocolExtras, StakingSnapshot, TransactionHistory,
    TxObservation,
};
use crate::utils::constants::{
    LAMPORTS_PER_SOL, SOLANA_MAX_SIGNATURES, SOLANA_MAX_TX_INSPECT, SOLANA_STAKER_OFFSET,
    SOLANA_STAKE_PROGRAM, SOLANA_TOKEN_PROGRAM,
};

/// Runtime programs present in nearly every transaction
const INFRASTRUCTURE_PROGRAMS: [&str; 3] = [
    "11111111111111111111111111111111",
    "ComputeBudget111111111111111111111111111111",
    "Vote111111111111111111111111111111111111111",
];

// ============================================
// SOLANA RPC TYPES
// ============================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureInfo {
    signature: String,
    block_time: Option<i64>,
}

/// Solana transaction (json encoding)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolanaTransaction {
    transaction: TransactionData,
}

#[derive(Debug, Clone, Deserialize)]
struct TransactionData {
    message: TransactionMessage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionMessage {
    account_keys: Vec<String>,
    #[serde(default)]
    instructions: Vec<TransactionInstruction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionInstruction {
    program_id_index: usize,
}

/// `{ context, value }` wrapper used by most account queries
#[derive(Debug, Clone, Default, Deserialize)]
struct RpcValue<T> {
    value: T,
}

#[derive(Debug, Clone, Deserialize)]
struct KeyedAccount<A> {
    account: A,
}

#[derive(Debug, Clone, Deserialize)]
struct TokenAccount {
    data: ParsedAccountData,
}

#[derive(Debug, Clone, Deserialize)]
struct ParsedAccountData {
    parsed: ParsedTokenAccount,
}

#[derive(Debug, Clone, Deserialize)]
struct ParsedTokenAccount {
    info: TokenAccountInfo,
}

/// Token account info
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenAccountInfo {
    mint: String,
    token_amount: TokenAmount,
}

/// Token amount
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenAmount {
    amount: String,
    decimals: u8,
    ui_amount: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct LamportsOnly {
    lamports: u64,
}

// ============================================
// ADAPTER
// ============================================

pub struct SolanaAdapter {
    provider: RpcProvider,
}

impl SolanaAdapter {
    pub fn new(transport: Arc<HttpTransport>, endpoints: &SolanaEndpoints) -> Self {
        let provider = RpcProvider::new(transport, &endpoints.rpc_url, "solana");
        info!("◎ Solana adapter: rpc={}", provider.masked_url());
        Self { provider }
    }

    /// Program ids invoked by one transaction (empty when the node pruned it)
    async fn invoked_programs(&self, signature: &str) -> AppResult<Vec<String>> {
        let params = serde_json::json!([
            signature,
            { "encoding": "json", "maxSupportedTransactionVersion": 0 }
        ]);
        let tx: Option<SolanaTransaction> = or_empty(self.provider.call("getTransaction", params).await)?;
        Ok(tx.map(|tx| program_ids(&tx)).unwrap_or_default())
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn chain(&self) -> Chain {
        Chain::Solana
    }

    async fn fetch_transactions(&self, address: &str) -> AppResult<TransactionHistory> {
        let params = serde_json::json!([address, { "limit": SOLANA_MAX_SIGNATURES }]);
        let signatures: Vec<SignatureInfo> =
            or_empty(self.provider.call("getSignaturesForAddress", params).await)?;

        let inspected = join_all(
            signatures
                .iter()
                .take(SOLANA_MAX_TX_INSPECT)
                .map(|s| self.invoked_programs(&s.signature)),
        )
        .await;

        let mut observations: Vec<TxObservation> = signatures
            .iter()
            .map(|s| TxObservation {
                timestamp: s.block_time.and_then(block_time),
                counterparties: Vec::new(),
                method: None,
            })
            .collect();
        for (observation, programs) in observations.iter_mut().zip(inspected) {
            observation.counterparties = programs?;
        }

        // A short page is the whole history, so its oldest entry is the first activity
        let first_seen = if signatures.len() < SOLANA_MAX_SIGNATURES {
            observations.iter().filter_map(|o| o.timestamp).min()
        } else {
            None
        };
        debug!("◎ {} signatures for {}", signatures.len(), address);

        Ok(TransactionHistory {
            total_count: signatures.len() as u64,
            first_seen,
            observations,
        })
    }

    async fn fetch_balances(&self, address: &str) -> AppResult<BalanceSheet> {
        let (lamports, tokens) = tokio::join!(
            self.provider
                .call::<RpcValue<u64>>("getBalance", serde_json::json!([address])),
            self.provider.call::<RpcValue<Vec<KeyedAccount<TokenAccount>>>>(
                "getTokenAccountsByOwner",
                serde_json::json!([
                    address,
                    { "programId": SOLANA_TOKEN_PROGRAM },
                    { "encoding": "jsonParsed" }
                ])
            )
        );

        let mut assets = vec![AssetBalance {
            asset_id: "SOL".to_string(),
            symbol: Some("SOL".to_string()),
            amount: or_empty(lamports)?.value as f64 / LAMPORTS_PER_SOL,
            value_usd: None,
            is_native: true,
        }];
        assets.extend(
            or_empty(tokens)?
                .value
                .iter()
                .map(|keyed| token_balance_from(&keyed.account.data.parsed.info)),
        );
        Ok(BalanceSheet { assets })
    }

    async fn fetch_extras(&self, address: &str) -> AppResult<ProtocolExtras> {
        let params = serde_json::json!([
            SOLANA_STAKE_PROGRAM,
            {
                "encoding": "base64",
                "dataSlice": { "offset": 0, "length": 0 },
                "filters": [{ "memcmp": { "offset": SOLANA_STAKER_OFFSET, "bytes": address } }]
            }
        ]);

        let accounts: Vec<KeyedAccount<LamportsOnly>> =
            match self.provider.call("getProgramAccounts", params).await {
                Ok(accounts) => accounts,
                Err(e) if e.code == ErrorCode::RpcNotFound => Vec::new(),
                // Many public endpoints refuse program scans
                Err(e) if e.code == ErrorCode::RpcError => {
                    return Err(AppError::source_unavailable(
                        "stake account scan refused by endpoint",
                        Some(e),
                    ))
                }
                Err(e) => return Err(e),
            };

        Ok(ProtocolExtras {
            staking: Some(summarize_stake(&accounts)),
            governance: None,
        })
    }

    async fn health_check(&self) -> AppResult<()> {
        self.provider
            .call::<u64>("getSlot", serde_json::json!([]))
            .await
            .map(|_| ())
    }
}

fn block_time(seconds: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0).single()
}

fn program_ids(tx: &SolanaTransaction) -> Vec<String> {
    let keys = &tx.transaction.message.account_keys;
    let mut programs: Vec<String> = Vec::new();
    for ix in &tx.transaction.message.instructions {
        if let Some(program) = keys.get(ix.program_id_index) {
            if !INFRASTRUCTURE_PROGRAMS.contains(&program.as_str()) && !programs.contains(program) {
                programs.push(program.clone());
            }
        }
    }
    programs
}

fn token_balance_from(info: &TokenAccountInfo) -> AssetBalance {
    let amount = info.token_amount.ui_amount.unwrap_or_else(|| {
        info.token_amount.amount.parse::<f64>().unwrap_or(0.0)
            / 10f64.powi(info.token_amount.decimals as i32)
    });
    AssetBalance {
        asset_id: info.mint.clone(),
        symbol: None,
        amount,
        value_usd: None,
        is_native: false,
    }
}

fn summarize_stake(accounts: &[KeyedAccount<LamportsOnly>]) -> StakingSnapshot {
    let lamports: u64 = accounts.iter().map(|a| a.account.lamports).sum();
    StakingSnapshot {
        staked_amount: lamports as f64 / LAMPORTS_PER_SOL,
        delegations: accounts.len() as u32,
    }
}
