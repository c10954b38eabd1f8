//! Ethereum Provider Module
//!
//! Alchemy Enhanced API over plain JSON-RPC:
//! - `alchemy_getAssetTransfers` - history (desc, bounded) and first activity (asc, one item)
//! - `alchemy_getTokenBalances` + `alchemy_getTokenMetadata` - ERC-20 holdings
//! - `eth_getTransactionCount` - nonce as the outgoing transaction total
//! - stETH `balanceOf` via `eth_call` - liquid staking position
//!
//! Ethereum has no on-chain governance record reachable here; `governance` is always `None`.

use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use super::adapter::ChainAdapter;
use super::rpc::{or_empty, HttpTransport, RpcProvider};
use crate::models::config::EthereumEndpoints;
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{
    AssetBalance, BalanceSheet, Chain, ProtocolExtras, StakingSnapshot, TransactionHistory,
    TxObservation,
};
use crate::utils::constants::{
    parse_hex_quantity, to_units, ETH_MAX_TOKEN_METADATA, ETH_MAX_TRANSFERS, LIDO_STETH,
};

sol! {
    function balanceOf(address owner) external view returns (uint256);
}

// ============================================
// TRANSFERS API TYPES
// ============================================

/// Transfer category filter
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferCategory {
    External,
    Erc20,
    Erc721,
    Erc1155,
}

const HISTORY_CATEGORIES: [TransferCategory; 4] = [
    TransferCategory::External,
    TransferCategory::Erc20,
    TransferCategory::Erc721,
    TransferCategory::Erc1155,
];

#[derive(Debug, Clone, Copy)]
enum Direction {
    From,
    To,
}

/// Asset transfer entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetTransfer {
    to: Option<String>,
    #[serde(default)]
    raw_contract: Option<RawContract>,
    #[serde(default)]
    metadata: Option<TransferMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawContract {
    address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferMetadata {
    block_timestamp: Option<String>,
}

/// Response from alchemy_getAssetTransfers
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetTransfersResponse {
    #[serde(default)]
    transfers: Vec<AssetTransfer>,
}

// ============================================
// TOKEN API TYPES
// ============================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBalance {
    contract_address: String,
    token_balance: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBalancesResponse {
    #[serde(default)]
    token_balances: Vec<TokenBalance>,
}

/// Token metadata from alchemy_getTokenMetadata
#[derive(Debug, Clone, Default, Deserialize)]
struct TokenMetadata {
    symbol: Option<String>,
    decimals: Option<u8>,
}

// ============================================
// ADAPTER
// ============================================

pub struct EthereumAdapter {
    provider: RpcProvider,
}

impl EthereumAdapter {
    pub fn new(transport: Arc<HttpTransport>, endpoints: &EthereumEndpoints) -> Self {
        let provider = RpcProvider::new(transport, &endpoints.rpc_url, "ethereum");
        info!("⟠ Ethereum adapter: rpc={}", provider.masked_url());
        Self { provider }
    }

    async fn asset_transfers(
        &self,
        address: &str,
        direction: Direction,
        order: &str,
        max_count: u64,
    ) -> AppResult<AssetTransfersResponse> {
        let mut params = serde_json::json!({
            "fromBlock": "0x0",
            "toBlock": "latest",
            "category": HISTORY_CATEGORIES,
            "withMetadata": true,
            "excludeZeroValue": false,
            "order": order,
            "maxCount": format!("{:#x}", max_count),
        });
        let key = match direction {
            Direction::From => "fromAddress",
            Direction::To => "toAddress",
        };
        params[key] = serde_json::Value::String(address.to_string());

        or_empty(
            self.provider
                .call("alchemy_getAssetTransfers", serde_json::json!([params]))
                .await,
        )
    }

    async fn token_metadata(&self, contract: &str) -> TokenMetadata {
        match self
            .provider
            .call::<Option<TokenMetadata>>("alchemy_getTokenMetadata", serde_json::json!([contract]))
            .await
        {
            Ok(meta) => meta.unwrap_or_default(),
            Err(e) => {
                warn!("⚠️ Token metadata unavailable for {}: {}", contract, e);
                TokenMetadata::default()
            }
        }
    }
}

#[async_trait]
impl ChainAdapter for EthereumAdapter {
    fn chain(&self) -> Chain {
        Chain::Ethereum
    }

    async fn fetch_transactions(&self, address: &str) -> AppResult<TransactionHistory> {
        let (recent, first_out, first_in, nonce) = tokio::join!(
            self.asset_transfers(address, Direction::From, "desc", ETH_MAX_TRANSFERS),
            self.asset_transfers(address, Direction::From, "asc", 1),
            self.asset_transfers(address, Direction::To, "asc", 1),
            self.provider.call::<String>(
                "eth_getTransactionCount",
                serde_json::json!([address, "latest"])
            )
        );

        let recent = recent?;
        let nonce = parse_hex_quantity(&or_empty(nonce)?)
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0);

        let first_seen = [first_out?, first_in?]
            .iter()
            .flat_map(|r| r.transfers.iter())
            .filter_map(transfer_timestamp)
            .min();

        let observations: Vec<TxObservation> = recent.transfers.iter().map(observation_from).collect();
        Ok(TransactionHistory {
            total_count: nonce.max(observations.len() as u64),
            first_seen,
            observations,
        })
    }

    async fn fetch_balances(&self, address: &str) -> AppResult<BalanceSheet> {
        let (native, tokens) = tokio::join!(
            self.provider.get_balance(address),
            self.provider.call::<TokenBalancesResponse>(
                "alchemy_getTokenBalances",
                serde_json::json!([address, "erc20"])
            )
        );

        let mut assets = vec![AssetBalance {
            asset_id: "ETH".to_string(),
            symbol: Some("ETH".to_string()),
            amount: to_units(or_empty(native)?, 18),
            value_usd: None,
            is_native: true,
        }];

        let held: Vec<(String, U256)> = or_empty(tokens)?
            .token_balances
            .iter()
            .filter_map(|t| {
                let raw = parse_hex_quantity(t.token_balance.as_deref()?)?;
                (!raw.is_zero()).then(|| (t.contract_address.to_lowercase(), raw))
            })
            .take(ETH_MAX_TOKEN_METADATA)
            .collect();

        let metadata = join_all(held.iter().map(|(contract, _)| self.token_metadata(contract))).await;
        assets.extend(held.into_iter().zip(metadata).map(|((contract, raw), meta)| {
            let decimals = meta.decimals.unwrap_or_else(|| {
                warn!("⚠️ Decimals unknown for {}, assuming 18", contract);
                18
            });
            AssetBalance {
                amount: to_units(raw, decimals),
                asset_id: contract,
                symbol: meta.symbol,
                value_usd: None,
                is_native: false,
            }
        }));

        Ok(BalanceSheet { assets })
    }

    async fn fetch_extras(&self, address: &str) -> AppResult<ProtocolExtras> {
        let owner = Address::from_str(address)
            .map_err(|e| AppError::invalid_address(format!("{}: {}", address, e)))?;
        let data = balanceOfCall { owner }.abi_encode();

        let output = self.provider.eth_call(LIDO_STETH, &data.into()).await?;
        let staked = balanceOfCall::abi_decode_returns(&output, true)
            .map(|r| r._0)
            .map_err(|e| {
                AppError::with_source(ErrorCode::RpcInvalidResponse, "stETH balanceOf undecodable", e)
            })?;
        let staked_amount = to_units(staked, 18);

        Ok(ProtocolExtras {
            staking: Some(StakingSnapshot {
                staked_amount,
                delegations: u32::from(staked_amount > 0.0),
            }),
            governance: None,
        })
    }

    async fn health_check(&self) -> AppResult<()> {
        self.provider.block_number().await.map(|_| ())
    }
}

fn transfer_timestamp(transfer: &AssetTransfer) -> Option<DateTime<Utc>> {
    let raw = transfer.metadata.as_ref()?.block_timestamp.as_deref()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Counterparties: the recipient plus the token contract for token transfers
fn observation_from(transfer: &AssetTransfer) -> TxObservation {
    let mut counterparties: Vec<String> = transfer.to.iter().map(|t| t.to_lowercase()).collect();
    if let Some(contract) = transfer.raw_contract.as_ref().and_then(|c| c.address.as_ref()) {
        let contract = contract.to_lowercase();
        if !counterparties.contains(&contract) {
            counterparties.push(contract);
        }
    }
    TxObservation {
        timestamp: transfer_timestamp(transfer),
        counterparties,
        method: None,
    }
}
