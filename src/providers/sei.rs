//! Sei Provider Module
//!
//! Sei exposes two faces of one account:
//! 1. EVM JSON-RPC - native balance, address precompile
//! 2. Blockscout REST v2 - transaction history (plus the oldest tx when paging is cut short), token balances
//! 3. Cosmos REST (LCD) - delegations and governance votes, keyed by the bech32 address
//!
//! The bech32 address is resolved through the address precompile at `0x…1004`.
//! An EVM account never associated with a Sei account has no staking and no votes.

use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use super::adapter::ChainAdapter;
use super::rpc::{or_empty, HttpTransport, RestProvider, RpcProvider};
use crate::models::config::SeiEndpoints;
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::models::types::{
    AssetBalance, BalanceSheet, Chain, GovernanceSnapshot, ProtocolExtras, StakingSnapshot,
    TransactionHistory, TxObservation,
};
use crate::utils::constants::{
    to_units, SEI_ADDR_PRECOMPILE, SEI_COSMOS_DECIMALS, SEI_MAX_PROPOSALS, SEI_MAX_TX_PAGES,
};

sol! {
    /// Sei address precompile
    function getSeiAddr(address addr) external view returns (string response);
}

// ============================================
// BLOCKSCOUT TYPES
// ============================================

#[derive(Debug, Default, Deserialize)]
struct AddressCounters {
    #[serde(default)]
    transactions_count: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TransactionsPage {
    #[serde(default)]
    items: Vec<BlockscoutTx>,
    #[serde(default)]
    next_page_params: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct BlockscoutTx {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    to: Option<AddressRef>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    raw_input: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddressRef {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct TokenBalanceItem {
    token: TokenMeta,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenMeta {
    #[serde(alias = "address_hash")]
    address: String,
    symbol: Option<String>,
    decimals: Option<String>,
    exchange_rate: Option<String>,
}

// ============================================
// COSMOS LCD TYPES
// ============================================

#[derive(Debug, Default, Deserialize)]
struct DelegationsResponse {
    #[serde(default)]
    delegation_responses: Vec<DelegationResponse>,
}

#[derive(Debug, Deserialize)]
struct DelegationResponse {
    balance: Coin,
}

#[derive(Debug, Deserialize)]
struct Coin {
    amount: String,
}

#[derive(Debug, Default, Deserialize)]
struct ProposalsResponse {
    #[serde(default)]
    proposals: Vec<Proposal>,
}

#[derive(Debug, Deserialize)]
struct Proposal {
    voting_end_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TxSearchResponse {
    #[serde(default)]
    pagination: Option<Pagination>,
    #[serde(default)]
    tx_responses: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    total: Option<String>,
}

// ============================================
// ADAPTER
// ============================================

pub struct SeiAdapter {
    rpc: RpcProvider,
    explorer: RestProvider,
    lcd: RestProvider,
}

impl SeiAdapter {
    pub fn new(transport: Arc<HttpTransport>, endpoints: &SeiEndpoints) -> Self {
        let adapter = Self {
            rpc: RpcProvider::new(transport.clone(), &endpoints.rpc_url, "sei"),
            explorer: RestProvider::new(transport.clone(), &endpoints.explorer_url, "sei-explorer"),
            lcd: RestProvider::new(transport, &endpoints.rest_url, "sei-lcd"),
        };
        info!(
            "🌊 Sei adapter: rpc={} explorer={} lcd={}",
            adapter.rpc.masked_url(),
            adapter.explorer.masked_url(),
            adapter.lcd.masked_url()
        );
        adapter
    }

    /// Resolve the bech32 account associated with an EVM address
    async fn resolve_sei_address(&self, address: &str) -> AppResult<Option<String>> {
        let addr = Address::from_str(address)
            .map_err(|e| AppError::invalid_address(format!("{}: {}", address, e)))?;
        let data = getSeiAddrCall { addr }.abi_encode();

        match self.rpc.eth_call(SEI_ADDR_PRECOMPILE, &data.into()).await {
            Ok(output) => {
                let decoded = getSeiAddrCall::abi_decode_returns(&output, true).map_err(|e| {
                    AppError::with_source(
                        ErrorCode::RpcInvalidResponse,
                        "getSeiAddr returned undecodable data",
                        e,
                    )
                })?;
                let sei = decoded.response.trim().to_string();
                Ok((!sei.is_empty()).then_some(sei))
            }
            // Precompile reverts for unassociated accounts
            Err(e) if matches!(e.code, ErrorCode::RpcError | ErrorCode::RpcNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Timestamp of the oldest transaction (`sort=asc&limit=1`)
    async fn first_activity(&self, path: &str) -> AppResult<Option<DateTime<Utc>>> {
        let query = [("sort", "asc".to_string()), ("limit", "1".to_string())];
        let page: TransactionsPage = or_empty(self.explorer.get(path, &query).await)?;
        Ok(page
            .items
            .iter()
            .filter_map(|tx| tx.timestamp.as_deref().and_then(parse_timestamp))
            .min())
    }

    async fn fetch_staking(&self, sei_address: &str) -> AppResult<StakingSnapshot> {
        let path = format!("/cosmos/staking/v1beta1/delegations/{}", sei_address);
        let response: DelegationsResponse = or_empty(self.lcd.get(&path, &[]).await)?;
        Ok(summarize_delegations(&response))
    }

    async fn fetch_governance(&self, sei_address: &str) -> AppResult<GovernanceSnapshot> {
        let proposals_query = [
            ("pagination.limit", SEI_MAX_PROPOSALS.to_string()),
            ("pagination.reverse", "true".to_string()),
        ];
        let votes_query = [
            ("events", format!("message.sender='{}'", sei_address)),
            ("events", "message.action='/cosmos.gov.v1beta1.MsgVote'".to_string()),
            ("pagination.limit", "1".to_string()),
            ("pagination.count_total", "true".to_string()),
        ];

        let (proposals, votes) = tokio::join!(
            self.lcd.get::<ProposalsResponse>("/cosmos/gov/v1beta1/proposals", &proposals_query),
            self.lcd.get::<TxSearchResponse>("/cosmos/tx/v1beta1/txs", &votes_query)
        );
        let proposals = or_empty(proposals)?;
        let votes = or_empty(votes)?;

        Ok(GovernanceSnapshot {
            votes_cast: vote_total(&votes),
            proposal_deadlines: proposals
                .proposals
                .iter()
                .filter_map(|p| p.voting_end_time.as_deref().and_then(parse_timestamp))
                .collect(),
        })
    }
}

#[async_trait]
impl ChainAdapter for SeiAdapter {
    fn chain(&self) -> Chain {
        Chain::Sei
    }

    async fn fetch_transactions(&self, address: &str) -> AppResult<TransactionHistory> {
        let counters: AddressCounters =
            or_empty(self.explorer.get(&format!("/addresses/{}/counters", address), &[]).await)?;

        let path = format!("/addresses/{}/transactions", address);
        let mut observations = Vec::new();
        let mut page_params: Vec<(String, String)> = Vec::new();
        let mut truncated = false;

        for page in 0..SEI_MAX_TX_PAGES {
            let query: Vec<(&str, String)> =
                page_params.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
            let result = self.explorer.get::<TransactionsPage>(&path, &query).await;
            let body = match result {
                Ok(body) => body,
                Err(e) if e.code == ErrorCode::RpcNotFound => break,
                Err(e) => return Err(e),
            };

            observations.extend(body.items.iter().map(observation_from));
            let next = body.next_page_params.filter(|next| !next.is_empty());
            truncated = next.is_some();
            match next {
                Some(next) => page_params = flatten_params(&next),
                None => break,
            }
            debug!("📄 Sei tx page {} fetched for {}", page + 1, address);
        }

        // Paging stopped before the start of history
        let first_seen = if truncated {
            self.first_activity(&path).await?
        } else {
            None
        };

        let total_count = counters
            .transactions_count
            .as_deref()
            .and_then(|c| c.parse::<u64>().ok())
            .unwrap_or(0);

        Ok(TransactionHistory {
            total_count,
            first_seen,
            observations,
        })
    }

    async fn fetch_balances(&self, address: &str) -> AppResult<BalanceSheet> {
        let tokens_path = format!("/addresses/{}/token-balances", address);
        let (native, tokens) = tokio::join!(
            self.rpc.get_balance(address),
            self.explorer.get::<Vec<TokenBalanceItem>>(&tokens_path, &[])
        );

        let mut assets = vec![AssetBalance {
            asset_id: "SEI".to_string(),
            symbol: Some("SEI".to_string()),
            amount: to_units(or_empty(native)?, 18),
            value_usd: None,
            is_native: true,
        }];
        assets.extend(or_empty(tokens)?.iter().filter_map(token_balance_from));
        Ok(BalanceSheet { assets })
    }

    async fn fetch_extras(&self, address: &str) -> AppResult<ProtocolExtras> {
        let Some(sei_address) = self.resolve_sei_address(address).await? else {
            debug!("Sei account not associated for {}", address);
            return Ok(ProtocolExtras {
                staking: Some(StakingSnapshot::default()),
                governance: Some(GovernanceSnapshot::default()),
            });
        };

        let (staking, governance) = tokio::join!(
            self.fetch_staking(&sei_address),
            self.fetch_governance(&sei_address)
        );
        Ok(ProtocolExtras {
            staking: Some(staking?),
            governance: Some(governance?),
        })
    }

    async fn health_check(&self) -> AppResult<()> {
        self.rpc.block_number().await.map(|_| ())
    }
}

// ============================================
// PARSING HELPERS
// ============================================

/// RFC 3339, or unix seconds on older indexer rows
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        return DateTime::from_timestamp(raw.parse().ok()?, 0);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn observation_from(tx: &BlockscoutTx) -> TxObservation {
    let selector = tx
        .raw_input
        .as_deref()
        .and_then(|input| input.get(..10))
        .map(str::to_lowercase);
    TxObservation {
        timestamp: tx.timestamp.as_deref().and_then(parse_timestamp),
        counterparties: tx.to.iter().map(|to| to.hash.to_lowercase()).collect(),
        method: tx.method.clone().filter(|m| !m.is_empty()).or(selector),
    }
}

/// Blockscout cursors are opaque key/value pairs echoed back as query params
fn flatten_params(params: &serde_json::Map<String, serde_json::Value>) -> Vec<(String, String)> {
    params
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

fn token_balance_from(item: &TokenBalanceItem) -> Option<AssetBalance> {
    let raw = U256::from_str_radix(item.value.as_deref()?, 10).ok()?;
    let decimals = item
        .token
        .decimals
        .as_deref()
        .and_then(|d| d.parse::<u8>().ok())
        .unwrap_or(18);
    let amount = to_units(raw, decimals);
    let rate = item
        .token
        .exchange_rate
        .as_deref()
        .and_then(|r| r.parse::<f64>().ok());
    Some(AssetBalance {
        asset_id: item.token.address.to_lowercase(),
        symbol: item.token.symbol.clone(),
        amount,
        value_usd: rate.map(|r| r * amount),
        is_native: false,
    })
}

fn summarize_delegations(response: &DelegationsResponse) -> StakingSnapshot {
    let usei: f64 = response
        .delegation_responses
        .iter()
        .filter_map(|d| d.balance.amount.parse::<f64>().ok())
        .sum();
    StakingSnapshot {
        staked_amount: usei / 10f64.powi(SEI_COSMOS_DECIMALS),
        delegations: response.delegation_responses.len() as u32,
    }
}

fn vote_total(response: &TxSearchResponse) -> u64 {
    response
        .pagination
        .as_ref()
        .and_then(|p| p.total.as_deref())
        .and_then(|t| t.parse::<u64>().ok())
        .unwrap_or(response.tx_responses.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_from_blockscout_item() {
        let page: TransactionsPage = serde_json::from_value(serde_json::json!({
            "items": [
                {
                    "timestamp": "2024-03-01T12:00:00.000000Z",
                    "to": { "hash": "0xABCDEF0000000000000000000000000000000001" },
                    "method": null,
                    "raw_input": "0x38ed17390000000000000000"
                },
                { "timestamp": "2024-02-01T12:00:00Z", "to": null, "method": "transfer" }
            ],
            "next_page_params": { "block_number": 123, "index": 4, "items_count": 50 }
        }))
        .unwrap();

        let first = observation_from(&page.items[0]);
        assert_eq!(first.counterparties, vec!["0xabcdef0000000000000000000000000000000001"]);
        assert_eq!(first.method.as_deref(), Some("0x38ed1739"));
        assert!(first.timestamp.is_some());

        let second = observation_from(&page.items[1]);
        assert!(second.counterparties.is_empty());
        assert_eq!(second.method.as_deref(), Some("transfer"));

        let mut params = flatten_params(page.next_page_params.as_ref().unwrap());
        params.sort();
        assert_eq!(params[0], ("block_number".to_string(), "123".to_string()));
    }

    #[test]
    fn test_selector_skips_non_ascii_input() {
        let tx: BlockscoutTx = serde_json::from_value(serde_json::json!({
            "timestamp": null,
            "to": null,
            "method": null,
            "raw_input": "0x1234567é00"
        }))
        .unwrap();
        assert!(observation_from(&tx).method.is_none());

        let short: BlockscoutTx =
            serde_json::from_value(serde_json::json!({ "raw_input": "0x" })).unwrap();
        assert!(observation_from(&short).method.is_none());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let iso = parse_timestamp("2021-01-01T00:00:00Z").unwrap();
        assert_eq!(parse_timestamp("1609459200"), Some(iso));
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_token_balance_uses_exchange_rate() {
        let items: Vec<TokenBalanceItem> = serde_json::from_value(serde_json::json!([
            {
                "token": { "address": "0xB75D0B03c06A926e488e2659DF1A861F860bD3d1",
                           "symbol": "USDT", "decimals": "6", "exchange_rate": "1.0" },
                "value": "2500000"
            },
            {
                "token": { "address_hash": "0x1111111111111111111111111111111111111111",
                           "symbol": "MEME", "decimals": null, "exchange_rate": null },
                "value": "1000000000000000000"
            }
        ]))
        .unwrap();

        let usdt = token_balance_from(&items[0]).unwrap();
        assert!((usdt.amount - 2.5).abs() < 1e-9);
        assert_eq!(usdt.value_usd, Some(2.5));
        assert_eq!(usdt.asset_id, "0xb75d0b03c06a926e488e2659df1a861f860bd3d1");

        let meme = token_balance_from(&items[1]).unwrap();
        assert!((meme.amount - 1.0).abs() < 1e-9);
        assert!(meme.value_usd.is_none());
    }

    #[test]
    fn test_delegations_are_summed_in_sei() {
        let response: DelegationsResponse = serde_json::from_value(serde_json::json!({
            "delegation_responses": [
                { "delegation": {}, "balance": { "denom": "usei", "amount": "2000000" } },
                { "delegation": {}, "balance": { "denom": "usei", "amount": "1000000" } }
            ]
        }))
        .unwrap();
        let staking = summarize_delegations(&response);
        assert!((staking.staked_amount - 3.0).abs() < 1e-9);
        assert_eq!(staking.delegations, 2);
    }

    #[test]
    fn test_vote_total_prefers_pagination() {
        let response: TxSearchResponse = serde_json::from_value(serde_json::json!({
            "tx_responses": [{}],
            "pagination": { "next_key": null, "total": "7" }
        }))
        .unwrap();
        assert_eq!(vote_total(&response), 7);
        assert_eq!(vote_total(&TxSearchResponse::default()), 0);
    }

    #[test]
    fn test_get_sei_addr_calldata() {
        let addr = Address::from_str("0x000000000000000000000000000000000000dEaD").unwrap();
        let data = getSeiAddrCall { addr }.abi_encode();
        // selector + one padded address word
        assert_eq!(data.len(), 4 + 32);
        assert_eq!(&data[..4], &getSeiAddrCall::SELECTOR);
    }
}
