//! Adapters against local stub endpoints: retry, paging, not-found and exhaustion

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chainscore::models::config::{EthereumEndpoints, SeiEndpoints, SolanaEndpoints};
use chainscore::models::errors::{ErrorCode, ErrorKind};
use chainscore::models::types::Section;
use chainscore::providers::rpc::{or_empty, RestProvider};
use chainscore::providers::{EthereumAdapter, HttpTransport, SeiAdapter, SolanaAdapter};
use chainscore::{ChainAdapter, RetryPolicy};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

const WALLET: &str = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        jitter_percent: 20,
        per_call_timeout: Duration::from_millis(500),
    }
}

#[derive(Default)]
struct StubCounters {
    slot_calls: AtomicU32,
}

/// Minimal Solana JSON-RPC: `getSlot` is rate limited twice, program scans are refused
async fn solana_rpc(
    State(counters): State<Arc<StubCounters>>,
    Json(request): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let ok = |result: Value| (StatusCode::OK, Json(json!({ "jsonrpc": "2.0", "id": 1, "result": result })));
    match request["method"].as_str().unwrap_or_default() {
        "getSlot" => {
            if counters.slot_calls.fetch_add(1, Ordering::SeqCst) < 2 {
                (StatusCode::TOO_MANY_REQUESTS, Json(json!({})))
            } else {
                ok(json!(123_456))
            }
        }
        "getSignaturesForAddress" => ok(json!([])),
        "getBalance" => ok(json!({ "context": { "slot": 1 }, "value": 2_500_000_000u64 })),
        "getTokenAccountsByOwner" => ok(json!({ "context": { "slot": 1 }, "value": [] })),
        "getProgramAccounts" => (
            StatusCode::OK,
            Json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32010, "message": "excluded from account secondary indexes" }
            })),
        ),
        _ => (
            StatusCode::OK,
            Json(json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32601, "message": "Method not found" } })),
        ),
    }
}

async fn spawn_stub() -> (SocketAddr, Arc<StubCounters>) {
    let counters = Arc::new(StubCounters::default());
    let app = Router::new()
        .route("/", post(solana_rpc))
        .with_state(counters.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, counters)
}

fn solana_adapter(url: String) -> SolanaAdapter {
    let transport = Arc::new(HttpTransport::new(fast_policy(), 4).unwrap());
    SolanaAdapter::new(transport, &SolanaEndpoints { rpc_url: url })
}

#[tokio::test]
async fn test_rate_limited_calls_are_retried() {
    let (addr, counters) = spawn_stub().await;
    let adapter = solana_adapter(format!("http://{}/", addr));

    adapter.health_check().await.unwrap();
    assert_eq!(counters.slot_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_refused_stake_scan_degrades_to_partial_record() {
    let (addr, _) = spawn_stub().await;
    let adapter = solana_adapter(format!("http://{}/", addr));

    let record = adapter.fetch(WALLET).await.unwrap();
    assert_eq!(record.balances.native_amount(), 2.5);
    assert!(record.transactions.observations.is_empty());
    assert!(record.staking.is_none());
    assert_eq!(
        record.unavailable_sections,
        vec![Section::Staking, Section::Governance]
    );
}

#[tokio::test]
async fn test_http_404_is_empty_not_failure() {
    let (addr, _) = spawn_stub().await;
    let transport = Arc::new(HttpTransport::new(fast_policy(), 4).unwrap());
    let rest = RestProvider::new(transport, format!("http://{}", addr), "stub");

    let raw = rest.get::<Vec<Value>>("/missing", &[]).await;
    assert_eq!(raw.as_ref().unwrap_err().code, ErrorCode::RpcNotFound);
    assert!(or_empty(raw).unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_endpoint_exhausts_within_bound() {
    let policy = fast_policy();
    let bound = policy.worst_case() + Duration::from_millis(500);
    let adapter = solana_adapter("http://127.0.0.1:1/".to_string());

    let started = Instant::now();
    let err = adapter.fetch_balances(WALLET).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
    assert_eq!(err.code, ErrorCode::SourceUnavailable);
    assert!(started.elapsed() <= bound, "took {:?}", started.elapsed());
}

// ============================================
// Sei: EVM RPC + Blockscout + Cosmos LCD on one stub
// ============================================

const EVM_WALLET: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa111";
const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

fn ok(result: Value) -> Json<Value> {
    Json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

fn rpc_error(code: i64, message: &str) -> Json<Value> {
    Json(json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": code, "message": message } }))
}

fn at(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap()
}

/// ABI encoding of a single `string` return value
fn abi_string(value: &str) -> String {
    let mut data = hex::encode(value.as_bytes());
    while data.len() % 64 != 0 {
        data.push('0');
    }
    format!("0x{:064x}{:064x}{}", 32, value.len(), data)
}

struct SeiStub {
    /// Pages of history the explorer holds before its cursor runs out
    history_pages: u32,
    /// Whether the precompile knows a bech32 account for the wallet
    associated: bool,
    page_calls: AtomicU32,
    oldest_calls: AtomicU32,
}

async fn sei_rpc(State(stub): State<Arc<SeiStub>>, Json(request): Json<Value>) -> Json<Value> {
    match request["method"].as_str().unwrap_or_default() {
        "eth_getBalance" => ok(json!("0xde0b6b3a7640000")),
        "eth_call" if stub.associated => ok(json!(abi_string("sei1qy352euf40x77qfrg4ncn27daufrg4ncmz2xdq"))),
        "eth_call" => rpc_error(3, "execution reverted"),
        "eth_blockNumber" => ok(json!("0x10")),
        _ => rpc_error(-32601, "Method not found"),
    }
}

async fn sei_counters() -> Json<Value> {
    Json(json!({ "transactions_count": "900", "token_transfers_count": "12" }))
}

async fn sei_transactions(
    State(stub): State<Arc<SeiStub>>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    if query.get("sort").map(String::as_str) == Some("asc") {
        stub.oldest_calls.fetch_add(1, Ordering::SeqCst);
        return Json(json!({
            "items": [{ "timestamp": "2021-01-01T00:00:00.000000Z", "to": null, "method": "transfer" }],
            "next_page_params": null
        }));
    }

    stub.page_calls.fetch_add(1, Ordering::SeqCst);
    let page: u32 = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let item = |day: u32| {
        json!({
            "timestamp": format!("2024-06-{:02}T00:00:00.000000Z", day),
            "to": { "hash": "0x5555555555555555555555555555555555555555" },
            "method": null,
            "raw_input": "0x38ed1739000000"
        })
    };
    let next = if page < stub.history_pages {
        json!({ "page": page + 1, "items_count": page * 2 })
    } else {
        Value::Null
    };
    Json(json!({ "items": [item(2 * page), item(2 * page + 1)], "next_page_params": next }))
}

async fn lcd_proposals() -> Json<Value> {
    Json(json!({
        "proposals": [
            { "proposal_id": "2", "voting_end_time": "2024-02-01T00:00:00Z" },
            { "proposal_id": "1", "voting_end_time": "2024-01-01T00:00:00Z" }
        ]
    }))
}

async fn lcd_votes() -> Json<Value> {
    Json(json!({ "tx_responses": [{}], "pagination": { "next_key": null, "total": "2" } }))
}

/// Token balances and delegations are not routed, so the stub answers 404 for them
async fn spawn_sei_stub(history_pages: u32, associated: bool) -> (SeiAdapter, Arc<SeiStub>) {
    let stub = Arc::new(SeiStub {
        history_pages,
        associated,
        page_calls: AtomicU32::new(0),
        oldest_calls: AtomicU32::new(0),
    });
    let app = Router::new()
        .route("/rpc", post(sei_rpc))
        .route("/api/v2/addresses/:address/counters", get(sei_counters))
        .route("/api/v2/addresses/:address/transactions", get(sei_transactions))
        .route("/cosmos/gov/v1beta1/proposals", get(lcd_proposals))
        .route("/cosmos/tx/v1beta1/txs", get(lcd_votes))
        .with_state(stub.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let transport = Arc::new(HttpTransport::new(fast_policy(), 4).unwrap());
    let endpoints = SeiEndpoints {
        rpc_url: format!("http://{}/rpc", addr),
        explorer_url: format!("http://{}/api/v2", addr),
        rest_url: format!("http://{}", addr),
    };
    (SeiAdapter::new(transport, &endpoints), stub)
}

#[tokio::test]
async fn test_sei_long_history_pages_then_reads_oldest_tx() {
    let (adapter, stub) = spawn_sei_stub(10, false).await;

    let record = adapter.fetch(EVM_WALLET).await.unwrap();
    let history = &record.transactions;

    // bounded paging, then one ascending lookup for the first activity
    assert_eq!(stub.page_calls.load(Ordering::SeqCst), 4);
    assert_eq!(stub.oldest_calls.load(Ordering::SeqCst), 1);
    assert_eq!(history.observations.len(), 8);
    assert_eq!(history.total_count, 900);
    assert_eq!(history.first_seen, Some(at("2021-01-01T00:00:00Z")));
    assert_eq!(history.observations[0].method.as_deref(), Some("0x38ed1739"));

    // token balances 404 -> only native SEI
    assert_eq!(record.balances.assets.len(), 1);
    assert_eq!(record.balances.native_amount(), 1.0);

    // unassociated account: zero staking and zero votes, not a failure
    let staking = record.staking.unwrap();
    assert_eq!(staking.staked_amount, 0.0);
    assert_eq!(staking.delegations, 0);
    assert_eq!(record.governance.unwrap().votes_cast, 0);
    assert!(record.unavailable_sections.is_empty());
}

#[tokio::test]
async fn test_sei_short_history_skips_oldest_lookup() {
    let (adapter, stub) = spawn_sei_stub(2, false).await;

    let history = adapter.fetch_transactions(EVM_WALLET).await.unwrap();
    assert_eq!(stub.page_calls.load(Ordering::SeqCst), 2);
    assert_eq!(stub.oldest_calls.load(Ordering::SeqCst), 0);
    assert_eq!(history.observations.len(), 4);
    assert!(history.first_seen.is_none());
}

#[tokio::test]
async fn test_sei_associated_account_reads_lcd() {
    let (adapter, _) = spawn_sei_stub(1, true).await;

    let extras = adapter.fetch_extras(EVM_WALLET).await.unwrap();
    // delegations 404 -> empty staking
    let staking = extras.staking.unwrap();
    assert_eq!(staking.staked_amount, 0.0);
    assert_eq!(staking.delegations, 0);

    let governance = extras.governance.unwrap();
    assert_eq!(governance.votes_cast, 2);
    assert_eq!(governance.proposal_deadlines.len(), 2);
}

// ============================================
// Ethereum: Alchemy-style JSON-RPC stub
// ============================================

async fn eth_rpc(Json(request): Json<Value>) -> Json<Value> {
    let params = &request["params"];
    match request["method"].as_str().unwrap_or_default() {
        "alchemy_getAssetTransfers" => {
            let filter = &params[0];
            let transfer = |ts: &str| {
                json!({
                    "from": EVM_WALLET,
                    "to": "0x7a250d5630b4cf539739df2c5dacb4c659f2488d",
                    "category": "external",
                    "rawContract": { "address": null },
                    "metadata": { "blockTimestamp": ts }
                })
            };
            let transfers = match (filter["order"].as_str(), filter.get("toAddress").is_some()) {
                (Some("desc"), _) => vec![
                    transfer("2024-05-02T00:00:00.000Z"),
                    transfer("2024-05-01T00:00:00.000Z"),
                ],
                // first outgoing is later than the first incoming
                (_, false) => vec![transfer("2022-03-01T00:00:00.000Z")],
                (_, true) => vec![transfer("2020-07-15T00:00:00.000Z")],
            };
            ok(json!({ "transfers": transfers }))
        }
        "eth_getTransactionCount" => ok(json!("0x2a")),
        "eth_getBalance" => ok(json!("0x1bc16d674ec80000")),
        "alchemy_getTokenBalances" => ok(json!({
            "address": EVM_WALLET,
            "tokenBalances": [
                { "contractAddress": USDC, "tokenBalance": "0xf4240" },
                { "contractAddress": "0x1111111111111111111111111111111111111111",
                  "tokenBalance": "0xde0b6b3a7640000" },
                { "contractAddress": "0x2222222222222222222222222222222222222222",
                  "tokenBalance": "0x0" }
            ]
        })),
        "alchemy_getTokenMetadata" if params[0] == USDC => {
            ok(json!({ "name": "USD Coin", "symbol": "USDC", "decimals": 6 }))
        }
        "alchemy_getTokenMetadata" => rpc_error(-32602, "invalid token contract"),
        "eth_call" => ok(json!(format!("0x{:064x}", 3_000_000_000_000_000_000u128))),
        "eth_blockNumber" => ok(json!("0x10")),
        _ => rpc_error(-32601, "Method not found"),
    }
}

async fn spawn_eth_stub() -> EthereumAdapter {
    let app = Router::new().route("/", post(eth_rpc));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let transport = Arc::new(HttpTransport::new(fast_policy(), 4).unwrap());
    EthereumAdapter::new(transport, &EthereumEndpoints { rpc_url: format!("http://{}/", addr) })
}

#[tokio::test]
async fn test_ethereum_fetch_joins_history_and_positions() {
    let adapter = spawn_eth_stub().await;

    let record = adapter.fetch(EVM_WALLET).await.unwrap();

    let history = &record.transactions;
    assert_eq!(history.first_seen, Some(at("2020-07-15T00:00:00Z")));
    assert_eq!(history.observations.len(), 2);
    assert_eq!(history.total_count, 42);

    let assets = &record.balances.assets;
    assert_eq!(record.balances.native_amount(), 2.0);
    // zero balances are skipped
    assert_eq!(assets.len(), 3);
    let usdc = assets.iter().find(|a| a.asset_id == USDC).unwrap();
    assert_eq!(usdc.symbol.as_deref(), Some("USDC"));
    assert!((usdc.amount - 1.0).abs() < 1e-9);
    // metadata lookup failed: kept, scaled with 18 decimals
    let unknown = assets
        .iter()
        .find(|a| a.asset_id == "0x1111111111111111111111111111111111111111")
        .unwrap();
    assert!(unknown.symbol.is_none());
    assert!((unknown.amount - 1.0).abs() < 1e-9);

    let staking = record.staking.unwrap();
    assert!((staking.staked_amount - 3.0).abs() < 1e-9);
    assert_eq!(staking.delegations, 1);
    assert!(record.governance.is_none());
    assert!(record.unavailable_sections.is_empty());
}
