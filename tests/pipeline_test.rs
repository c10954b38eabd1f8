//! End-to-end scoring pipeline: orchestrator + cache + extractor + rule model

mod common;

use chainscore::models::errors::ErrorKind;
use chainscore::{Chain, RiskLevel};
use common::{orchestrator_with, scenario_wallet, FakeAdapter};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(300);
const DEADLINE: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_scenario_wallet_on_sei() {
    let adapter = Arc::new(FakeAdapter::scenario());
    let orchestrator = orchestrator_with(adapter.clone(), TTL, DEADLINE);

    let response = orchestrator.get_score(&scenario_wallet(), Chain::Sei).await.unwrap();
    let result = &response.result;

    assert_eq!(result.score, 824);
    assert_eq!(response.band, "Good");
    assert_eq!(result.risk, RiskLevel::Low);
    assert!(result.confidence > 0.7, "confidence {}", result.confidence);
    assert_eq!(result.model_version, "rules-v1");
    assert_eq!(result.factor_sum(), result.score as i32);
    let points: Vec<i32> = result.factors.iter().map(|f| f.points).collect();
    assert_eq!(points, vec![238, 233, 190, 96, 57, 10]);
    assert!(!response.cached);
}

#[tokio::test]
async fn test_second_call_within_ttl_is_cached() {
    let adapter = Arc::new(FakeAdapter::scenario().with_delay(Duration::from_millis(200)));
    let orchestrator = orchestrator_with(adapter.clone(), TTL, DEADLINE);
    let wallet = scenario_wallet();

    let first = orchestrator.get_score(&wallet, Chain::Sei).await.unwrap();
    // Mixed case normalizes to the same key
    let second = orchestrator
        .get_score(&wallet.to_uppercase().replacen("0X", "0x", 1), Chain::Sei)
        .await
        .unwrap();

    assert!(second.cached);
    assert_eq!(first.result, second.result);
    assert_eq!(adapter.calls(), 1);

    // the cache path skips the slow upstream entirely
    assert!(first.latency_ms >= 200, "first call took {}ms", first.latency_ms);
    assert!(second.latency_ms < first.latency_ms);
    assert!(second.latency_ms < 100, "cached call took {}ms", second.latency_ms);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_share_one_computation() {
    let adapter = Arc::new(FakeAdapter::scenario().with_delay(Duration::from_millis(500)));
    let orchestrator = Arc::new(orchestrator_with(adapter.clone(), TTL, DEADLINE));
    let wallet = scenario_wallet();

    let requests = (0..8).map(|_| {
        let orchestrator = orchestrator.clone();
        let wallet = wallet.clone();
        async move { orchestrator.get_score(&wallet, Chain::Sei).await }
    });
    let responses = join_all(requests).await;

    assert_eq!(adapter.calls(), 1);
    let first = responses[0].as_ref().unwrap();
    for response in &responses {
        assert_eq!(response.as_ref().unwrap().result, first.result);
    }
    assert_eq!(orchestrator.cache().in_flight_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_expired_entry_recomputes_once() {
    let adapter = Arc::new(FakeAdapter::scenario());
    let orchestrator = orchestrator_with(adapter.clone(), Duration::from_secs(60), DEADLINE);
    let wallet = scenario_wallet();

    orchestrator.get_score(&wallet, Chain::Sei).await.unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;

    let refreshed = orchestrator.get_score(&wallet, Chain::Sei).await.unwrap();
    assert!(!refreshed.cached);
    let again = orchestrator.get_score(&wallet, Chain::Sei).await.unwrap();
    assert!(again.cached);
    assert_eq!(adapter.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_recompute_does_not_poison_cache() {
    let adapter = Arc::new(FakeAdapter::scenario());
    let orchestrator = orchestrator_with(adapter.clone(), Duration::from_secs(60), DEADLINE);
    let wallet = scenario_wallet();

    orchestrator.get_score(&wallet, Chain::Sei).await.unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;

    adapter.set_failing(true);
    let err = orchestrator.get_score(&wallet, Chain::Sei).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceUnavailable);

    // failure is not remembered: the next call computes again
    adapter.set_failing(false);
    let recovered = orchestrator.get_score(&wallet, Chain::Sei).await.unwrap();
    assert!(!recovered.cached);
    assert_eq!(recovered.result.score, 824);
    assert_eq!(adapter.calls(), 3);
}

#[tokio::test]
async fn test_unused_wallet_scores_zero() {
    let adapter = Arc::new(FakeAdapter::empty(Chain::Solana));
    let orchestrator = orchestrator_with(adapter, TTL, DEADLINE);

    let response = orchestrator
        .get_score("11111111111111111111111111111111", Chain::Solana)
        .await
        .unwrap();
    assert_eq!(response.result.score, 0);
    assert_eq!(response.result.risk, RiskLevel::High);
    assert_eq!(response.result.confidence, 0.0);
    assert_eq!(response.result.factor_sum(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_source_times_out_and_is_not_cached() {
    let adapter = Arc::new(FakeAdapter::scenario().with_delay(Duration::from_secs(30)));
    let orchestrator = orchestrator_with(adapter, TTL, Duration::from_secs(2));

    let err = orchestrator.get_score(&scenario_wallet(), Chain::Sei).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(orchestrator.cache().is_empty());
}

#[tokio::test]
async fn test_bad_input_never_reaches_adapter() {
    let adapter = Arc::new(FakeAdapter::scenario());
    let orchestrator = orchestrator_with(adapter.clone(), TTL, DEADLINE);

    let err = orchestrator.get_score("0x1234", Chain::Sei).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAddress);

    let err = orchestrator.get_score(&scenario_wallet(), Chain::Ethereum).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
    assert_eq!(adapter.calls(), 0);
}
