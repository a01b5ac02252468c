//! The JSON-RPC over HTTP transport against mockito servers.

use crate::mock_infrastructure::{
    batch_error, batch_result, contract_call, manager_with, request, RpcMockBuilder, TEST_CHAIN,
};
use conduit_core::{
    config::{AppConfig, HealthCheckConfig, HttpConfig, NetworkConfig, ProviderConfig, ProviderTier},
    types::{Priority, ResponseSource},
    upstream::{ClientSet, HealthMonitor, HttpClient, HttpTransport, ProviderError, Transport},
};
use serde_json::json;
use std::sync::Arc;

fn http_client() -> Arc<HttpClient> {
    Arc::new(HttpClient::new(&HttpConfig::default()).unwrap())
}

fn provider(name: &str, url: &str, tier: ProviderTier) -> ProviderConfig {
    let mut config = ProviderConfig::new(name, url).with_tier(tier);
    config.max_retries = 0;
    config
}

fn transport(url: &str) -> HttpTransport {
    HttpTransport::new(&provider("mock", url, ProviderTier::Premium), http_client())
}

fn config_for(providers: Vec<ProviderConfig>) -> AppConfig {
    AppConfig {
        networks: vec![NetworkConfig { chain_id: TEST_CHAIN, name: "base".to_string(), providers }],
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn test_eth_call_returns_result() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_eth_call(&json!("0x0000000000000000000000000000000000000000000000000000000000000001"));

    let value = transport(&mock.url()).call(&contract_call("balanceOf", "0xuser")).await.unwrap();
    assert_eq!(value, json!("0x0000000000000000000000000000000000000000000000000000000000000001"));
}

#[tokio::test]
async fn test_multicall_matches_out_of_order_responses_by_id() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_batch(&json!([
        batch_result(3, &json!("0x03")),
        batch_error(2, 3, "execution reverted"),
        batch_result(1, &json!("0x01")),
    ]));

    let calls = [
        contract_call("balanceOf", "0x1"),
        contract_call("getPurchase", "0x2"),
        contract_call("hasAccess", "0x3"),
    ];
    let results = transport(&mock.url()).multicall(&calls).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0], Ok(json!("0x01")));
    assert_eq!(results[1], Err(ProviderError::RpcError(3, "execution reverted".into())));
    assert_eq!(results[2], Ok(json!("0x03")));
}

#[tokio::test]
async fn test_multicall_rejected_as_a_whole() {
    let mut mock = RpcMockBuilder::new().await;
    mock.mock_batch(&json!({
        "jsonrpc": "2.0",
        "id": null,
        "error": { "code": -32600, "message": "batch too large" }
    }));

    let err = transport(&mock.url())
        .multicall(&[contract_call("balanceOf", "0x1"), contract_call("balanceOf", "0x2")])
        .await
        .unwrap_err();
    assert_eq!(err, ProviderError::RpcError(-32600, "batch too large".into()));
}

#[tokio::test]
async fn test_missing_calldata_is_a_call_error() {
    let mock = RpcMockBuilder::new().await;
    let call = conduit_core::types::ContractCall::new("0xabc", "balanceOf", json!([]));

    let err = transport(&mock.url()).call(&call).await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidRequest(_)));
    assert!(!err.is_failover_eligible());
}

#[tokio::test]
async fn test_manager_fails_over_from_erroring_server() {
    let mut broken = RpcMockBuilder::new().await;
    broken.mock_status(500, 1);
    let mut healthy = RpcMockBuilder::new().await;
    healthy.mock_eth_call(&json!("0x2a"));

    let config = config_for(vec![
        provider("broken", &broken.url(), ProviderTier::Premium),
        provider("healthy", &healthy.url(), ProviderTier::Standard),
    ]);
    let client_set = Arc::new(ClientSet::from_config(&config, &http_client()));
    let manager = manager_with(&config, client_set);

    let response = manager.execute(request("1", "balanceOf", "0xuser", Priority::High)).await;

    assert_eq!(response.data, Some(json!("0x2a")));
    assert_eq!(response.source, ResponseSource::Single);
    broken.assert_all();

    let status = manager.get_health_status();
    assert_eq!(status.networks[0].providers[0].error_count, 1);
    assert_eq!(status.networks[0].providers[1].error_count, 0);
}

#[tokio::test]
async fn test_server_errors_are_retried_up_to_max_retries() {
    let mut flaky = RpcMockBuilder::new().await;
    flaky.mock_status(502, 3);

    let mut config = provider("flaky", &flaky.url(), ProviderTier::Premium);
    config.max_retries = 2;
    let transport = HttpTransport::new(&config, http_client());

    let err = transport.call(&contract_call("balanceOf", "0xuser")).await.unwrap_err();
    assert!(matches!(err, ProviderError::HttpError(502, _)));
    flaky.assert_all();
}

#[tokio::test]
async fn test_throttled_provider_is_not_penalized() {
    let mut throttled = RpcMockBuilder::new().await;
    throttled.mock_status(429, 1);
    let mut healthy = RpcMockBuilder::new().await;
    healthy.mock_eth_call(&json!("0x01"));

    let config = config_for(vec![
        provider("throttled", &throttled.url(), ProviderTier::Premium),
        provider("healthy", &healthy.url(), ProviderTier::Standard),
    ]);
    let client_set = Arc::new(ClientSet::from_config(&config, &http_client()));
    let manager = manager_with(&config, client_set);

    let response = manager.execute(request("1", "balanceOf", "0xuser", Priority::High)).await;

    assert!(response.is_success());
    throttled.assert_all();
    let status = manager.get_health_status();
    assert_eq!(status.networks[0].providers[0].error_count, 0);
    assert!(status.networks[0].providers[0].is_healthy);
}

#[tokio::test]
async fn test_health_monitor_probes_block_number() {
    let mut live = RpcMockBuilder::new().await;
    live.mock_block_number(0x10d4f);
    let mut dead = RpcMockBuilder::new().await;
    dead.mock_status(500, 1);

    let config = config_for(vec![
        provider("live", &live.url(), ProviderTier::Premium),
        provider("dead", &dead.url(), ProviderTier::Standard),
    ]);
    let client_set = Arc::new(ClientSet::from_config(&config, &http_client()));
    let monitor = HealthMonitor::new(Arc::clone(&client_set), &HealthCheckConfig::default());

    assert_eq!(monitor.check_now().await, 2);

    let endpoints = client_set.endpoints();
    let live_history = endpoints[0].health_history();
    let dead_history = endpoints[1].health_history();
    assert!(live_history[0].healthy);
    assert!(!dead_history[0].healthy);
    assert_eq!(endpoints[1].health().error_count, 1);
    assert!(dead_history[0].error.as_deref().is_some_and(|e| e.contains("500")));
}
