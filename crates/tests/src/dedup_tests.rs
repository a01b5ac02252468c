//! In-flight deduplication through the public façade.

use crate::mock_infrastructure::{
    contract_call, manager_with, mock_provider, mock_provider_with, request, single_chain_client_set,
    single_provider_manager, MockTransport,
};
use conduit_core::{
    config::{AppConfig, ProviderTier},
    types::{Priority, Request, Response, ResponseSource},
    upstream::{ClientSet, ProviderError, ProviderPool},
    RequestError,
};
use futures::future::join_all;
use serde_json::Value;
use std::{sync::Arc, time::Duration};

#[tokio::test(start_paused = true)]
async fn test_concurrent_identical_high_priority_reads_share_one_call() {
    let provider = mock_provider_with(
        MockTransport::new("primary").with_latency(Duration::from_millis(50)),
        ProviderTier::Premium,
    );
    let manager = manager_with(
        &AppConfig::default(),
        single_chain_client_set(&[&provider]),
    );

    let responses = join_all(
        (0..10).map(|i| manager.execute(request(&format!("r{i}"), "hasAccess", "0xuser", Priority::High))),
    )
    .await;

    assert_eq!(provider.transport.call_count(), 1);
    assert_eq!(provider.transport.multicall_count(), 0);

    let expected = MockTransport::expected_value(&contract_call("hasAccess", "0xuser"));
    for (i, response) in responses.iter().enumerate() {
        assert_eq!(response.id, format!("r{i}"));
        assert_eq!(response.data.as_ref(), Some(&expected));
        assert_eq!(response.source, ResponseSource::Single);
    }

    let stats = manager.get_metrics().contexts["default"];
    assert_eq!(stats.total_requests, 10);
    assert_eq!(stats.deduplicated_requests, 9);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_identical_low_priority_reads_share_one_batch_slot() {
    let (manager, transport) = single_provider_manager();

    let responses = join_all(
        (0..5).map(|i| manager.execute(request(&format!("r{i}"), "balanceOf", "0xuser", Priority::Low))),
    )
    .await;

    assert_eq!(transport.multicall_sizes(), vec![1]);
    assert!(responses.iter().all(|r| r.is_success() && r.source == ResponseSource::Batch));
}

#[tokio::test(start_paused = true)]
async fn test_followers_receive_leader_error_and_errors_are_not_cached() {
    let provider = mock_provider_with(
        MockTransport::new("primary").with_latency(Duration::from_millis(10)),
        ProviderTier::Premium,
    );
    provider
        .transport
        .respond_to("getPurchase", Err(ProviderError::RpcError(3, "execution reverted".into())));
    let manager = manager_with(
        &AppConfig::default(),
        single_chain_client_set(&[&provider]),
    );

    let responses =
        join_all((0..3).map(|_| manager.execute(request("p", "getPurchase", "1", Priority::High)))).await;

    assert_eq!(provider.transport.call_count(), 1);
    for response in &responses {
        assert_eq!(
            response.error,
            Some(RequestError::Provider(ProviderError::RpcError(3, "execution reverted".into())))
        );
        assert!(response.data.is_none());
    }

    // nothing was cached, so the next read goes out again
    let again = manager.execute(request("p", "getPurchase", "1", Priority::High)).await;
    assert!(!again.is_success());
    assert_eq!(provider.transport.call_count(), 2);
    assert_eq!(manager.get_metrics().in_flight_requests, 0);
}

#[tokio::test(start_paused = true)]
async fn test_distinct_arguments_are_not_deduplicated() {
    let (manager, transport) = single_provider_manager();

    let responses = join_all([
        manager.execute(request("a", "hasAccess", "0xaaa", Priority::High)),
        manager.execute(request("b", "hasAccess", "0xbbb", Priority::High)),
    ])
    .await;

    assert_eq!(transport.call_count(), 2);
    assert_ne!(responses[0].data, responses[1].data);
}

#[tokio::test(start_paused = true)]
async fn test_identical_calls_on_different_networks_are_not_deduplicated() {
    let mainnet = mock_provider("mainnet-node", ProviderTier::Premium);
    let base = mock_provider("base-node", ProviderTier::Premium);
    let client_set = Arc::new(ClientSet::from_pools([
        ProviderPool::new(1, "mainnet", vec![mainnet.endpoint.clone()]),
        ProviderPool::new(8453, "base", vec![base.endpoint.clone()]),
    ]));
    let manager = manager_with(&AppConfig::default(), client_set);

    let call = contract_call("balanceOf", "0xuser");
    let responses = join_all([
        manager.execute(Request::new("l1", 1, call.clone()).with_priority(Priority::High)),
        manager.execute(Request::new("l2", 8453, call).with_priority(Priority::High)),
    ])
    .await;

    assert!(responses.iter().all(Response::is_success));
    assert_eq!(mainnet.transport.call_count(), 1);
    assert_eq!(base.transport.call_count(), 1);
}

#[tokio::test]
async fn test_unknown_network_is_reported_in_the_response() {
    let (manager, transport) = single_provider_manager();

    let response = manager
        .execute(Request::new("x", 999, contract_call("balanceOf", "0xuser")).with_priority(Priority::High))
        .await;

    assert_eq!(response.error, Some(RequestError::UnknownChain(999)));
    assert_eq!(response.data, None::<Value>);
    assert_eq!(transport.network_calls(), 0);
}
