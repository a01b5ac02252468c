//! Batch grouping by `(chain, page context)`, size-triggered flushes, and `execute_batch`.

use crate::mock_infrastructure::{
    contract_call, manager_with, mock_provider, request, single_chain_client_set, single_provider_manager,
    MockTransport, TEST_CHAIN,
};
use conduit_core::{
    config::{AppConfig, BatchConfig, ProviderTier},
    types::{Priority, Request, ResponseSource},
    upstream::{ClientSet, ProviderPool},
};
use futures::future::join_all;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;

fn config_with_batching(batching: BatchConfig) -> AppConfig {
    AppConfig { batching, ..AppConfig::default() }
}

#[tokio::test(start_paused = true)]
async fn test_same_context_within_window_is_one_multicall() {
    let (manager, transport) = single_provider_manager();

    let responses = join_all([
        manager.execute(request("a", "balanceOf", "0xaaa", Priority::Low).with_page_context("dashboard")),
        manager.execute(request("b", "balanceOf", "0xbbb", Priority::Low).with_page_context("dashboard")),
    ])
    .await;

    assert_eq!(transport.multicall_sizes(), vec![2]);
    assert!(responses.iter().all(|r| r.is_success() && r.source == ResponseSource::Batch));
    assert_eq!(
        responses[0].data,
        Some(MockTransport::expected_value(&contract_call("balanceOf", "0xaaa")))
    );
    assert_eq!(
        responses[1].data,
        Some(MockTransport::expected_value(&contract_call("balanceOf", "0xbbb")))
    );
}

#[tokio::test(start_paused = true)]
async fn test_different_contexts_are_separate_multicalls() {
    let (manager, transport) = single_provider_manager();

    join_all([
        manager.execute(request("a", "balanceOf", "0xaaa", Priority::Low).with_page_context("dashboard")),
        manager.execute(request("b", "balanceOf", "0xbbb", Priority::Low).with_page_context("profile")),
    ])
    .await;

    let mut sizes = transport.multicall_sizes();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![1, 1]);
}

#[tokio::test(start_paused = true)]
async fn test_context_grouping_disabled_merges_contexts() {
    let provider = mock_provider("primary", ProviderTier::Premium);
    let config = config_with_batching(BatchConfig { group_by_context: false, ..BatchConfig::default() });
    let manager = manager_with(&config, single_chain_client_set(&[&provider]));

    join_all([
        manager.execute(request("a", "balanceOf", "0xaaa", Priority::Low).with_page_context("dashboard")),
        manager.execute(request("b", "balanceOf", "0xbbb", Priority::Medium).with_page_context("profile")),
    ])
    .await;

    assert_eq!(provider.transport.multicall_sizes(), vec![2]);
}

#[tokio::test(start_paused = true)]
async fn test_full_queue_flushes_before_timer() {
    let provider = mock_provider("primary", ProviderTier::Premium);
    let config = config_with_batching(BatchConfig { max_batch_size: 3, ..BatchConfig::default() });
    let manager = manager_with(&config, single_chain_client_set(&[&provider]));
    let started = Instant::now();

    let responses = join_all(
        (0..3).map(|i| manager.execute(request(&format!("r{i}"), "balanceOf", &format!("0x{i}"), Priority::Low))),
    )
    .await;

    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(responses.iter().all(conduit_core::Response::is_success));
    assert_eq!(provider.transport.multicall_sizes(), vec![3]);
}

#[tokio::test(start_paused = true)]
async fn test_requests_after_a_flush_start_a_new_batch() {
    let (manager, transport) = single_provider_manager();

    manager.execute(request("a", "balanceOf", "0xaaa", Priority::Low)).await;
    manager.execute(request("b", "balanceOf", "0xbbb", Priority::Low)).await;

    assert_eq!(transport.multicall_sizes(), vec![1, 1]);
    assert_eq!(manager.get_metrics().queued_batch_requests, 0);
}

#[tokio::test(start_paused = true)]
async fn test_execute_batch_is_one_multicall_per_network() {
    let mainnet = mock_provider("mainnet-node", ProviderTier::Premium);
    let base = mock_provider("base-node", ProviderTier::Premium);
    let client_set = Arc::new(ClientSet::from_pools([
        ProviderPool::new(1, "mainnet", vec![mainnet.endpoint.clone()]),
        ProviderPool::new(TEST_CHAIN, "base", vec![base.endpoint.clone()]),
    ]));
    let manager = manager_with(&AppConfig::default(), client_set);
    let started = Instant::now();

    let responses = manager
        .execute_batch(vec![
            Request::new("m1", 1, contract_call("balanceOf", "0x1")),
            Request::new("m2", 1, contract_call("balanceOf", "0x2")),
            request("b1", "hasAccess", "0x3", Priority::High),
            request("b2", "hasAccess", "0x4", Priority::Low),
        ])
        .await;

    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(responses.len(), 4);
    assert!(responses.values().all(|r| r.is_success() && r.source == ResponseSource::Batch));
    assert_eq!(mainnet.transport.multicall_sizes(), vec![2]);
    assert_eq!(base.transport.multicall_sizes(), vec![2]);
    assert_eq!(
        responses["b1"].data,
        Some(MockTransport::expected_value(&contract_call("hasAccess", "0x3")))
    );
}

#[tokio::test(start_paused = true)]
async fn test_execute_batch_chunks_by_max_batch_size() {
    let provider = mock_provider("primary", ProviderTier::Premium);
    let config = config_with_batching(BatchConfig { max_batch_size: 2, ..BatchConfig::default() });
    let manager = manager_with(&config, single_chain_client_set(&[&provider]));

    let requests =
        (0..5).map(|i| request(&format!("r{i}"), "balanceOf", &format!("0x{i}"), Priority::Low)).collect();
    let responses = manager.execute_batch(requests).await;

    assert_eq!(responses.len(), 5);
    let mut sizes = provider.transport.multicall_sizes();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![1, 2, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_execute_batch_serves_cached_entries_without_network() {
    let (manager, transport) = single_provider_manager();
    manager.execute(request("warm", "hasAccess", "0xuser", Priority::High)).await;

    let responses = manager
        .execute_batch(vec![
            request("cached", "hasAccess", "0xuser", Priority::High),
            request("fresh", "hasAccess", "0xother", Priority::High),
        ])
        .await;

    assert_eq!(responses["cached"].source, ResponseSource::Cache);
    assert_eq!(responses["fresh"].source, ResponseSource::Batch);
    assert_eq!(transport.call_count(), 1);
    assert_eq!(transport.multicall_sizes(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_execute_batch_collapses_duplicate_calls() {
    let (manager, transport) = single_provider_manager();

    let responses = manager
        .execute_batch(vec![
            request("first", "balanceOf", "0xuser", Priority::Low),
            request("second", "balanceOf", "0xuser", Priority::Low),
        ])
        .await;

    assert_eq!(transport.multicall_sizes(), vec![1]);
    assert_eq!(responses["first"].data, responses["second"].data);
    assert_eq!(manager.get_metrics().contexts["default"].deduplicated_requests, 1);
}
