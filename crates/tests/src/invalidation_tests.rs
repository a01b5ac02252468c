//! Named invalidation patterns evict matching cache entries and leave the rest.

use crate::mock_infrastructure::{
    manager_with, mock_provider, mock_provider_with, request, single_chain_client_set,
    single_provider_manager, MockProvider, MockTransport,
};
use conduit_core::{
    config::{AppConfig, InvalidationConfig, ProviderTier},
    types::{Priority, ResponseSource},
    RequestManager,
};
use std::{collections::BTreeMap, time::Duration};

fn slow_manager() -> (RequestManager, MockProvider) {
    let provider = mock_provider_with(
        MockTransport::new("primary").with_latency(Duration::from_millis(50)),
        ProviderTier::Premium,
    );
    let manager = manager_with(&AppConfig::default(), single_chain_client_set(&[&provider]));
    (manager, provider)
}

#[tokio::test]
async fn test_purchase_pattern_evicts_matching_entries_only() {
    let (manager, transport) = single_provider_manager();
    for (id, function) in [("a", "hasAccess"), ("b", "balanceOf"), ("c", "getCreatorProfile")] {
        manager.execute(request(id, function, "0xuser", Priority::High)).await;
    }
    assert_eq!(transport.call_count(), 3);

    assert_eq!(manager.invalidate("purchase", None), 2);

    let creator = manager.execute(request("c", "getCreatorProfile", "0xuser", Priority::High)).await;
    assert_eq!(creator.source, ResponseSource::Cache);

    let access = manager.execute(request("a", "hasAccess", "0xuser", Priority::High)).await;
    let balance = manager.execute(request("b", "balanceOf", "0xuser", Priority::High)).await;
    assert_eq!(access.source, ResponseSource::Single);
    assert_eq!(balance.source, ResponseSource::Single);
    assert_eq!(transport.call_count(), 5);
}

#[tokio::test]
async fn test_context_hint_narrows_eviction() {
    let (manager, _transport) = single_provider_manager();
    manager
        .execute(request("a", "hasAccess", "x", Priority::High).with_cache_key("hasAccess:user-a:content-1"))
        .await;
    manager
        .execute(request("b", "hasAccess", "y", Priority::High).with_cache_key("hasAccess:user-b:content-1"))
        .await;

    assert_eq!(manager.invalidate("subscription", Some("user-a")), 1);

    let kept = manager
        .execute(request("b", "hasAccess", "y", Priority::High).with_cache_key("hasAccess:user-b:content-1"))
        .await;
    assert_eq!(kept.source, ResponseSource::Cache);
    assert_eq!(manager.get_metrics().cache_size, 1);
}

#[tokio::test]
async fn test_unknown_pattern_is_a_no_op() {
    let (manager, _transport) = single_provider_manager();
    manager.execute(request("a", "hasAccess", "0xuser", Priority::High)).await;

    assert_eq!(manager.invalidate("refund", None), 0);
    assert_eq!(manager.get_metrics().cache_size, 1);
}

#[tokio::test]
async fn test_exact_key_and_clear() {
    let (manager, transport) = single_provider_manager();
    let a = request("a", "hasAccess", "0xuser", Priority::High);
    let b = request("b", "balanceOf", "0xuser", Priority::High);
    manager.execute(a.clone()).await;
    manager.execute(b.clone()).await;

    assert!(manager.invalidate_key(&a.request_key()));
    assert!(!manager.invalidate_key(&a.request_key()));
    assert_eq!(manager.get_metrics().cache_size, 1);

    manager.clear_cache();
    assert_eq!(manager.get_metrics().cache_size, 0);

    manager.execute(b).await;
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test]
async fn test_custom_patterns_from_config() {
    let provider = mock_provider("primary", ProviderTier::Premium);
    let mut patterns = BTreeMap::new();
    patterns.insert("tip".to_string(), vec!["tipJar".to_string()]);
    let config = AppConfig {
        invalidation: InvalidationConfig { patterns },
        ..AppConfig::default()
    };
    let manager = manager_with(&config, single_chain_client_set(&[&provider]));

    manager.execute(request("t", "tipJar", "0xcreator", Priority::High)).await;
    manager.execute(request("h", "hasAccess", "0xuser", Priority::High)).await;

    assert_eq!(manager.invalidate("purchase", None), 0);
    assert_eq!(manager.invalidate("tip", None), 1);
    assert_eq!(manager.get_metrics().cache_size, 1);
}

#[tokio::test(start_paused = true)]
async fn test_read_in_flight_during_invalidation_is_not_cached() {
    let (manager, provider) = slow_manager();
    let in_flight = tokio::spawn({
        let manager = manager.clone();
        async move { manager.execute(request("a", "hasAccess", "0xuser", Priority::High)).await }
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(manager.invalidate("purchase", None), 0);

    let before = in_flight.await.unwrap();
    assert!(before.is_success());
    assert_eq!(manager.get_metrics().cache_size, 0);

    let after = manager.execute(request("a", "hasAccess", "0xuser", Priority::High)).await;
    assert_eq!(after.source, ResponseSource::Single);
    assert_eq!(provider.transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_queued_read_during_invalidation_is_not_cached() {
    let (manager, provider) = slow_manager();
    let queued = tokio::spawn({
        let manager = manager.clone();
        async move { manager.execute(request("a", "getPurchase", "0xuser", Priority::Low)).await }
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    manager.invalidate("purchase", None);

    assert_eq!(queued.await.unwrap().source, ResponseSource::Batch);
    let after = manager.execute(request("a", "getPurchase", "0xuser", Priority::Low)).await;
    assert_eq!(after.source, ResponseSource::Batch);
    assert_eq!(provider.transport.multicall_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unrelated_invalidation_during_flight_still_caches() {
    let (manager, provider) = slow_manager();
    let in_flight = tokio::spawn({
        let manager = manager.clone();
        async move { manager.execute(request("a", "hasAccess", "0xuser", Priority::High)).await }
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    manager.invalidate("creator", None);
    in_flight.await.unwrap();

    let after = manager.execute(request("a", "hasAccess", "0xuser", Priority::High)).await;
    assert_eq!(after.source, ResponseSource::Cache);
    assert_eq!(provider.transport.call_count(), 1);
}
