//! Health scoring, ranked failover, rate limiting, and the composite fallback.

use crate::mock_infrastructure::{
    manager_with, mock_provider, request, single_chain_client_set, MockProvider, MockTransport,
    UNHEALTHY_THRESHOLD,
};
use conduit_core::{
    config::{AppConfig, HealthCheckConfig, ProviderConfig, ProviderTier},
    types::{Priority, ResponseSource},
    upstream::{HealthMonitor, ProviderEndpoint, ProviderError, Transport},
    RequestError, RequestManager,
};
use std::sync::Arc;

struct Fixture {
    manager: RequestManager,
    monitor: HealthMonitor,
    primary: MockProvider,
    secondary: MockProvider,
}

fn fixture() -> Fixture {
    let primary = mock_provider("primary", ProviderTier::Premium);
    let secondary = mock_provider("secondary", ProviderTier::Standard);
    let client_set = single_chain_client_set(&[&primary, &secondary]);
    let monitor = HealthMonitor::new(Arc::clone(&client_set), &HealthCheckConfig::default());
    let manager = manager_with(&AppConfig::default(), client_set);
    Fixture { manager, monitor, primary, secondary }
}

#[tokio::test]
async fn test_provider_failing_four_health_checks_is_routed_around() {
    let f = fixture();

    let before = f.manager.execute(request("1", "hasAccess", "0xaaa", Priority::High)).await;
    assert!(before.is_success());
    assert_eq!(f.primary.transport.call_count(), 1);

    f.primary.transport.set_probe_failure(Some(ProviderError::Timeout));
    for _ in 0..UNHEALTHY_THRESHOLD {
        f.monitor.check_now().await;
    }
    assert!(f.primary.endpoint.is_healthy());

    assert_eq!(f.monitor.check_now().await, 1);
    assert!(!f.primary.endpoint.is_healthy());
    assert!(f.secondary.endpoint.is_healthy());

    let after = f.manager.execute(request("2", "hasAccess", "0xbbb", Priority::High)).await;
    assert!(after.is_success());
    assert_eq!(after.source, ResponseSource::Single);
    assert_eq!(f.primary.transport.call_count(), 1);
    assert_eq!(f.secondary.transport.call_count(), 1);

    let status = f.manager.get_health_status();
    let network = &status.networks[0];
    assert_eq!(network.healthy_providers, 1);
    assert_eq!(network.providers[0].name, "primary");
    assert!(!network.providers[0].is_healthy);
    assert_eq!(network.providers[0].error_count, 4);
    assert!(network.providers[0].last_checked_at.is_some());
}

#[tokio::test]
async fn test_recovered_provider_rejoins_rotation() {
    let f = fixture();
    f.primary.transport.set_probe_failure(Some(ProviderError::ConnectionFailed("refused".into())));
    for _ in 0..=UNHEALTHY_THRESHOLD {
        f.monitor.check_now().await;
    }
    assert!(!f.primary.endpoint.is_healthy());

    f.primary.transport.set_probe_failure(None);
    assert_eq!(f.monitor.check_now().await, 2);
    assert!(f.primary.endpoint.is_healthy());
    assert_eq!(f.primary.endpoint.health().error_count, UNHEALTHY_THRESHOLD);

    let history = f.primary.endpoint.health_history();
    assert_eq!(history.len(), 5);
    assert!(history.last().is_some_and(|entry| entry.healthy));
}

#[tokio::test]
async fn test_transport_error_fails_over_without_caller_visible_failure() {
    let f = fixture();
    f.primary.transport.set_outage(Some(ProviderError::Timeout));

    let response = f.manager.execute(request("1", "hasAccess", "0xaaa", Priority::High)).await;

    assert!(response.is_success());
    assert_eq!(f.primary.transport.call_count(), 1);
    assert_eq!(f.secondary.transport.call_count(), 1);
    assert_eq!(f.primary.endpoint.health().error_count, 1);
}

#[tokio::test]
async fn test_revert_is_surfaced_without_trying_other_providers() {
    let f = fixture();
    let revert = ProviderError::RpcError(3, "execution reverted".into());
    f.primary.transport.respond_to("getPurchase", Err(revert.clone()));

    let response = f.manager.execute(request("1", "getPurchase", "7", Priority::High)).await;

    assert_eq!(response.error, Some(RequestError::Provider(revert)));
    assert_eq!(f.secondary.transport.call_count(), 0);
    // a revert says nothing about the provider's health
    assert_eq!(f.primary.endpoint.health().error_count, 0);
}

#[tokio::test]
async fn test_batched_requests_fail_over_too() {
    let f = fixture();
    f.primary.transport.set_outage(Some(ProviderError::HttpError(503, "busy".into())));

    let response = f.manager.execute(request("1", "balanceOf", "0xaaa", Priority::Low)).await;

    assert!(response.is_success());
    assert_eq!(response.source, ResponseSource::Batch);
    assert_eq!(f.primary.transport.multicall_count(), 1);
    assert_eq!(f.secondary.transport.multicall_count(), 1);
}

#[tokio::test]
async fn test_all_unhealthy_uses_composite_fallback() {
    let f = fixture();
    for provider in [&f.primary, &f.secondary] {
        provider.transport.set_probe_failure(Some(ProviderError::Timeout));
    }
    for _ in 0..=UNHEALTHY_THRESHOLD {
        f.monitor.check_now().await;
    }
    assert_eq!(f.manager.get_health_status().healthy_providers(), 0);

    let response = f.manager.execute(request("1", "hasAccess", "0xaaa", Priority::High)).await;

    assert!(response.is_success());
    assert_eq!(f.primary.transport.call_count() + f.secondary.transport.call_count(), 1);
    assert_eq!(f.primary.endpoint.health().request_count, 0);
    assert_eq!(f.secondary.endpoint.health().request_count, 0);
}

#[tokio::test]
async fn test_everything_down_is_reported_once_options_are_exhausted() {
    let f = fixture();
    for provider in [&f.primary, &f.secondary] {
        provider.transport.set_outage(Some(ProviderError::ConnectionFailed("refused".into())));
    }

    let response = f.manager.execute(request("1", "hasAccess", "0xaaa", Priority::High)).await;

    assert!(matches!(
        response.error,
        Some(RequestError::Provider(ProviderError::AllProvidersFailed(_)))
    ));
    assert_eq!(f.manager.get_metrics().contexts["default"].errors, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_provider_is_skipped_without_penalty() {
    let limited_transport = Arc::new(MockTransport::new("limited"));
    let mut config = ProviderConfig::new("limited", "http://limited.invalid").with_tier(ProviderTier::Premium);
    config.rate_limit_per_minute = 1;
    let limited = MockProvider {
        endpoint: Arc::new(ProviderEndpoint::new(
            config,
            Arc::clone(&limited_transport) as Arc<dyn Transport>,
            UNHEALTHY_THRESHOLD,
        )),
        transport: limited_transport,
    };
    let spare = mock_provider("spare", ProviderTier::Standard);
    let manager = manager_with(&AppConfig::default(), single_chain_client_set(&[&limited, &spare]));

    manager.execute(request("1", "hasAccess", "0xaaa", Priority::High)).await;
    let second = manager.execute(request("2", "hasAccess", "0xbbb", Priority::High)).await;

    assert!(second.is_success());
    assert_eq!(limited.transport.call_count(), 1);
    assert_eq!(spare.transport.call_count(), 1);
    let health = limited.endpoint.health();
    assert!(health.is_healthy);
    assert_eq!(health.error_count, 0);
    assert_eq!(health.request_count, 1);
}
