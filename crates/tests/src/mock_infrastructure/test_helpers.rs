//! Fixtures for wiring a [`RequestManager`] to mock transports.

use conduit_core::{
    config::{AppConfig, ProviderConfig, ProviderTier},
    metrics::MetricsCollector,
    types::{ChainId, ContractCall, Priority, Request},
    upstream::{ClientSet, ProviderEndpoint, ProviderPool, Transport},
    RequestManager,
};
use serde_json::json;
use std::sync::Arc;

use super::MockTransport;

pub const TEST_CHAIN: ChainId = 8453;
pub const UNHEALTHY_THRESHOLD: u32 = 3;

/// One mock provider of a pool.
pub struct MockProvider {
    pub endpoint: Arc<ProviderEndpoint>,
    pub transport: Arc<MockTransport>,
}

/// Builds a provider endpoint over a fresh [`MockTransport`].
#[must_use]
pub fn mock_provider(name: &str, tier: ProviderTier) -> MockProvider {
    mock_provider_with(MockTransport::new(name), tier)
}

#[must_use]
pub fn mock_provider_with(transport: MockTransport, tier: ProviderTier) -> MockProvider {
    let transport = Arc::new(transport);
    let name = transport.name().to_string();
    let config = ProviderConfig::new(name.clone(), format!("http://{name}.invalid")).with_tier(tier);
    let endpoint = Arc::new(ProviderEndpoint::new(
        config,
        Arc::clone(&transport) as Arc<dyn Transport>,
        UNHEALTHY_THRESHOLD,
    ));
    MockProvider { endpoint, transport }
}

/// A client set with a single pool on `TEST_CHAIN`.
#[must_use]
pub fn single_chain_client_set(providers: &[&MockProvider]) -> Arc<ClientSet> {
    let endpoints = providers.iter().map(|p| Arc::clone(&p.endpoint)).collect();
    Arc::new(ClientSet::from_pools([ProviderPool::new(TEST_CHAIN, "base", endpoints)]))
}

#[must_use]
pub fn manager_with(config: &AppConfig, client_set: Arc<ClientSet>) -> RequestManager {
    RequestManager::new(config, client_set, Arc::new(MetricsCollector::new()))
}

/// Manager over one healthy mock provider, with default tunables.
#[must_use]
pub fn single_provider_manager() -> (RequestManager, Arc<MockTransport>) {
    let provider = mock_provider("primary", ProviderTier::Premium);
    let manager = manager_with(&AppConfig::default(), single_chain_client_set(&[&provider]));
    (manager, provider.transport)
}

#[must_use]
pub fn contract_call(function_name: &str, arg: &str) -> ContractCall {
    ContractCall::new("0xC0ffee0000000000000000000000000000000001", function_name, json!([arg]))
        .with_calldata("0x70a08231")
}

#[must_use]
pub fn request(id: &str, function_name: &str, arg: &str, priority: Priority) -> Request {
    Request::new(id, TEST_CHAIN, contract_call(function_name, arg)).with_priority(priority)
}
