use async_trait::async_trait;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

use crate::{
    batch::MulticallExecutor,
    config::AppConfig,
    orchestrator::RequestError,
    types::{ChainId, ContractCall},
    upstream::{
        endpoint::ProviderEndpoint,
        http_client::HttpClient,
        pool::ProviderPool,
        transport::{HttpTransport, MulticallResult, Transport},
    },
};

/// One provider pool per configured network.
pub struct ClientSet {
    pools: HashMap<ChainId, Arc<ProviderPool>>,
}

impl ClientSet {
    #[must_use]
    pub fn from_pools(pools: impl IntoIterator<Item = ProviderPool>) -> Self {
        Self { pools: pools.into_iter().map(|pool| (pool.chain_id(), Arc::new(pool))).collect() }
    }

    /// Builds HTTP transports for every configured provider, sharing one HTTP client.
    #[must_use]
    pub fn from_config(config: &AppConfig, http_client: &Arc<HttpClient>) -> Self {
        let threshold = config.health_check.unhealthy_threshold;
        Self::from_pools(config.networks.iter().map(|network| {
            let endpoints = network
                .providers
                .iter()
                .map(|provider| {
                    let transport: Arc<dyn Transport> =
                        Arc::new(HttpTransport::new(provider, Arc::clone(http_client)));
                    Arc::new(ProviderEndpoint::new(provider.clone(), transport, threshold))
                })
                .collect();
            tracing::info!(
                chain_id = network.chain_id,
                network = %network.name,
                providers = network.providers.len(),
                "provider pool initialized"
            );
            ProviderPool::new(network.chain_id, network.name.clone(), endpoints)
        }))
    }

    #[must_use]
    pub fn pool(&self, chain_id: ChainId) -> Option<&Arc<ProviderPool>> {
        self.pools.get(&chain_id)
    }

    /// Pools sorted by chain id.
    #[must_use]
    pub fn pools(&self) -> Vec<Arc<ProviderPool>> {
        let mut pools: Vec<_> = self.pools.values().cloned().collect();
        pools.sort_by_key(|pool| pool.chain_id());
        pools
    }

    /// Every endpoint across networks.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Arc<ProviderEndpoint>> {
        self.pools().iter().flat_map(|pool| pool.endpoints().to_vec()).collect()
    }

    fn require_pool(&self, chain_id: ChainId) -> Result<&Arc<ProviderPool>, RequestError> {
        self.pools.get(&chain_id).ok_or(RequestError::UnknownChain(chain_id))
    }

    /// Executes a single read on the given network.
    ///
    /// # Errors
    ///
    /// [`RequestError::UnknownChain`] for an unconfigured network, otherwise the
    /// pool's [`ProviderError`](crate::upstream::ProviderError).
    pub async fn call(&self, chain_id: ChainId, call: &ContractCall) -> Result<Value, RequestError> {
        Ok(self.require_pool(chain_id)?.call(call).await?)
    }
}

#[async_trait]
impl MulticallExecutor for ClientSet {
    async fn execute_multicall(
        &self,
        chain_id: ChainId,
        calls: &[ContractCall],
    ) -> Result<MulticallResult, RequestError> {
        Ok(self.require_pool(chain_id)?.multicall(calls).await?)
    }
}
