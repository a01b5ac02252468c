use serde_json::Value;
use std::{future::Future, sync::Arc};

use crate::{
    types::{ChainId, ContractCall},
    upstream::{
        endpoint::ProviderEndpoint,
        fallback::FallbackClient,
        transport::{MulticallResult, Transport},
        ProviderError,
    },
};

/// All providers of one network, ranked by health and latency.
pub struct ProviderPool {
    chain_id: ChainId,
    name: String,
    endpoints: Vec<Arc<ProviderEndpoint>>,
    fallback: Arc<FallbackClient>,
}

impl ProviderPool {
    /// Builds a pool; the composite fallback spans every endpoint's raw transport.
    #[must_use]
    pub fn new(chain_id: ChainId, name: impl Into<String>, endpoints: Vec<Arc<ProviderEndpoint>>) -> Self {
        let name = name.into();
        let members = endpoints.iter().map(|e| (e.transport(), e.config().weight)).collect();
        let fallback = Arc::new(FallbackClient::new(format!("{name}-fallback"), members));
        Self { chain_id, name, endpoints, fallback }
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: FallbackClient) -> Self {
        self.fallback = Arc::new(fallback);
        self
    }

    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn endpoints(&self) -> &[Arc<ProviderEndpoint>] {
        &self.endpoints
    }

    /// Healthy endpoints sorted ascending by average latency; ties go to the better tier.
    #[must_use]
    pub fn ranked(&self) -> Vec<Arc<ProviderEndpoint>> {
        let mut healthy: Vec<Arc<ProviderEndpoint>> =
            self.endpoints.iter().filter(|e| e.is_healthy()).cloned().collect();
        healthy.sort_by(|a, b| {
            a.avg_latency_ms()
                .total_cmp(&b.avg_latency_ms())
                .then_with(|| a.tier().rank().cmp(&b.tier().rank()))
        });
        healthy
    }

    /// Tries ranked providers in order, then the composite fallback over the
    /// transports the ranked pass did not reach.
    ///
    /// Transport failures move on to the next candidate. Call errors are returned
    /// immediately since every provider would answer the same way.
    async fn with_failover<T, F, Fut>(&self, op: F) -> Result<T, ProviderError>
    where
        F: Fn(Arc<dyn Transport>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let ranked = self.ranked();
        if ranked.is_empty() {
            tracing::warn!(chain_id = self.chain_id, "no healthy providers, using composite fallback");
        }

        let mut last_error = None;
        let mut tried = Vec::with_capacity(ranked.len());
        for endpoint in ranked {
            tried.push(endpoint.transport());
            let provider = endpoint.config().name.clone();
            tracing::trace!(chain_id = self.chain_id, provider = %provider, "selected provider");
            match op(endpoint as Arc<dyn Transport>).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_failover_eligible() => {
                    tracing::warn!(
                        chain_id = self.chain_id,
                        provider = %provider,
                        error = %e,
                        "provider failed, failing over"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        if last_error.is_some() {
            tracing::warn!(
                chain_id = self.chain_id,
                tried = tried.len(),
                "all ranked providers failed, using composite fallback"
            );
        }

        match self.fallback.run_skipping(&tried, &op).await {
            Err(ProviderError::AllProvidersFailed(detail)) => {
                Err(ProviderError::AllProvidersFailed(match last_error {
                    Some(e) => format!("chain {}: {e}; {detail}", self.chain_id),
                    None => format!("chain {}: {detail}", self.chain_id),
                }))
            }
            other => other,
        }
    }

    /// Executes one contract read with failover.
    ///
    /// # Errors
    ///
    /// Returns the call error as is, or [`ProviderError::AllProvidersFailed`] once every
    /// provider and the fallback failed at the transport level.
    pub async fn call(&self, call: &ContractCall) -> Result<Value, ProviderError> {
        self.with_failover(|t| async move { t.call(call).await }).await
    }

    /// Executes a multicall with failover. Per-member failures never trigger failover.
    ///
    /// # Errors
    ///
    /// Same as [`ProviderPool::call`], for the round trip as a whole.
    pub async fn multicall(&self, calls: &[ContractCall]) -> Result<MulticallResult, ProviderError> {
        self.with_failover(|t| async move { t.multicall(calls).await }).await
    }
}
