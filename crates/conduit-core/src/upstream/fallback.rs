use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::Value;
use std::sync::Arc;

use crate::{
    types::ContractCall,
    upstream::{
        transport::{MulticallResult, Transport},
        ProviderError,
    },
};

/// Composite client that load-balances across every configured transport by weight.
///
/// Used when no individually tracked provider is healthy or all of them failed.
/// Each attempt draws a weighted random order without replacement and walks it,
/// stopping at the first success or the first call error.
pub struct FallbackClient {
    name: String,
    members: Vec<(Arc<dyn Transport>, u32)>,
    rng: Mutex<StdRng>,
}

impl FallbackClient {
    #[must_use]
    pub fn new(name: impl Into<String>, members: Vec<(Arc<dyn Transport>, u32)>) -> Self {
        Self { name: name.into(), members, rng: Mutex::new(StdRng::from_os_rng()) }
    }

    /// Deterministic ordering for tests.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Weighted random permutation of the members not in `skip`.
    fn attempt_order(&self, skip: &[Arc<dyn Transport>]) -> Vec<Arc<dyn Transport>> {
        let mut remaining: Vec<(Arc<dyn Transport>, u64)> = self
            .members
            .iter()
            .filter(|(transport, _)| !skip.iter().any(|s| same_transport(s, transport)))
            .map(|(transport, weight)| (Arc::clone(transport), u64::from((*weight).max(1))))
            .collect();
        let mut order = Vec::with_capacity(remaining.len());
        let mut rng = self.rng.lock();

        while !remaining.is_empty() {
            let total: u64 = remaining.iter().map(|(_, w)| w).sum();
            let mut pick = rng.random_range(0..total);
            let mut chosen = remaining.len() - 1;
            for (index, (_, weight)) in remaining.iter().enumerate() {
                if pick < *weight {
                    chosen = index;
                    break;
                }
                pick -= weight;
            }
            order.push(remaining.swap_remove(chosen).0);
        }
        order
    }

    async fn run<T, F, Fut>(&self, op: F) -> Result<T, ProviderError>
    where
        F: Fn(Arc<dyn Transport>) -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        self.run_skipping(&[], op).await
    }

    /// Walks the members except those in `skip`, matched by identity.
    pub(crate) async fn run_skipping<T, F, Fut>(
        &self,
        skip: &[Arc<dyn Transport>],
        op: F,
    ) -> Result<T, ProviderError>
    where
        F: Fn(Arc<dyn Transport>) -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let order = self.attempt_order(skip);
        if order.is_empty() && !self.members.is_empty() {
            return Err(ProviderError::AllProvidersFailed(format!(
                "{}: every member already tried",
                self.name
            )));
        }

        let mut last_error = None;
        for transport in order {
            let name = transport.name().to_string();
            match op(transport).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_failover_eligible() => {
                    tracing::debug!(client = %self.name, provider = %name, error = %e, "fallback member failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(ProviderError::AllProvidersFailed(match last_error {
            Some(e) => format!("{}: last error: {e}", self.name),
            None => format!("{}: no transports configured", self.name),
        }))
    }
}

fn same_transport(a: &Arc<dyn Transport>, b: &Arc<dyn Transport>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[async_trait]
impl Transport for FallbackClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, call: &ContractCall) -> Result<Value, ProviderError> {
        self.run(|transport| async move { transport.call(call).await }).await
    }

    async fn multicall(&self, calls: &[ContractCall]) -> Result<MulticallResult, ProviderError> {
        self.run(|transport| async move { transport.multicall(calls).await }).await
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        self.run(|transport| async move { transport.block_number().await }).await
    }
}
