use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    config::ProviderTier,
    types::ChainId,
    upstream::{ClientSet, ProviderEndpoint},
};

/// Health snapshot of one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub name: String,
    pub tier: ProviderTier,
    pub weight: u32,
    pub is_healthy: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub avg_latency_ms: f64,
    pub request_count: u64,
}

impl ProviderStatus {
    fn from_endpoint(endpoint: &ProviderEndpoint) -> Self {
        let health = endpoint.health();
        let config = endpoint.config();
        Self {
            name: config.name.clone(),
            tier: config.tier,
            weight: config.weight,
            is_healthy: health.is_healthy,
            last_checked_at: health.last_checked_at,
            error_count: health.error_count,
            avg_latency_ms: health.avg_latency_ms,
            request_count: health.request_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub chain_id: ChainId,
    pub name: String,
    pub healthy_providers: usize,
    pub providers: Vec<ProviderStatus>,
}

/// Read-only view returned by `RequestManager::get_health_status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub networks: Vec<NetworkStatus>,
}

impl HealthStatus {
    /// Snapshot of every pool, networks sorted by chain id, providers in configuration order.
    #[must_use]
    pub fn collect(client_set: &ClientSet) -> Self {
        let networks = client_set
            .pools()
            .iter()
            .map(|pool| {
                let providers: Vec<ProviderStatus> =
                    pool.endpoints().iter().map(|e| ProviderStatus::from_endpoint(e)).collect();
                NetworkStatus {
                    chain_id: pool.chain_id(),
                    name: pool.name().to_string(),
                    healthy_providers: providers.iter().filter(|p| p.is_healthy).count(),
                    providers,
                }
            })
            .collect();
        Self { networks }
    }

    #[must_use]
    pub fn healthy_providers(&self) -> usize {
        self.networks.iter().map(|n| n.healthy_providers).sum()
    }

    #[must_use]
    pub fn total_providers(&self) -> usize {
        self.networks.iter().map(|n| n.providers.len()).sum()
    }
}
