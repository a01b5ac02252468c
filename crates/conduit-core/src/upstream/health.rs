use futures::future::join_all;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::broadcast,
    time::{interval, MissedTickBehavior},
};

use crate::{config::HealthCheckConfig, upstream::client_set::ClientSet};

/// Periodically probes every provider with `eth_blockNumber` and updates its health.
pub struct HealthMonitor {
    client_set: Arc<ClientSet>,
    check_interval: Duration,
    probe_timeout: Duration,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(client_set: Arc<ClientSet>, config: &HealthCheckConfig) -> Self {
        Self {
            client_set,
            check_interval: config.interval(),
            probe_timeout: config.probe_timeout(),
        }
    }

    /// Spawns the probe loop. The first round runs immediately.
    #[must_use]
    pub fn start_with_shutdown(
        &self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let client_set = Arc::clone(&self.client_set);
        let check_interval = self.check_interval;
        let probe_timeout = self.probe_timeout;

        tokio::spawn(async move {
            let mut interval = interval(check_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        Self::check_all_providers(&client_set, probe_timeout).await;
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("health monitor shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Runs one probe round now and returns the number of healthy providers.
    pub async fn check_now(&self) -> usize {
        Self::check_all_providers(&self.client_set, self.probe_timeout).await
    }

    async fn check_all_providers(client_set: &ClientSet, probe_timeout: Duration) -> usize {
        let endpoints = client_set.endpoints();
        join_all(endpoints.iter().map(|endpoint| endpoint.probe(probe_timeout))).await;

        let mut healthy_count = 0usize;
        for endpoint in &endpoints {
            let healthy = endpoint.is_healthy();
            if healthy {
                healthy_count += 1;
            }
            metrics::gauge!("conduit_provider_healthy", "provider" => endpoint.config().name.clone())
                .set(if healthy { 1.0 } else { 0.0 });
        }

        tracing::debug!(healthy = healthy_count, total = endpoints.len(), "health check round complete");
        healthy_count
    }
}
