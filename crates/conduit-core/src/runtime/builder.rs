//! Builder for the conduit runtime.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::{
    config::AppConfig,
    metrics::MetricsCollector,
    orchestrator::RequestManager,
    upstream::{ClientSet, HealthMonitor, HttpClient},
};

use super::lifecycle::ConduitRuntime;

/// Errors that can occur during runtime initialization.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// No networks configured
    #[error("No networks configured")]
    NoNetworks,

    /// Generic initialization error
    #[error("Runtime initialization failed: {0}")]
    Initialization(String),
}

#[derive(Clone)]
struct RuntimeOptions {
    enable_health_monitor: bool,
    shutdown_channel_capacity: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { enable_health_monitor: false, shutdown_channel_capacity: 16 }
    }
}

/// Builder for constructing a [`ConduitRuntime`].
///
/// A prebuilt [`ClientSet`] can be injected with [`with_client_set`](Self::with_client_set),
/// which skips HTTP transport construction. The configuration is still required for
/// batching, cache, and health-check tunables.
pub struct ConduitRuntimeBuilder {
    config: Option<AppConfig>,
    client_set: Option<Arc<ClientSet>>,
    options: RuntimeOptions,
}

impl ConduitRuntimeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { config: None, client_set: None, options: RuntimeOptions::default() }
    }

    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn with_client_set(mut self, client_set: Arc<ClientSet>) -> Self {
        self.client_set = Some(client_set);
        self
    }

    /// Starts the periodic `eth_blockNumber` probe loop when the runtime is built.
    #[must_use]
    pub fn enable_health_monitor(mut self) -> Self {
        self.options.enable_health_monitor = true;
        self
    }

    #[must_use]
    pub fn disable_health_monitor(mut self) -> Self {
        self.options.enable_health_monitor = false;
        self
    }

    /// Sets custom shutdown channel capacity (default: 16).
    #[must_use]
    pub fn with_shutdown_channel_capacity(mut self, capacity: usize) -> Self {
        self.options.shutdown_channel_capacity = capacity.max(1);
        self
    }

    /// Builds the runtime and starts its background tasks.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] if configuration is missing or invalid, no networks are
    /// configured, or the HTTP client cannot be built.
    pub fn build(self) -> Result<ConduitRuntime, RuntimeError> {
        let config = self.config.ok_or_else(|| {
            RuntimeError::ConfigValidation("No configuration provided".to_string())
        })?;

        if config.networks.is_empty() && self.client_set.is_none() {
            return Err(RuntimeError::NoNetworks);
        }
        if self.client_set.is_none() {
            config.validate().map_err(RuntimeError::ConfigValidation)?;
        }

        info!(
            networks = config.networks.len(),
            providers = config.provider_count(),
            health_monitor_enabled = self.options.enable_health_monitor,
            "initializing conduit runtime"
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(self.options.shutdown_channel_capacity);

        let client_set = match self.client_set {
            Some(client_set) => client_set,
            None => {
                let http_client = Arc::new(
                    HttpClient::new(&config.http)
                        .map_err(|e| RuntimeError::Initialization(format!("HTTP client: {e}")))?,
                );
                Arc::new(ClientSet::from_config(&config, &http_client))
            }
        };
        debug!(pools = client_set.pools().len(), "client set initialized");

        let metrics_collector = Arc::new(MetricsCollector::new());
        let request_manager =
            RequestManager::new(&config, Arc::clone(&client_set), Arc::clone(&metrics_collector));
        debug!("request manager initialized");

        let health_monitor = Arc::new(HealthMonitor::new(Arc::clone(&client_set), &config.health_check));

        let runtime = ConduitRuntime::new(
            config,
            client_set,
            request_manager,
            metrics_collector,
            health_monitor,
            shutdown_tx,
            self.options.enable_health_monitor,
        );

        info!("conduit runtime initialization complete");
        Ok(runtime)
    }
}

impl Default for ConduitRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
