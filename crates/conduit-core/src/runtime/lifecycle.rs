//! Runtime lifecycle: background tasks and graceful shutdown.

use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{
    config::AppConfig,
    metrics::MetricsCollector,
    orchestrator::RequestManager,
    upstream::{ClientSet, HealthMonitor},
};

use super::builder::ConduitRuntimeBuilder;

const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Owns the initialized components and their background tasks.
///
/// The cache sweep always runs; the health monitor runs when enabled. `shutdown()`
/// signals every task over the broadcast channel, waits for them to stop, and flushes
/// any queued batches so no caller is left waiting.
pub struct ConduitRuntime {
    config: AppConfig,
    client_set: Arc<ClientSet>,
    request_manager: RequestManager,
    metrics_collector: Arc<MetricsCollector>,
    health_monitor: Arc<HealthMonitor>,
    shutdown_tx: broadcast::Sender<()>,
    health_task: Mutex<Option<JoinHandle<()>>>,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
    shutdown_initiated: AtomicBool,
}

impl ConduitRuntime {
    #[must_use]
    pub fn builder() -> ConduitRuntimeBuilder {
        ConduitRuntimeBuilder::new()
    }

    pub(super) fn new(
        config: AppConfig,
        client_set: Arc<ClientSet>,
        request_manager: RequestManager,
        metrics_collector: Arc<MetricsCollector>,
        health_monitor: Arc<HealthMonitor>,
        shutdown_tx: broadcast::Sender<()>,
        enable_health_monitor: bool,
    ) -> Self {
        let health_task = if enable_health_monitor {
            let handle = health_monitor.start_with_shutdown(shutdown_tx.subscribe());
            debug!("health monitor task started");
            Some(handle)
        } else {
            None
        };
        let sweep_task = request_manager.start_cache_sweep(shutdown_tx.subscribe());
        debug!("cache sweep task started");

        Self {
            config,
            client_set,
            request_manager,
            metrics_collector,
            health_monitor,
            shutdown_tx,
            health_task: Mutex::new(health_task),
            sweep_task: Mutex::new(Some(sweep_task)),
            shutdown_initiated: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn client_set(&self) -> &Arc<ClientSet> {
        &self.client_set
    }

    #[must_use]
    pub fn request_manager(&self) -> &RequestManager {
        &self.request_manager
    }

    #[must_use]
    pub fn metrics_collector(&self) -> &Arc<MetricsCollector> {
        &self.metrics_collector
    }

    #[must_use]
    pub fn health_monitor(&self) -> &Arc<HealthMonitor> {
        &self.health_monitor
    }

    /// Whether the periodic health probe loop is still owned by this runtime.
    #[must_use]
    pub fn has_health_task(&self) -> bool {
        self.health_task.lock().is_some()
    }

    /// Whether the expired-entry sweep is still owned by this runtime.
    #[must_use]
    pub fn has_sweep_task(&self) -> bool {
        self.sweep_task.lock().is_some()
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Creates a new shutdown receiver for custom background tasks.
    #[must_use]
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Initiates graceful shutdown. Safe to call more than once; later calls return
    /// immediately.
    pub async fn shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("shutdown already initiated, ignoring duplicate call");
            return;
        }

        info!("initiating conduit runtime shutdown");
        if self.shutdown_tx.send(()).is_err() {
            debug!("shutdown signal had no receivers");
        }

        let health_task = self.health_task.lock().take();
        if let Some(task) = health_task {
            join_task("health monitor", task).await;
        }
        let sweep_task = self.sweep_task.lock().take();
        if let Some(task) = sweep_task {
            join_task("cache sweep", task).await;
        }

        let flushed = self.request_manager.flush_batches().await;
        info!(flushed_batches = flushed, "conduit runtime shutdown complete");
    }

    /// Waits for a shutdown signal from any holder of [`shutdown_receiver`](Self::shutdown_receiver)
    /// or an external sender, then performs cleanup.
    pub async fn wait_for_shutdown(&self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let _ = shutdown_rx.recv().await;
        info!("shutdown signal received, runtime terminating");
        self.shutdown().await;
    }

    /// Broadcasts the shutdown signal without waiting for cleanup.
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Waits for a background task to stop, aborting it after [`TASK_JOIN_TIMEOUT`].
async fn join_task(name: &'static str, mut task: JoinHandle<()>) {
    match tokio::time::timeout(TASK_JOIN_TIMEOUT, &mut task).await {
        Ok(Ok(())) => debug!(task = name, "background task completed"),
        Ok(Err(e)) if e.is_cancelled() => debug!(task = name, "background task cancelled"),
        Ok(Err(e)) => error!(task = name, error = %e, "background task failed"),
        Err(_) => {
            warn!(task = name, "background task did not stop in time, aborting");
            task.abort();
        }
    }
}
