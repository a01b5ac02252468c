//! Per-context request counters mirrored to Prometheus.
//!
//! Counters are keyed by page-context label and are diagnostic only: nothing in the
//! request path reads them back. Each `record_*` call bumps a relaxed atomic for
//! [`MetricsSnapshot`] and the matching `metrics` counter for the exporter.

use dashmap::DashMap;
use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        OnceLock,
    },
};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "global metrics recorder already installed, using a detached prometheus recorder"
                );
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

#[derive(Debug, Default)]
struct ContextCounters {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    batched_requests: AtomicU64,
    deduplicated_requests: AtomicU64,
    errors: AtomicU64,
}

impl ContextCounters {
    fn snapshot(&self) -> ContextStats {
        ContextStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            batched_requests: self.batched_requests.load(Ordering::Relaxed),
            deduplicated_requests: self.deduplicated_requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counters of one page context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub batched_requests: u64,
    pub deduplicated_requests: u64,
    pub errors: u64,
}

/// Read-only view returned by `RequestManager::get_metrics`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub cache_size: usize,
    pub in_flight_requests: usize,
    pub queued_batch_requests: usize,
    pub flushing_batches: usize,
    pub contexts: BTreeMap<String, ContextStats>,
}

#[derive(Clone, Copy)]
enum Counter {
    Total,
    CacheHit,
    Batched,
    Deduplicated,
    Error,
}

pub struct MetricsCollector {
    contexts: DashMap<String, ContextCounters>,
    prometheus_handle: PrometheusHandle,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self { contexts: DashMap::new(), prometheus_handle: init_prometheus_recorder() }
    }

    fn bump(&self, context: &str, which: Counter) {
        if let Some(counters) = self.contexts.get(context) {
            Self::increment(&counters, which);
        } else {
            let counters = self.contexts.entry(context.to_string()).or_default();
            Self::increment(&counters, which);
        }

        let label = context.to_string();
        match which {
            Counter::Total => counter!("conduit_requests_total", "context" => label).increment(1),
            Counter::CacheHit => counter!("conduit_cache_hits_total", "context" => label).increment(1),
            Counter::Batched => {
                counter!("conduit_batched_requests_total", "context" => label).increment(1);
            }
            Counter::Deduplicated => counter!("conduit_dedup_hits_total", "context" => label).increment(1),
            Counter::Error => counter!("conduit_errors_total", "context" => label).increment(1),
        }
    }

    fn increment(counters: &ContextCounters, which: Counter) {
        let slot = match which {
            Counter::Total => &counters.total_requests,
            Counter::CacheHit => &counters.cache_hits,
            Counter::Batched => &counters.batched_requests,
            Counter::Deduplicated => &counters.deduplicated_requests,
            Counter::Error => &counters.errors,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request(&self, context: &str) {
        self.bump(context, Counter::Total);
    }

    pub fn record_cache_hit(&self, context: &str) {
        self.bump(context, Counter::CacheHit);
    }

    pub fn record_batched(&self, context: &str) {
        self.bump(context, Counter::Batched);
    }

    pub fn record_deduplicated(&self, context: &str) {
        self.bump(context, Counter::Deduplicated);
    }

    pub fn record_error(&self, context: &str) {
        self.bump(context, Counter::Error);
    }

    /// `reason` is `size`, `timer`, `shutdown` or `explicit`.
    pub fn record_batch_flush(&self, reason: &'static str, size: usize) {
        counter!("conduit_batch_flushes_total", "reason" => reason).increment(1);
        tracing::debug!(reason = reason, size = size, "batch flushed");
    }

    /// Counters of every context seen so far, sorted by label.
    #[must_use]
    pub fn context_stats(&self) -> BTreeMap<String, ContextStats> {
        self.contexts.iter().map(|entry| (entry.key().clone(), entry.value().snapshot())).collect()
    }

    /// Prometheus text exposition of the global recorder.
    #[must_use]
    pub fn prometheus_output(&self) -> String {
        self.prometheus_handle.render()
    }
}
