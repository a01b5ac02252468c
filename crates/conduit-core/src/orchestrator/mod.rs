//! Request orchestration façade.
//!
//! ```text
//! execute(request)
//!   │
//!   ├─ CacheStore hit ───────────────────────────────▶ Response{source: cache}
//!   │
//!   └─ DedupMap::attach(key)
//!        ├─ Follower ── await leader's outcome ───────▶ Response{source: leader's}
//!        │     (a high follower expedites a leader still queued for a batch)
//!        └─ Leader ── cache re-check, then spawned execution
//!              ├─ high ─────── ClientSet::call ───────▶ single
//!              └─ medium/low ─ BatchScheduler ────────▶ batch
//!                    then cache write on success, then settle
//! ```
//!
//! Leaders run in their own task: a caller that stops awaiting never cancels work
//! other callers may be attached to. A leader records the cache epoch before it starts
//! and does not cache its value if a covering invalidation ran while it was in flight.
//! The façade never returns `Err` and never panics; every failure comes back as
//! [`Response::error`](crate::types::Response).

pub mod errors;
pub mod status;

pub use errors::RequestError;
pub use status::{HealthStatus, NetworkStatus, ProviderStatus};

use futures::future::join_all;
use serde_json::Value;
use std::{
    collections::{BTreeMap, HashMap},
    num::NonZeroUsize,
    sync::Arc,
};
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};

use crate::{
    batch::{BatchScheduler, MulticallExecutor, QueuedCall},
    cache::{CacheStore, InvalidationRegistry},
    config::{AppConfig, CacheConfig},
    dedup::{Attachment, DedupMap, InflightGuard, InflightWaiter, Outcome},
    metrics::{MetricsCollector, MetricsSnapshot},
    types::{ChainId, ContractCall, Priority, Request, RequestKey, Response, ResponseSource},
    upstream::ClientSet,
};

struct ManagerInner {
    cache: CacheStore,
    cache_config: CacheConfig,
    max_batch_size: usize,
    invalidation: InvalidationRegistry,
    dedup: DedupMap,
    scheduler: BatchScheduler,
    client_set: Arc<ClientSet>,
    metrics: Arc<MetricsCollector>,
}

/// A leader slot handed to `execute_batch`'s multicall task.
struct BatchMember {
    guard: InflightGuard,
    epoch: u64,
    call: ContractCall,
    priority: Priority,
    cache_duration_ms: Option<u64>,
}

/// How a cache miss is served.
enum Claim {
    /// Stored by a leader that settled between the miss and the attach.
    Cached(Value),
    Follower(InflightWaiter),
    /// The caller executes; `u64` is the cache epoch observed before attaching.
    Leader(InflightGuard, u64),
}

/// Public entry point: cache → dedup → immediate or batched execution.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct RequestManager {
    inner: Arc<ManagerInner>,
}

impl RequestManager {
    #[must_use]
    pub fn new(config: &AppConfig, client_set: Arc<ClientSet>, metrics: Arc<MetricsCollector>) -> Self {
        let executor: Arc<dyn MulticallExecutor> = Arc::clone(&client_set) as Arc<dyn MulticallExecutor>;
        let scheduler = BatchScheduler::new(config.batching.clone(), executor, Arc::clone(&metrics));
        let capacity = NonZeroUsize::new(config.cache.max_entries).unwrap_or(NonZeroUsize::MIN);

        Self {
            inner: Arc::new(ManagerInner {
                cache: CacheStore::new(capacity),
                cache_config: config.cache.clone(),
                max_batch_size: config.batching.max_batch_size.max(1),
                invalidation: InvalidationRegistry::from_config(&config.invalidation),
                dedup: DedupMap::new(),
                scheduler,
                client_set,
                metrics,
            }),
        }
    }

    #[must_use]
    pub fn client_set(&self) -> &Arc<ClientSet> {
        &self.inner.client_set
    }

    #[must_use]
    pub fn metrics_collector(&self) -> &Arc<MetricsCollector> {
        &self.inner.metrics
    }

    /// Serves one request. Never fails: errors are carried in the [`Response`].
    pub async fn execute(&self, request: Request) -> Response {
        let inner = &self.inner;
        let id = request.id.clone();
        let context = request.context_label().to_string();
        inner.metrics.record_request(&context);

        let key = request.request_key();
        if let Some(value) = inner.cache.get(&key) {
            tracing::trace!(cache_key = %key, "cache hit");
            inner.metrics.record_cache_hit(&context);
            return Response::success(id, value, ResponseSource::Cache);
        }
        tracing::trace!(cache_key = %key, "cache miss");

        let waiter = match inner.claim(&key) {
            Claim::Cached(value) => {
                inner.metrics.record_cache_hit(&context);
                return Response::success(id, value, ResponseSource::Cache);
            }
            Claim::Follower(waiter) => {
                inner.metrics.record_deduplicated(&context);
                if !request.priority.is_batched() {
                    waiter.expedite();
                }
                waiter
            }
            Claim::Leader(guard, epoch) => {
                if request.priority.is_batched() {
                    inner.metrics.record_batched(&context);
                }
                let waiter = guard.subscribe();
                let leader = Arc::clone(inner);
                tokio::spawn(async move { leader.lead(guard, request, epoch).await });
                waiter
            }
        };

        self.respond(id, &context, waiter).await
    }

    /// Serves many requests at once with one multicall per network (chunked by `max_batch_size`).
    ///
    /// Results are keyed by request id; duplicate ids keep the last response.
    pub async fn execute_batch(&self, requests: Vec<Request>) -> HashMap<String, Response> {
        let inner = &self.inner;
        let mut responses = HashMap::with_capacity(requests.len());
        let mut waiters: Vec<(String, String, InflightWaiter)> = Vec::new();
        let mut per_chain: BTreeMap<ChainId, Vec<BatchMember>> = BTreeMap::new();

        for request in requests {
            let context = request.context_label().to_string();
            inner.metrics.record_request(&context);

            let key = request.request_key();
            if let Some(value) = inner.cache.get(&key) {
                inner.metrics.record_cache_hit(&context);
                responses.insert(request.id.clone(), Response::success(request.id, value, ResponseSource::Cache));
                continue;
            }

            match inner.claim(&key) {
                Claim::Cached(value) => {
                    inner.metrics.record_cache_hit(&context);
                    let response = Response::success(request.id.clone(), value, ResponseSource::Cache);
                    responses.insert(request.id, response);
                }
                Claim::Follower(waiter) => {
                    inner.metrics.record_deduplicated(&context);
                    waiters.push((request.id, context, waiter));
                }
                Claim::Leader(guard, epoch) => {
                    inner.metrics.record_batched(&context);
                    waiters.push((request.id, context, guard.subscribe()));
                    per_chain.entry(request.chain_id).or_default().push(BatchMember {
                        guard,
                        epoch,
                        call: request.call,
                        priority: request.priority,
                        cache_duration_ms: request.cache_duration_ms,
                    });
                }
            }
        }

        for (chain_id, mut members) in per_chain {
            while !members.is_empty() {
                let rest = members.split_off(members.len().min(inner.max_batch_size));
                let chunk = std::mem::replace(&mut members, rest);
                let leader = Arc::clone(inner);
                tokio::spawn(async move { leader.multicall_chunk(chain_id, chunk).await });
            }
        }

        let settled = join_all(waiters.into_iter().map(|(id, context, waiter)| async move {
            (id.clone(), self.respond(id, &context, waiter).await)
        }))
        .await;
        responses.extend(settled);
        responses
    }

    /// Evicts every entry matching a named pattern, narrowed by `context_hint` when given.
    ///
    /// Returns the number of evicted entries; unknown pattern names evict nothing.
    pub fn invalidate(&self, pattern: &str, context_hint: Option<&str>) -> usize {
        self.inner.invalidation.apply(&self.inner.cache, pattern, context_hint)
    }

    /// Evicts one exact key.
    pub fn invalidate_key(&self, key: &RequestKey) -> bool {
        self.inner.cache.invalidate_key(key)
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Drops expired cache entries. Returns how many were removed.
    pub fn purge_expired_cache(&self) -> usize {
        self.inner.cache.purge_expired()
    }

    /// Spawns the periodic expired-entry sweep, stopped by the shutdown signal.
    #[must_use]
    pub fn start_cache_sweep(&self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let period = inner.cache_config.sweep_interval();

        tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticks.tick() => {
                        let removed = inner.cache.purge_expired();
                        tracing::debug!(removed = removed, stored = inner.cache.stored(), "cache sweep complete");
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("cache sweep shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Flushes queued batches without waiting for their timers. Returns the number of flushed calls.
    pub async fn flush_batches(&self) -> usize {
        self.inner.scheduler.flush_all().await
    }

    #[must_use]
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        MetricsSnapshot {
            cache_size: inner.cache.len(),
            in_flight_requests: inner.dedup.in_flight(),
            queued_batch_requests: inner.scheduler.queued(),
            flushing_batches: inner.scheduler.flushing(),
            contexts: inner.metrics.context_stats(),
        }
    }

    #[must_use]
    pub fn get_health_status(&self) -> HealthStatus {
        HealthStatus::collect(&self.inner.client_set)
    }

    async fn respond(&self, id: String, context: &str, waiter: InflightWaiter) -> Response {
        let Outcome { result, source } = waiter.wait().await;
        match result {
            Ok(value) => Response::success(id, value, source),
            Err(error) => {
                tracing::trace!(request_id = %id, error = %error, "request failed");
                self.inner.metrics.record_error(context);
                Response::failure(id, error, source)
            }
        }
    }
}

impl ManagerInner {
    /// Attaches to the pending map, re-checking the cache once leadership is won.
    fn claim(&self, key: &RequestKey) -> Claim {
        let epoch = self.cache.epoch();
        match self.dedup.attach(key) {
            Attachment::Follower(waiter) => Claim::Follower(waiter),
            Attachment::Leader(guard) => match self.cache.get(key) {
                Some(value) => {
                    tracing::trace!(cache_key = %key, "cache filled before attach");
                    guard.settle(Outcome { result: Ok(value.clone()), source: ResponseSource::Cache });
                    Claim::Cached(value)
                }
                None => Claim::Leader(guard, epoch),
            },
        }
    }

    async fn lead(&self, guard: InflightGuard, request: Request, epoch: u64) {
        let Request { chain_id, call, priority, cache_duration_ms, page_context, .. } = request;

        let (result, source) = if priority.is_batched() {
            self.batched(&guard, chain_id, page_context.as_deref(), call).await
        } else {
            (self.client_set.call(chain_id, &call).await, ResponseSource::Single)
        };

        if let Ok(value) = &result {
            let ttl = self.cache_config.ttl_for(priority, cache_duration_ms);
            self.cache.set_unless_invalidated(guard.key().clone(), value.clone(), ttl, epoch);
        }
        guard.settle(Outcome { result, source });
    }

    /// Waits for the batch, unless a follower expedites the call while it is still queued.
    async fn batched(
        &self,
        guard: &InflightGuard,
        chain_id: ChainId,
        context: Option<&str>,
        call: ContractCall,
    ) -> (Result<Value, RequestError>, ResponseSource) {
        let QueuedCall { ticket, mut reply } = self.scheduler.enqueue(chain_id, context, call.clone());

        tokio::select! {
            biased;
            settled = &mut reply => {
                return (settled.unwrap_or(Err(RequestError::Abandoned)), ResponseSource::Batch);
            }
            () = guard.expedited() => {}
        }

        if self.scheduler.withdraw(&ticket) {
            tracing::debug!(cache_key = %guard.key(), batch_key = %ticket.key, "batched call expedited");
            (self.client_set.call(chain_id, &call).await, ResponseSource::Single)
        } else {
            // already flushing; the multicall is on the wire
            (reply.await.unwrap_or(Err(RequestError::Abandoned)), ResponseSource::Batch)
        }
    }

    async fn multicall_chunk(&self, chain_id: ChainId, members: Vec<BatchMember>) {
        let calls: Vec<ContractCall> = members.iter().map(|m| m.call.clone()).collect();
        self.metrics.record_batch_flush("explicit", calls.len());

        match self.client_set.execute_multicall(chain_id, &calls).await {
            Ok(results) if results.len() == members.len() => {
                for (member, result) in members.into_iter().zip(results) {
                    let result = result.map_err(RequestError::from);
                    if let Ok(value) = &result {
                        let ttl = self.cache_config.ttl_for(member.priority, member.cache_duration_ms);
                        let key = member.guard.key().clone();
                        self.cache.set_unless_invalidated(key, value.clone(), ttl, member.epoch);
                    }
                    member.guard.settle(Outcome { result, source: ResponseSource::Batch });
                }
            }
            Ok(results) => {
                let reason = format!("expected {} results, got {}", members.len(), results.len());
                tracing::warn!(chain_id = chain_id, reason = %reason, "multicall result count mismatch");
                for member in members {
                    member.guard.settle(Outcome {
                        result: Err(RequestError::BatchFailed(reason.clone())),
                        source: ResponseSource::Batch,
                    });
                }
            }
            Err(error) => {
                tracing::warn!(chain_id = chain_id, size = calls.len(), error = %error, "multicall failed");
                for member in members {
                    member
                        .guard
                        .settle(Outcome { result: Err(error.clone()), source: ResponseSource::Batch });
                }
            }
        }
    }
}
