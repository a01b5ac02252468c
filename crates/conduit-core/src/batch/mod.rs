//! Debounced multicall batching.
//!
//! Per [`BatchKey`] the scheduler runs `EMPTY → ACCUMULATING → FLUSHING → EMPTY`:
//!
//! ```text
//!            enqueue (first member)          len == max_batch_size
//!   EMPTY ─────────────────────────▶ ACCUMULATING ───────────────────┐
//!     ▲         starts the timer          │  max_wait elapsed        │
//!     │                                   ▼                          ▼
//!     └──────── every member replied ── FLUSHING ◀───────────────────┘
//! ```
//!
//! A flush takes the members out of the queue, so requests arriving during a flush
//! start a fresh queue with its own timer. Each member receives its own per-call
//! result; a whole-multicall failure is delivered to every member.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::{sync::oneshot, task::JoinHandle};

use crate::{
    config::BatchConfig,
    metrics::MetricsCollector,
    orchestrator::RequestError,
    types::{ChainId, ContractCall, DEFAULT_CONTEXT},
    upstream::MulticallResult,
};

/// Executes one multicall on a network.
#[async_trait]
pub trait MulticallExecutor: Send + Sync {
    async fn execute_multicall(
        &self,
        chain_id: ChainId,
        calls: &[ContractCall],
    ) -> Result<MulticallResult, RequestError>;
}

/// Queue identity: network plus page context (or `"default"` when grouping is off).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchKey {
    pub chain_id: ChainId,
    pub context: String,
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain_id, self.context)
    }
}

type Reply = oneshot::Sender<Result<Value, RequestError>>;

struct PendingCall {
    id: u64,
    call: ContractCall,
    reply: Reply,
}

/// Identifies one queued call so it can be withdrawn before its queue flushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTicket {
    pub key: BatchKey,
    id: u64,
}

/// A call accepted by [`BatchScheduler::enqueue`].
pub struct QueuedCall {
    pub ticket: BatchTicket,
    pub reply: oneshot::Receiver<Result<Value, RequestError>>,
}

#[derive(Default)]
struct BatchQueue {
    members: Vec<PendingCall>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

struct SchedulerInner {
    config: BatchConfig,
    executor: Arc<dyn MulticallExecutor>,
    metrics: Arc<MetricsCollector>,
    queues: DashMap<BatchKey, BatchQueue>,
    flushing: AtomicUsize,
    next_generation: AtomicU64,
    next_ticket: AtomicU64,
}

/// Accumulates low and medium priority calls into per-key queues and flushes them as multicalls.
#[derive(Clone)]
pub struct BatchScheduler {
    inner: Arc<SchedulerInner>,
}

impl BatchScheduler {
    #[must_use]
    pub fn new(
        config: BatchConfig,
        executor: Arc<dyn MulticallExecutor>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                executor,
                metrics,
                queues: DashMap::new(),
                flushing: AtomicUsize::new(0),
                next_generation: AtomicU64::new(1),
                next_ticket: AtomicU64::new(1),
            }),
        }
    }

    /// Batch key for a call, honouring `group_by_context`.
    #[must_use]
    pub fn batch_key(&self, chain_id: ChainId, context: Option<&str>) -> BatchKey {
        let context = if self.inner.config.group_by_context {
            context.unwrap_or(DEFAULT_CONTEXT)
        } else {
            DEFAULT_CONTEXT
        };
        BatchKey { chain_id, context: context.to_string() }
    }

    /// Adds a call to its queue and returns its ticket plus the receiver of its individual result.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, chain_id: ChainId, context: Option<&str>, call: ContractCall) -> QueuedCall {
        let key = self.batch_key(chain_id, context);
        let (reply, rx) = oneshot::channel();
        let id = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
        let ticket = BatchTicket { key: key.clone(), id };

        let full_batch = {
            let mut queue = self.inner.queues.entry(key.clone()).or_default();
            queue.members.push(PendingCall { id, call, reply });
            tracing::trace!(batch_key = %key, queued = queue.members.len(), "request queued for batch");

            if queue.members.len() >= self.inner.config.max_batch_size {
                if let Some(timer) = queue.timer.take() {
                    timer.abort();
                }
                Some(std::mem::take(&mut queue.members))
            } else {
                if queue.timer.is_none() {
                    let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                    queue.generation = generation;
                    queue.timer = Some(self.spawn_timer(key.clone(), generation));
                }
                None
            }
        };

        if let Some(members) = full_batch {
            self.inner.queues.remove_if(&key, |_, q| q.members.is_empty() && q.timer.is_none());
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.execute(key, members, "size").await });
        }

        QueuedCall { ticket, reply: rx }
    }

    /// Takes a call back out of its queue if the queue has not flushed yet.
    ///
    /// Returns `false` once the call is part of a running multicall. A queue left empty
    /// drops its timer.
    pub fn withdraw(&self, ticket: &BatchTicket) -> bool {
        let withdrawn = match self.inner.queues.get_mut(&ticket.key) {
            Some(mut queue) => match queue.members.iter().position(|m| m.id == ticket.id) {
                Some(index) => {
                    queue.members.remove(index);
                    if queue.members.is_empty() {
                        if let Some(timer) = queue.timer.take() {
                            timer.abort();
                        }
                    }
                    true
                }
                None => false,
            },
            None => false,
        };

        if withdrawn {
            self.inner.queues.remove_if(&ticket.key, |_, q| q.members.is_empty());
            tracing::trace!(batch_key = %ticket.key, "call withdrawn from batch");
        }
        withdrawn
    }

    /// Enqueues and awaits the call's result.
    pub async fn submit(
        &self,
        chain_id: ChainId,
        context: Option<&str>,
        call: ContractCall,
    ) -> Result<Value, RequestError> {
        self.enqueue(chain_id, context, call).reply.await.unwrap_or(Err(RequestError::Abandoned))
    }

    fn spawn_timer(&self, key: BatchKey, generation: u64) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let wait = inner.config.max_wait();
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let members = inner
                .queues
                .remove_if(&key, |_, q| q.generation == generation)
                .map(|(_, queue)| queue.members)
                .unwrap_or_default();
            if !members.is_empty() {
                inner.execute(key, members, "timer").await;
            }
        })
    }

    /// Flushes every queue now, without waiting for timers. Returns the number of flushed members.
    pub async fn flush_all(&self) -> usize {
        let keys: Vec<BatchKey> = self.inner.queues.iter().map(|entry| entry.key().clone()).collect();
        let mut flushes = Vec::new();
        for key in keys {
            if let Some((_, queue)) = self.inner.queues.remove(&key) {
                if let Some(timer) = queue.timer {
                    timer.abort();
                }
                if !queue.members.is_empty() {
                    flushes.push((key, queue.members));
                }
            }
        }

        let total = flushes.iter().map(|(_, members)| members.len()).sum();
        futures::future::join_all(
            flushes.into_iter().map(|(key, members)| self.inner.execute(key, members, "shutdown")),
        )
        .await;
        total
    }

    /// Calls waiting in queues.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.queues.iter().map(|entry| entry.members.len()).sum()
    }

    /// Multicalls currently executing.
    #[must_use]
    pub fn flushing(&self) -> usize {
        self.inner.flushing.load(Ordering::Relaxed)
    }
}

impl SchedulerInner {
    async fn execute(&self, key: BatchKey, members: Vec<PendingCall>, reason: &'static str) {
        self.flushing.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_batch_flush(reason, members.len());

        let (calls, replies): (Vec<ContractCall>, Vec<Reply>) =
            members.into_iter().map(|member| (member.call, member.reply)).unzip();

        match self.executor.execute_multicall(key.chain_id, &calls).await {
            Ok(results) if results.len() == replies.len() => {
                for (reply, result) in replies.into_iter().zip(results) {
                    let _ = reply.send(result.map_err(RequestError::from));
                }
            }
            Ok(results) => {
                tracing::warn!(
                    batch_key = %key,
                    expected = replies.len(),
                    received = results.len(),
                    "multicall result count mismatch"
                );
                let reason = format!("expected {} results, got {}", replies.len(), results.len());
                for reply in replies {
                    let _ = reply.send(Err(RequestError::BatchFailed(reason.clone())));
                }
            }
            Err(e) => {
                tracing::warn!(batch_key = %key, size = calls.len(), error = %e, "multicall failed");
                for reply in replies {
                    let _ = reply.send(Err(e.clone()));
                }
            }
        }

        self.flushing.fetch_sub(1, Ordering::Relaxed);
    }
}
