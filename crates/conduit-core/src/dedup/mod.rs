//! In-flight request deduplication.
//!
//! At most one execution per [`RequestKey`] runs at a time. The first caller becomes the
//! leader and receives an [`InflightGuard`]; everyone arriving while it runs gets an
//! [`InflightWaiter`] on the same `watch` channel and observes the leader's outcome.
//!
//! ```text
//! attach(key) ──vacant──▶ Leader(InflightGuard) ──settle(outcome)──┐
//!      │                                                          │ 1. remove entry
//!      └──occupied──▶ Follower(InflightWaiter) ◀── 2. broadcast ───┘
//! ```
//!
//! A guard dropped without settling still removes its entry and wakes waiters with
//! [`RequestError::Abandoned`], so a key can never stay blocked.
//!
//! A follower that cannot afford to wait for a debounced leader calls
//! [`InflightWaiter::expedite`]; the leader observes it through [`InflightGuard::expedited`].

use dashmap::{mapref::entry::Entry, DashMap};
use serde_json::Value;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{watch, Notify};

use crate::{
    orchestrator::RequestError,
    types::{RequestKey, ResponseSource},
};

/// Settled result of one execution, shared by the leader and all followers.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub result: Result<Value, RequestError>,
    pub source: ResponseSource,
}

#[derive(Clone)]
struct Slot {
    generation: u64,
    rx: watch::Receiver<Option<Outcome>>,
    expedite: Arc<Notify>,
}

/// Pending-request map: request key → broadcast of the eventual outcome.
#[derive(Default)]
pub struct DedupMap {
    inflight: Arc<DashMap<RequestKey, Slot>>,
    next_generation: AtomicU64,
}

/// Result of [`DedupMap::attach`].
pub enum Attachment {
    /// No execution was running; the caller must execute and settle.
    Leader(InflightGuard),
    /// An execution is already running; await it.
    Follower(InflightWaiter),
}

impl DedupMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically joins the running execution for `key`, or registers a new one.
    #[must_use]
    pub fn attach(&self, key: &RequestKey) -> Attachment {
        match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                tracing::trace!(cache_key = %key, "attached to in-flight request");
                let slot = entry.get();
                Attachment::Follower(InflightWaiter {
                    rx: slot.rx.clone(),
                    expedite: Some(Arc::clone(&slot.expedite)),
                })
            }
            Entry::Vacant(entry) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = watch::channel(None);
                let expedite = Arc::new(Notify::new());
                entry.insert(Slot { generation, rx, expedite: Arc::clone(&expedite) });
                Attachment::Leader(InflightGuard {
                    key: key.clone(),
                    generation,
                    tx: Some(tx),
                    expedite,
                    inflight: Arc::clone(&self.inflight),
                })
            }
        }
    }

    /// Number of keys currently executing.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    #[must_use]
    pub fn is_in_flight(&self, key: &RequestKey) -> bool {
        self.inflight.contains_key(key)
    }
}

/// Leader handle for one in-flight execution.
pub struct InflightGuard {
    key: RequestKey,
    generation: u64,
    tx: Option<watch::Sender<Option<Outcome>>>,
    expedite: Arc<Notify>,
    inflight: Arc<DashMap<RequestKey, Slot>>,
}

impl InflightGuard {
    #[must_use]
    pub fn key(&self) -> &RequestKey {
        &self.key
    }

    /// Removes the pending entry, then delivers `outcome` to every waiter.
    pub fn settle(mut self, outcome: Outcome) {
        self.finish(outcome);
    }

    /// Resolves once some follower asked for this execution to be expedited.
    ///
    /// A request made before the leader starts listening is not lost.
    pub async fn expedited(&self) {
        self.expedite.notified().await;
    }

    /// Waiter on this guard's own outcome, for leaders that hand execution to another task.
    #[must_use]
    pub fn subscribe(&self) -> InflightWaiter {
        match &self.tx {
            Some(tx) => InflightWaiter { rx: tx.subscribe(), expedite: None },
            None => {
                let (_, rx) = watch::channel(Some(Outcome {
                    result: Err(RequestError::Abandoned),
                    source: ResponseSource::Single,
                }));
                InflightWaiter { rx, expedite: None }
            }
        }
    }

    fn finish(&mut self, outcome: Outcome) {
        let Some(tx) = self.tx.take() else { return };
        let generation = self.generation;
        self.inflight.remove_if(&self.key, |_, slot| slot.generation == generation);
        tx.send_replace(Some(outcome));
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::debug!(cache_key = %self.key, "in-flight request dropped before settling");
            self.finish(Outcome { result: Err(RequestError::Abandoned), source: ResponseSource::Single });
        }
    }
}

/// Follower handle: resolves to the leader's outcome.
pub struct InflightWaiter {
    rx: watch::Receiver<Option<Outcome>>,
    expedite: Option<Arc<Notify>>,
}

impl InflightWaiter {
    /// Asks the leader to stop waiting on a batch window. No-op for the leader's own waiter.
    pub fn expedite(&self) {
        if let Some(expedite) = &self.expedite {
            expedite.notify_one();
        }
    }

    pub async fn wait(mut self) -> Outcome {
        let settled = self.rx.wait_for(Option::is_some).await.map(|slot| slot.clone());
        match settled {
            Ok(Some(outcome)) => outcome,
            _ => Outcome { result: Err(RequestError::Abandoned), source: ResponseSource::Single },
        }
    }
}
