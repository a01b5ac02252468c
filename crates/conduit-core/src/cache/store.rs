use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::{collections::VecDeque, num::NonZeroUsize, time::Duration};
use tokio::time::Instant;

use crate::types::RequestKey;

/// Invalidations remembered for writers that started before them.
const EVICTION_LOG_LEN: usize = 64;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    /// Valid iff `now - stored_at <= ttl`.
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) <= self.ttl
    }
}

/// What one invalidation removed.
#[derive(Debug, Clone)]
enum Eviction {
    Matching { substrings: Vec<String>, hint: Option<String> },
    Key(RequestKey),
    All,
}

impl Eviction {
    fn covers(&self, key: &RequestKey) -> bool {
        match self {
            Self::Matching { substrings, hint } => key_matches(key, substrings, hint.as_deref()),
            Self::Key(evicted) => evicted == key,
            Self::All => true,
        }
    }
}

fn key_matches(key: &RequestKey, substrings: &[String], hint: Option<&str>) -> bool {
    let key = key.as_str();
    substrings.iter().any(|s| key.contains(s.as_str())) && hint.map_or(true, |h| key.contains(h))
}

struct StoreState {
    entries: LruCache<RequestKey, CacheEntry>,
    epoch: u64,
    evictions: VecDeque<(u64, Eviction)>,
}

impl StoreState {
    fn record(&mut self, eviction: Eviction) {
        self.epoch += 1;
        self.evictions.push_back((self.epoch, eviction));
        if self.evictions.len() > EVICTION_LOG_LEN {
            self.evictions.pop_front();
        }
    }

    /// Whether an invalidation after `since` covers `key`. Unknown history counts as covered.
    fn invalidated_since(&self, key: &RequestKey, since: u64) -> bool {
        if self.epoch == since {
            return false;
        }
        match self.evictions.front() {
            Some((oldest, _)) if *oldest <= since + 1 => {}
            _ => return true,
        }
        self.evictions.iter().any(|(epoch, eviction)| *epoch > since && eviction.covers(key))
    }
}

/// Bounded key→value store with per-entry TTL and LRU eviction.
///
/// Expired entries are treated as absent and evicted by the lookup that finds them.
/// Every invalidation advances an epoch, so a writer that read the epoch before starting
/// its fetch can tell whether its value was invalidated while in flight.
/// Critical sections are short and never span an `.await`.
pub struct CacheStore {
    state: Mutex<StoreState>,
}

impl CacheStore {
    #[must_use]
    pub fn new(max_entries: NonZeroUsize) -> Self {
        Self {
            state: Mutex::new(StoreState {
                entries: LruCache::new(max_entries),
                epoch: 0,
                evictions: VecDeque::with_capacity(EVICTION_LOG_LEN),
            }),
        }
    }

    /// Returns the cached value if present and fresh, marking it recently used.
    #[must_use]
    pub fn get(&self, key: &RequestKey) -> Option<Value> {
        let mut state = self.state.lock();
        let now = Instant::now();

        match state.entries.peek(key) {
            Some(entry) if entry.is_fresh(now) => {}
            Some(_) => {
                state.entries.pop(key);
                tracing::trace!(cache_key = %key, "cache entry expired");
                return None;
            }
            None => return None,
        }

        state.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Current invalidation epoch. Capture it before fetching a value to store later.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Stores a value, replacing any previous entry and evicting the least recently used on overflow.
    pub fn set(&self, key: RequestKey, value: Value, ttl: Duration) {
        let mut state = self.state.lock();
        Self::insert(&mut state, key, value, ttl);
    }

    /// Stores a value fetched since `epoch`, unless an invalidation covering `key` ran meanwhile.
    ///
    /// Returns whether the value was stored.
    pub fn set_unless_invalidated(&self, key: RequestKey, value: Value, ttl: Duration, epoch: u64) -> bool {
        let mut state = self.state.lock();
        if state.invalidated_since(&key, epoch) {
            tracing::trace!(cache_key = %key, "value invalidated while in flight, not cached");
            return false;
        }
        Self::insert(&mut state, key, value, ttl);
        true
    }

    fn insert(state: &mut StoreState, key: RequestKey, value: Value, ttl: Duration) {
        let entry = CacheEntry { value, stored_at: Instant::now(), ttl };
        if let Some((evicted, _)) = state.entries.push(key.clone(), entry) {
            if evicted != key {
                tracing::trace!(cache_key = %evicted, "cache entry evicted");
            }
        }
    }

    /// Removes every entry whose key contains any of `substrings`, and `hint` when given.
    ///
    /// O(store size). Returns the number of removed entries.
    pub fn invalidate(&self, substrings: &[String], hint: Option<&str>) -> usize {
        let mut state = self.state.lock();
        let doomed: Vec<RequestKey> = state
            .entries
            .iter()
            .filter(|(key, _)| key_matches(key, substrings, hint))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            state.entries.pop(key);
        }
        state.record(Eviction::Matching {
            substrings: substrings.to_vec(),
            hint: hint.map(str::to_string),
        });
        doomed.len()
    }

    /// Removes one exact key. Returns whether it was present.
    pub fn invalidate_key(&self, key: &RequestKey) -> bool {
        let mut state = self.state.lock();
        let removed = state.entries.pop(key).is_some();
        state.record(Eviction::Key(key.clone()));
        removed
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.record(Eviction::All);
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut state = self.state.lock();
        let now = Instant::now();
        let expired: Vec<RequestKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.entries.pop(key);
        }
        expired.len()
    }

    /// Number of fresh entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.state.lock().entries.iter().filter(|(_, entry)| entry.is_fresh(now)).count()
    }

    /// Number of stored entries, expired ones included until a lookup or sweep drops them.
    #[must_use]
    pub fn stored(&self) -> usize {
        self.state.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.lock().entries.cap().get()
    }
}
