//! Response cache with per-entry TTL, LRU bounds and pattern invalidation.
//!
//! ```text
//! RequestManager ──get/set──▶ CacheStore (LruCache<RequestKey, (value, stored_at, ttl)>)
//!       │                          ▲
//!       └──invalidate(pattern)──▶ InvalidationRegistry ── substrings ──┘
//! ```
//!
//! TTLs come from the caller's priority (`high` 10s, `medium` 30s, `low` 60s by default)
//! unless the request carries an explicit duration.

pub mod invalidation;
pub mod store;

pub use invalidation::InvalidationRegistry;
pub use store::CacheStore;
