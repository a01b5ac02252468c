//! # Conduit Core
//!
//! Read-side RPC orchestration for applications that make many on-chain view calls
//! across several networks.
//!
//! - **[`cache`]**: TTL-bounded LRU result cache with named invalidation patterns.
//!
//! - **[`dedup`]**: in-flight request coalescing. Concurrent identical reads share one
//!   upstream execution.
//!
//! - **[`batch`]**: debounced multicall batching keyed by network and page context.
//!
//! - **[`upstream`]**: per-network provider pools with health scoring, rate limiting,
//!   failover, and a weighted fallback client.
//!
//! - **[`orchestrator`]**: the [`RequestManager`] façade tying the above together.
//!
//! - **[`metrics`]**: per-context counters and Prometheus export.
//!
//! - **[`runtime`]**: composition and graceful shutdown of the components.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        RequestManager                        │
//! │  ┌────────────┐  ┌────────────┐  ┌──────────────────────┐    │
//! │  │ CacheStore │  │  DedupMap  │  │   BatchScheduler     │    │
//! │  └────────────┘  └────────────┘  └──────────┬───────────┘    │
//! │                                             │ multicall      │
//! │  ┌──────────────────────────────────────────▼───────────┐    │
//! │  │                      ClientSet                       │    │
//! │  │  ProviderPool(chain) ─▶ ProviderEndpoint* ─▶ Fallback│    │
//! │  └──────────────────────────────────────────────────────┘    │
//! │        ▲                                                     │
//! │  HealthMonitor (eth_blockNumber probes)    MetricsCollector  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Request Flow
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌─────────────┐
//! │ Cache Check │ ─── Hit ──► Response{source: cache}
//! └──────┬──────┘
//!        │ Miss
//!        ▼
//! ┌─────────────┐
//! │ Dedup Attach│ ─── Follower ──► await leader ──► Response
//! └──────┬──────┘
//!        │ Leader
//!        ▼
//!   priority == high ?
//!    │ yes          │ no
//!    ▼              ▼
//! ClientSet::call  BatchScheduler ──► multicall
//!    │              │
//!    └──────┬───────┘
//!           ▼
//!   cache insert on success, settle followers
//! ```

pub mod batch;
pub mod cache;
pub mod config;
pub mod dedup;
pub mod metrics;
pub mod orchestrator;
pub mod runtime;
pub mod types;
pub mod upstream;
pub mod utils;

pub use config::AppConfig;
pub use orchestrator::{RequestError, RequestManager};
pub use runtime::ConduitRuntime;
pub use types::{ContractCall, Priority, Request, Response, ResponseSource};
