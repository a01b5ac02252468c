//! Upstream RPC providers: transports, health tracking, ranking and failover.
//!
//! # Selection
//!
//! ```text
//! ProviderPool::call
//!     │
//!     ├─ ranked() = healthy endpoints, ascending avg latency, tier tie-break
//!     │     │
//!     │     ├─ Ok                       → return
//!     │     ├─ call error (revert, ...) → return as is
//!     │     └─ transport error          → next endpoint
//!     │
//!     └─ none healthy / all failed → FallbackClient (weighted, all transports)
//! ```
//!
//! [`HealthMonitor`] probes every endpoint on an interval; real requests update the
//! same health record through [`ProviderEndpoint`].

pub mod client_set;
pub mod endpoint;
pub mod errors;
pub mod fallback;
pub mod health;
pub mod http_client;
pub mod pool;
pub mod transport;

pub use client_set::ClientSet;
pub use endpoint::{HealthHistoryEntry, ProviderEndpoint, ProviderHealth};
pub use errors::{ProviderError, RpcErrorCategory};
pub use fallback::FallbackClient;
pub use health::HealthMonitor;
pub use http_client::HttpClient;
pub use pool::ProviderPool;
pub use transport::{HttpTransport, MulticallResult, Transport};
