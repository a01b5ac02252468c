//! Integration tests for conduit-core.
//!
//! - `dedup_tests`: concurrent identical reads collapse into one network call
//! - `cache_ttl_tests`: TTL boundaries and per-priority TTL selection
//! - `priority_routing_tests`: high priority bypasses the debounce window
//! - `batching_tests`: batch grouping, size-triggered flush, `execute_batch` chunking
//! - `partial_failure_tests`: allow-failure semantics inside a multicall
//! - `invalidation_tests`: named pattern eviction and context hints
//! - `failover_tests`: health scoring, ranked failover, rate limiting, composite fallback
//! - `idempotence_tests`: metrics and health snapshots are pure reads
//! - `http_transport_tests`: the JSON-RPC transport against a mockito server
//! - `runtime_tests`: builder validation, background tasks, graceful shutdown
//! - `mock_infrastructure`: reusable mocks
//!
//! ```bash
//! cargo test --package tests
//! ```

#[cfg(test)]
mod dedup_tests;



#[cfg(test)]
mod batching_tests;


#[cfg(test)]
mod invalidation_tests;

#[cfg(test)]
mod failover_tests;


#[cfg(test)]
mod http_transport_tests;
