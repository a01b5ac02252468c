use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tokio::time::Instant;

use crate::{
    config::{ProviderConfig, ProviderTier},
    types::ContractCall,
    upstream::{
        transport::{MulticallResult, Transport},
        ProviderError,
    },
};

const HEALTH_HISTORY_SIZE: usize = 32;

/// Weight of the previous average in the latency EWMA.
const LATENCY_DECAY: f64 = 0.7;

/// Mutable health state of one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub is_healthy: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub avg_latency_ms: f64,
    pub request_count: u64,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            is_healthy: true,
            last_checked_at: None,
            error_count: 0,
            avg_latency_ms: 0.0,
            request_count: 0,
        }
    }
}

/// Entry in the probe history log.
#[derive(Debug, Clone, Serialize)]
pub struct HealthHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub healthy: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// Token bucket refilled continuously at `capacity` tokens per minute.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn per_minute(limit: u32) -> Self {
        let capacity = f64::from(limit);
        Self { tokens: capacity, capacity, refill_per_sec: capacity / 60.0, last_refill: Instant::now() }
    }

    fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            self.last_refill = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// A configured provider: its transport plus health, latency and rate-limit bookkeeping.
///
/// Every real request and every probe goes through here so the health table reflects
/// both. Rate-limited attempts never reach the transport and never touch health.
pub struct ProviderEndpoint {
    config: ProviderConfig,
    transport: Arc<dyn Transport>,
    health: RwLock<ProviderHealth>,
    rate_limiter: Mutex<TokenBucket>,
    health_history: Mutex<VecDeque<HealthHistoryEntry>>,
    unhealthy_threshold: u32,
}

impl ProviderEndpoint {
    #[must_use]
    pub fn new(config: ProviderConfig, transport: Arc<dyn Transport>, unhealthy_threshold: u32) -> Self {
        let rate_limiter = Mutex::new(TokenBucket::per_minute(config.rate_limit_per_minute));
        Self {
            config,
            transport,
            health: RwLock::new(ProviderHealth::default()),
            rate_limiter,
            health_history: Mutex::new(VecDeque::with_capacity(HEALTH_HISTORY_SIZE)),
            unhealthy_threshold,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    #[must_use]
    pub fn tier(&self) -> ProviderTier {
        self.config.tier
    }

    /// The raw transport, bypassing health and rate-limit bookkeeping.
    #[must_use]
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.health.read().is_healthy
    }

    #[must_use]
    pub fn avg_latency_ms(&self) -> f64 {
        self.health.read().avg_latency_ms
    }

    #[must_use]
    pub fn health(&self) -> ProviderHealth {
        self.health.read().clone()
    }

    /// Most recent probe outcomes, oldest first.
    #[must_use]
    pub fn health_history(&self) -> Vec<HealthHistoryEntry> {
        self.health_history.lock().iter().cloned().collect()
    }

    /// Marks a success: healthy, one error forgiven, latency folded into the EWMA.
    pub fn record_success(&self, latency_ms: u64) {
        let mut health = self.health.write();
        let was_healthy = health.is_healthy;

        health.is_healthy = true;
        health.error_count = health.error_count.saturating_sub(1);
        #[allow(clippy::cast_precision_loss)]
        let sample = latency_ms as f64;
        health.avg_latency_ms = if health.avg_latency_ms == 0.0 {
            sample
        } else {
            health.avg_latency_ms * LATENCY_DECAY + sample * (1.0 - LATENCY_DECAY)
        };
        drop(health);

        if !was_healthy {
            tracing::info!(provider = %self.config.name, "provider recovered");
        }
    }

    /// Counts a failure; the provider turns unhealthy once errors exceed the threshold.
    pub fn record_failure(&self) {
        let mut health = self.health.write();
        health.error_count = health.error_count.saturating_add(1);
        let error_count = health.error_count;
        let became_unhealthy = health.is_healthy && error_count > self.unhealthy_threshold;
        if became_unhealthy {
            health.is_healthy = false;
        }
        drop(health);

        if became_unhealthy {
            tracing::warn!(
                provider = %self.config.name,
                error_count = error_count,
                threshold = self.unhealthy_threshold,
                "provider marked unhealthy"
            );
        }
    }

    fn record_outcome<T>(&self, result: &Result<T, ProviderError>, started: Instant) {
        #[allow(clippy::cast_possible_truncation)]
        let latency_ms = started.elapsed().as_millis() as u64;
        let outcome = match result {
            Ok(_) => {
                self.record_success(latency_ms);
                "success"
            }
            Err(e) if e.should_penalize_provider() => {
                self.record_failure();
                "failure"
            }
            Err(_) => "call_error",
        };
        metrics::counter!(
            "conduit_provider_requests_total",
            "provider" => self.config.name.clone(),
            "outcome" => outcome
        )
        .increment(1);
    }

    fn acquire_permit(&self) -> Result<(), ProviderError> {
        if self.rate_limiter.lock().try_acquire() {
            Ok(())
        } else {
            tracing::debug!(provider = %self.config.name, "provider rate limit reached");
            metrics::counter!(
                "conduit_provider_requests_total",
                "provider" => self.config.name.clone(),
                "outcome" => "rate_limited"
            )
            .increment(1);
            Err(ProviderError::RateLimited(format!(
                "{} exceeded {} requests per minute",
                self.config.name, self.config.rate_limit_per_minute
            )))
        }
    }

    /// Runs one liveness probe and records it in health and history.
    ///
    /// Returns whether the probe succeeded.
    pub async fn probe(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        let result = match tokio::time::timeout(timeout, self.transport.block_number()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        };
        #[allow(clippy::cast_possible_truncation)]
        let latency_ms = started.elapsed().as_millis() as u64;

        let entry = match &result {
            Ok(block) => {
                self.record_success(latency_ms);
                tracing::debug!(
                    provider = %self.config.name,
                    latency_ms = latency_ms,
                    block_number = block,
                    "health check passed for provider"
                );
                HealthHistoryEntry { timestamp: Utc::now(), healthy: true, latency_ms: Some(latency_ms), error: None }
            }
            Err(e) => {
                self.record_failure();
                tracing::warn!(provider = %self.config.name, error = %e, "health check failed for provider");
                HealthHistoryEntry { timestamp: Utc::now(), healthy: false, latency_ms: None, error: Some(e.to_string()) }
            }
        };

        self.health.write().last_checked_at = Some(entry.timestamp);

        let mut history = self.health_history.lock();
        if history.len() >= HEALTH_HISTORY_SIZE {
            history.pop_front();
        }
        history.push_back(entry);

        result.is_ok()
    }
}

#[async_trait]
impl Transport for ProviderEndpoint {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn call(&self, call: &ContractCall) -> Result<Value, ProviderError> {
        self.acquire_permit()?;
        self.health.write().request_count += 1;
        let started = Instant::now();
        let result = self.transport.call(call).await;
        self.record_outcome(&result, started);
        result
    }

    async fn multicall(&self, calls: &[ContractCall]) -> Result<MulticallResult, ProviderError> {
        self.acquire_permit()?;
        self.health.write().request_count += 1;
        let started = Instant::now();
        let result = self.transport.multicall(calls).await;
        self.record_outcome(&result, started);
        result
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        self.transport.block_number().await
    }
}
