//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `Default` implementations and serde default functions
//! 2. **Config file**: TOML file specified by `CONDUIT_CONFIG` env var
//! 3. **Environment variables**: `CONDUIT__*` env vars override specific fields
//!
//! # Configuration Sections
//!
//! - [`NetworkConfig`]: per-network provider lists ([`ProviderConfig`])
//! - [`BatchConfig`]: multicall batching window and size
//! - [`CacheConfig`]: cache capacity and per-priority TTLs
//! - [`HealthCheckConfig`]: probe interval and unhealthy threshold
//! - [`InvalidationConfig`]: named invalidation patterns
//! - [`LoggingConfig`]: log level and format
//! - [`HttpConfig`]: shared HTTP client concurrency
//!
//! # Example
//!
//! ```toml
//! [[networks]]
//! chain_id = 8453
//! name = "base"
//!
//! [[networks.providers]]
//! name = "alchemy"
//! url = "https://base-mainnet.example.com"
//! tier = "premium"
//! weight = 3
//! timeout_ms = 5000
//!
//! [batching]
//! max_batch_size = 50
//! max_wait_ms = 100
//! ```

use crate::types::{ChainId, Priority};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
    time::Duration,
};

/// Cost/reliability tier of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTier {
    Premium,
    #[default]
    Standard,
    Fallback,
}

impl ProviderTier {
    /// Ordering used to break latency ties: premium first.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Premium => 0,
            Self::Standard => 1,
            Self::Fallback => 2,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Premium => "premium",
            Self::Standard => "standard",
            Self::Fallback => "fallback",
        }
    }
}

/// Static configuration for a single upstream RPC provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Human-readable identifier (e.g. "alchemy"). Must be unique within a network.
    pub name: String,

    /// HTTP(S) JSON-RPC endpoint.
    pub url: String,

    /// Provider tier. Defaults to `standard`.
    #[serde(default)]
    pub tier: ProviderTier,

    /// Weight used by the composite fallback client. Defaults to `1`.
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Requests per minute this provider accepts from us. Defaults to `600`.
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,

    /// Per-attempt request timeout in milliseconds. Defaults to `10000`.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Transport-level retries for 5xx/connection errors. Defaults to `2`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_weight() -> u32 {
    1
}

fn default_rate_limit_per_minute() -> u32 {
    600
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    2
}

impl ProviderConfig {
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            tier: ProviderTier::default(),
            weight: default_weight(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }

    #[must_use]
    pub fn with_tier(mut self, tier: ProviderTier) -> Self {
        self.tier = tier;
        self
    }

    #[must_use]
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One blockchain network and its ordered provider list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: ChainId,

    #[serde(default)]
    pub name: String,

    pub providers: Vec<ProviderConfig>,
}

/// Multicall batching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Queue length that triggers an immediate flush. Defaults to `50`.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Debounce window in milliseconds. Defaults to `100`.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// Whether page context participates in the batch key. Defaults to `true`.
    #[serde(default = "default_true")]
    pub group_by_context: bool,
}

fn default_max_batch_size() -> usize {
    50
}

fn default_max_wait_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_wait_ms: default_max_wait_ms(),
            group_by_context: true,
        }
    }
}

impl BatchConfig {
    #[must_use]
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// TTL per request priority, in milliseconds.
///
/// Without a `[cache.priority_ttl_ms]` table the built-in 10s/30s/60s apply. A priority
/// left out of a given table falls back to `cache.default_ttl_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityTtlConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<u64>,
}

fn default_high_ttl_ms() -> u64 {
    10_000
}

fn default_medium_ttl_ms() -> u64 {
    30_000
}

fn default_low_ttl_ms() -> u64 {
    60_000
}

impl Default for PriorityTtlConfig {
    fn default() -> Self {
        Self {
            high: Some(default_high_ttl_ms()),
            medium: Some(default_medium_ttl_ms()),
            low: Some(default_low_ttl_ms()),
        }
    }
}

/// Cache store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction. Defaults to `1000`.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// TTL used when neither an override nor a priority TTL applies. Defaults to `30000`.
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,

    #[serde(default)]
    pub priority_ttl_ms: PriorityTtlConfig,

    /// Seconds between sweeps that drop expired entries. Defaults to `60`.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

fn default_max_entries() -> usize {
    1000
}

fn default_ttl_ms() -> u64 {
    30_000
}

fn default_sweep_interval_seconds() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            default_ttl_ms: default_ttl_ms(),
            priority_ttl_ms: PriorityTtlConfig::default(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

impl CacheConfig {
    /// Resolves the TTL for a request: explicit override wins, then the priority table,
    /// then `default_ttl_ms`.
    #[must_use]
    pub fn ttl_for(&self, priority: Priority, override_ms: Option<u64>) -> Duration {
        let configured = match priority {
            Priority::High => self.priority_ttl_ms.high,
            Priority::Medium => self.priority_ttl_ms.medium,
            Priority::Low => self.priority_ttl_ms.low,
        };
        override_ms.or(configured).map_or(self.default_ttl(), Duration::from_millis)
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Health monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Seconds between probe rounds. Defaults to `30`.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    /// A provider is unhealthy once its error counter exceeds this. Defaults to `3`.
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,

    /// Timeout of one liveness probe in milliseconds. Defaults to `5000`.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_interval_seconds() -> u64 {
    30
}

fn default_unhealthy_threshold() -> u32 {
    3
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            unhealthy_threshold: default_unhealthy_threshold(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl HealthCheckConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Named invalidation patterns: pattern name → cache-key substrings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationConfig {
    #[serde(default = "default_patterns")]
    pub patterns: BTreeMap<String, Vec<String>>,
}

fn default_patterns() -> BTreeMap<String, Vec<String>> {
    let mut patterns = BTreeMap::new();
    patterns.insert(
        "purchase".to_string(),
        vec![
            "hasAccess".to_string(),
            "getPurchase".to_string(),
            "purchaseHistory".to_string(),
            "balanceOf".to_string(),
        ],
    );
    patterns.insert(
        "subscription".to_string(),
        vec![
            "isSubscribed".to_string(),
            "getSubscription".to_string(),
            "subscriptionStatus".to_string(),
            "hasAccess".to_string(),
        ],
    );
    patterns.insert(
        "creator".to_string(),
        vec![
            "getCreatorProfile".to_string(),
            "getCreatorContent".to_string(),
            "creatorEarnings".to_string(),
        ],
    );
    patterns
}

impl Default for InvalidationConfig {
    fn default() -> Self {
        Self { patterns: default_patterns() }
    }
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "trace", "debug", "info", "warn", "error"). Defaults to `"info"`.
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

/// Shared HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Maximum concurrent HTTP requests across all providers. Defaults to `256`.
    #[serde(default = "default_concurrent_limit")]
    pub concurrent_limit: usize,

    /// Permit acquisition timeout in milliseconds. Defaults to `500`.
    #[serde(default = "default_permit_timeout_ms")]
    pub permit_timeout_ms: u64,
}

fn default_concurrent_limit() -> usize {
    256
}

fn default_permit_timeout_ms() -> u64 {
    500
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            concurrent_limit: default_concurrent_limit(),
            permit_timeout_ms: default_permit_timeout_ms(),
        }
    }
}

/// Root application configuration containing all subsystem settings.
///
/// Loaded with the `CONDUIT` prefix for environment overrides, using `__` as separator
/// (e.g. `CONDUIT__BATCHING__MAX_WAIT_MS=50`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,

    #[serde(default)]
    pub batching: BatchConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    #[serde(default)]
    pub invalidation: InvalidationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// A missing file is not an error: defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be parsed or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("CONDUIT").separator("__"))
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/config.toml`, overridable via `CONDUIT_CONFIG`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONDUIT_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Looks up the network configuration for a chain.
    #[must_use]
    pub fn network(&self, chain_id: ChainId) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.chain_id == chain_id)
    }

    /// Total number of configured providers across networks.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.networks.iter().map(|n| n.providers.len()).sum()
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.networks.is_empty() {
            return Err("No networks configured".to_string());
        }

        let mut chain_ids = HashSet::new();
        for network in &self.networks {
            if !chain_ids.insert(network.chain_id) {
                return Err(format!("Duplicate network chain id: {}", network.chain_id));
            }
            if network.providers.is_empty() {
                return Err(format!("No providers configured for chain {}", network.chain_id));
            }

            let mut names = HashSet::new();
            for provider in &network.providers {
                Self::validate_provider(network.chain_id, provider)?;
                if !names.insert(provider.name.as_str()) {
                    return Err(format!(
                        "Duplicate provider name {} on chain {}",
                        provider.name, network.chain_id
                    ));
                }
            }
        }

        if self.batching.max_batch_size == 0 {
            return Err("Max batch size must be greater than 0".to_string());
        }
        if self.batching.max_wait_ms == 0 {
            return Err("Max batch wait must be greater than 0".to_string());
        }

        if self.cache.max_entries == 0 {
            return Err("Cache max entries must be greater than 0".to_string());
        }
        let ttls = &self.cache.priority_ttl_ms;
        if self.cache.default_ttl_ms == 0 || [ttls.high, ttls.medium, ttls.low].contains(&Some(0)) {
            return Err("Cache TTLs must be greater than 0".to_string());
        }
        if self.cache.sweep_interval_seconds == 0 {
            return Err("Cache sweep interval must be greater than 0".to_string());
        }

        if self.health_check.interval_seconds == 0 {
            return Err("Health check interval must be greater than 0".to_string());
        }
        if self.health_check.unhealthy_threshold == 0 {
            return Err("Unhealthy threshold must be greater than 0".to_string());
        }

        for (name, substrings) in &self.invalidation.patterns {
            if substrings.is_empty() || substrings.iter().any(String::is_empty) {
                return Err(format!("Invalidation pattern '{name}' has no usable substrings"));
            }
        }

        if self.http.concurrent_limit == 0 {
            return Err("HTTP concurrent limit must be greater than 0".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }

    fn validate_provider(chain_id: ChainId, provider: &ProviderConfig) -> Result<(), String> {
        if provider.url.is_empty() {
            return Err(format!("Empty URL for provider {} on chain {chain_id}", provider.name));
        }
        if !provider.url.starts_with("http") {
            return Err(format!("Invalid URL for provider {}: {}", provider.name, provider.url));
        }
        if provider.weight == 0 {
            return Err(format!("Provider {} weight must be greater than 0", provider.name));
        }
        if provider.timeout_ms == 0 {
            return Err(format!("Provider {} timeout must be greater than 0", provider.name));
        }
        if provider.rate_limit_per_minute == 0 {
            return Err(format!("Provider {} rate limit must be greater than 0", provider.name));
        }
        Ok(())
    }
}
