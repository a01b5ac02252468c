//! Core type definitions for logical read requests, responses, and the JSON-RPC wire format.
//!
//! # Type Categories
//!
//! ## Orchestration Types
//! - [`Request`], [`Response`]: the inbound/outbound contract with collaborators
//! - [`ContractCall`]: opaque call descriptor, never interpreted by this layer
//! - [`Priority`], [`ResponseSource`]: routing input and provenance output
//!
//! ## JSON-RPC Protocol Types
//! - [`JsonRpcRequest`], [`JsonRpcResponse`], [`JsonRpcError`]: used by the HTTP transport
//!
//! Cache keys are derived here as well so that the cache store, the dedup map, and
//! invalidation all agree on one key shape: `"{chain_id}|{address}|{function}|{args_hash}"`.

use crate::utils::json_hash::hash_args_hex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{borrow::Cow, fmt, sync::Arc};

/// JSON-RPC protocol version constant to avoid repeated allocations.
pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated `Cow` for JSON-RPC version.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// Label used for requests that carry no page context.
pub const DEFAULT_CONTEXT: &str = "default";

/// Network identifier (EVM chain id).
pub type ChainId = u64;

/// Request priority.
///
/// Higher priority means fresher data (shorter TTL) and lower latency: `High` requests
/// bypass the batch scheduler entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Whether this priority is routed through the batch scheduler.
    #[must_use]
    pub fn is_batched(self) -> bool {
        !matches!(self, Self::High)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque contract-call descriptor.
///
/// The orchestration layer only uses `address`, `function_name` and `args` to derive a
/// cache key. `calldata` is the collaborator's ABI-encoded payload (hex, `0x`-prefixed)
/// that transports forward verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCall {
    pub address: String,
    pub function_name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calldata: Option<String>,
}

impl ContractCall {
    #[must_use]
    pub fn new(address: impl Into<String>, function_name: impl Into<String>, args: Value) -> Self {
        Self {
            address: address.into(),
            function_name: function_name.into(),
            args,
            calldata: None,
        }
    }

    #[must_use]
    pub fn with_calldata(mut self, calldata: impl Into<String>) -> Self {
        self.calldata = Some(calldata.into());
        self
    }

    /// Derived logical key: `address|functionName|argsHash`.
    ///
    /// Addresses are lowercased so checksummed and plain forms collapse to one entry.
    #[must_use]
    pub fn derived_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.address.to_ascii_lowercase(),
            self.function_name,
            hash_args_hex(&self.args)
        )
    }
}

/// A logical read query submitted by a collaborator. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: String,
    pub chain_id: ChainId,
    pub call: ContractCall,
    #[serde(default)]
    pub priority: Priority,
    /// Explicit cache key; replaces the derived `address|function|argsHash` part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    /// TTL override in milliseconds; replaces the per-priority TTL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_duration_ms: Option<u64>,
    /// Page-context label used for batch grouping and per-context counters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_context: Option<String>,
}

impl Request {
    #[must_use]
    pub fn new(id: impl Into<String>, chain_id: ChainId, call: ContractCall) -> Self {
        Self {
            id: id.into(),
            chain_id,
            call,
            priority: Priority::default(),
            cache_key: None,
            cache_duration_ms: None,
            page_context: None,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_page_context(mut self, context: impl Into<String>) -> Self {
        self.page_context = Some(context.into());
        self
    }

    #[must_use]
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_cache_duration_ms(mut self, ttl_ms: u64) -> Self {
        self.cache_duration_ms = Some(ttl_ms);
        self
    }

    /// Store key shared by the cache and the dedup map.
    ///
    /// Always namespaced by chain so identical calls on different networks never collide.
    #[must_use]
    pub fn request_key(&self) -> RequestKey {
        let logical = match &self.cache_key {
            Some(explicit) => explicit.clone(),
            None => self.call.derived_key(),
        };
        RequestKey(Arc::from(format!("{}|{logical}", self.chain_id)))
    }

    /// Context label for counters and batch grouping.
    #[must_use]
    pub fn context_label(&self) -> &str {
        self.page_context.as_deref().unwrap_or(DEFAULT_CONTEXT)
    }
}

/// Chain-qualified key identifying one logical query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(Arc<str>);

impl RequestKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestKey {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provenance of a response. Observability only, never affects correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Cache,
    Batch,
    Single,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Batch => write!(f, "batch"),
            Self::Single => write!(f, "single"),
        }
    }
}

/// Outcome of a [`Request`], correlated by id. Exactly one of `data` / `error` is set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<crate::orchestrator::RequestError>,
    pub timestamp_ms: i64,
    pub source: ResponseSource,
}

impl Response {
    #[must_use]
    pub fn success(id: impl Into<String>, data: Value, source: ResponseSource) -> Self {
        Self {
            id: id.into(),
            data: Some(data),
            error: None,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            source,
        }
    }

    #[must_use]
    pub fn failure(
        id: impl Into<String>,
        error: crate::orchestrator::RequestError,
        source: ResponseSource,
    ) -> Self {
        Self {
            id: id.into(),
            data: None,
            error: Some(error),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            source,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Cow<'static, str>,
    pub method: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: Value,
}

impl JsonRpcRequest {
    #[must_use]
    pub fn new(method: &'static str, params: Option<Value>, id: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, method: Cow::Borrowed(method), params, id }
    }

    /// Builds an `eth_call` against `latest` for a call descriptor.
    #[must_use]
    pub fn eth_call(to: &str, data: &str, id: u64) -> Self {
        Self::new(
            "eth_call",
            Some(serde_json::json!([{ "to": to, "data": data }, "latest"])),
            Value::from(id),
        )
    }
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    #[serde(default)]
    pub id: Value,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}
