use serde::Serialize;
use thiserror::Error;

/// Classification of JSON-RPC errors returned by a provider.
///
/// Decides whether an error is the provider's fault (fail over, penalize) or the
/// call's fault (surface to the caller as is):
/// - Client errors and execution errors belong to the call
/// - Provider and parse errors belong to the provider
/// - Rate limits move on to another provider without a health penalty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcErrorCategory {
    /// Invalid request, method not found, invalid params.
    ClientError,
    /// Internal error or an unrecognized server error.
    ProviderError,
    /// JSON-RPC level rate limiting (-32005).
    RateLimit,
    /// The provider could not parse what it was sent, or sent garbage back.
    ParseError,
    /// Reverts, out of gas and similar contract-level failures.
    ExecutionError,
}

impl RpcErrorCategory {
    /// Classifies a JSON-RPC error code and message into a category.
    ///
    /// Code `3` is the geth convention for `execution reverted` with revert data.
    /// In the -32000 to -32099 server range the message decides between an
    /// execution error and a provider error.
    #[must_use]
    pub fn from_code_and_message(code: i32, message: &str) -> Self {
        match code {
            3 => Self::ExecutionError,
            -32700 => Self::ParseError,
            -32602..=-32600 => Self::ClientError,
            -32603 => Self::ProviderError,
            -32005 => Self::RateLimit,
            -32099..=-32000 => {
                let message_lower = message.to_lowercase();
                if message_lower.contains("revert") ||
                    message_lower.contains("out of gas") ||
                    message_lower.contains("invalid opcode") ||
                    message_lower.contains("stack underflow")
                {
                    Self::ExecutionError
                } else {
                    Self::ProviderError
                }
            }
            _ => Self::ProviderError,
        }
    }

    /// Returns `true` if another provider might answer this request successfully.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimit | Self::ProviderError | Self::ParseError)
    }

    /// Returns `true` if this error should count against the provider's health.
    #[must_use]
    pub fn should_penalize_provider(&self) -> bool {
        matches!(self, Self::ProviderError | Self::ParseError)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientError => "client_error",
            Self::ProviderError => "provider_error",
            Self::RateLimit => "rate_limit",
            Self::ParseError => "parse_error",
            Self::ExecutionError => "execution_error",
        }
    }
}

/// Errors that can occur when talking to an upstream RPC provider.
///
/// `Clone` so one outcome can be fanned out to every deduplicated waiter and every
/// member of a failed batch.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ProviderError {
    /// Request exceeded the provider's timeout.
    #[error("Request timeout")]
    Timeout,

    /// Failed to reach the provider.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Non-2xx HTTP status. First field is the status code, second the (truncated) body.
    #[error("HTTP error {0}: {1}")]
    HttpError(u16, String),

    /// The provider's local token bucket is empty, or the provider answered 429.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// JSON-RPC error object returned by the provider.
    #[error("RPC error {0}: {1}")]
    RpcError(i32, String),

    /// Response could not be parsed or did not match the request.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The call descriptor cannot be sent as is.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Every provider, including the composite fallback, failed.
    #[error("All providers failed: {0}")]
    AllProvidersFailed(String),
}

impl ProviderError {
    /// Returns the RPC error category if this is an RPC error.
    #[must_use]
    pub fn rpc_category(&self) -> Option<RpcErrorCategory> {
        match self {
            Self::RpcError(code, message) => {
                Some(RpcErrorCategory::from_code_and_message(*code, message))
            }
            _ => None,
        }
    }

    /// Returns `true` for transport-level failures that should move on to the next provider.
    ///
    /// Contract and call errors (reverts, invalid params, undeliverable requests) are
    /// `false`: every provider would answer them the same way.
    #[must_use]
    pub fn is_failover_eligible(&self) -> bool {
        match self {
            Self::Timeout |
            Self::ConnectionFailed(_) |
            Self::HttpError(_, _) |
            Self::RateLimited(_) |
            Self::InvalidResponse(_) => true,
            Self::RpcError(_, _) => self.rpc_category().is_some_and(|cat| cat.is_transient()),
            Self::InvalidRequest(_) | Self::AllProvidersFailed(_) => false,
        }
    }

    /// Returns `true` if this error should increment the provider's error counter.
    ///
    /// Rate limits and call errors do not.
    #[must_use]
    pub fn should_penalize_provider(&self) -> bool {
        match self {
            Self::Timeout | Self::ConnectionFailed(_) | Self::InvalidResponse(_) => true,
            Self::HttpError(status, _) => (500..=599).contains(status),
            Self::RpcError(_, _) => {
                self.rpc_category().is_some_and(|cat| cat.should_penalize_provider())
            }
            _ => false,
        }
    }

    /// Short label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionFailed(_) => "connection_failed",
            Self::HttpError(_, _) => "http_error",
            Self::RateLimited(_) => "rate_limited",
            Self::RpcError(_, _) => "rpc_error",
            Self::InvalidResponse(_) => "invalid_response",
            Self::InvalidRequest(_) => "invalid_request",
            Self::AllProvidersFailed(_) => "all_providers_failed",
        }
    }
}
