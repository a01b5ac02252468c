use serde::Serialize;
use thiserror::Error;

use crate::{types::ChainId, upstream::ProviderError};

/// Error carried by a failed [`Response`](crate::types::Response).
///
/// `Clone` because one settled outcome is delivered to every deduplicated waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "error", rename_all = "snake_case")]
pub enum RequestError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("No providers configured for chain {0}")]
    UnknownChain(ChainId),

    /// The multicall carrying this request failed as a whole or returned a malformed result.
    #[error("Batch failed: {0}")]
    BatchFailed(String),

    /// The in-flight execution this request was attached to went away without settling.
    #[error("Request abandoned before completion")]
    Abandoned,
}

impl RequestError {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Provider(e) => e.kind(),
            Self::UnknownChain(_) => "unknown_chain",
            Self::BatchFailed(_) => "batch_failed",
            Self::Abandoned => "abandoned",
        }
    }
}
