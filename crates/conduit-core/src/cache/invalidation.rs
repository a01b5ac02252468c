use std::collections::BTreeMap;

use crate::{cache::store::CacheStore, config::InvalidationConfig};

/// Closed vocabulary of named invalidation patterns.
///
/// A pattern maps to cache-key substrings; invalidating it evicts every entry whose
/// key contains any of them. Over-inclusive on purpose: a mutation does not need to
/// know every exact key it affects.
#[derive(Debug, Clone, Default)]
pub struct InvalidationRegistry {
    patterns: BTreeMap<String, Vec<String>>,
}

impl InvalidationRegistry {
    #[must_use]
    pub fn new(patterns: BTreeMap<String, Vec<String>>) -> Self {
        Self { patterns }
    }

    #[must_use]
    pub fn from_config(config: &InvalidationConfig) -> Self {
        Self::new(config.patterns.clone())
    }

    #[must_use]
    pub fn substrings(&self, pattern: &str) -> Option<&[String]> {
        self.patterns.get(pattern).map(Vec::as_slice)
    }

    pub fn pattern_names(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(String::as_str)
    }

    /// Applies a named pattern to the store. Unknown names evict nothing.
    pub fn apply(&self, store: &CacheStore, pattern: &str, context_hint: Option<&str>) -> usize {
        let Some(substrings) = self.substrings(pattern) else {
            tracing::warn!(pattern = pattern, "unknown invalidation pattern");
            return 0;
        };

        let removed = store.invalidate(substrings, context_hint);
        tracing::debug!(
            pattern = pattern,
            context_hint = context_hint.unwrap_or_default(),
            removed = removed,
            "cache invalidated"
        );
        removed
    }
}
