//! Read cache types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A cached remote read, durable across restarts.
///
/// Expired entries are not deleted eagerly; they remain available as a
/// stale fallback when a live fetch fails or the engine is offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Derived from resource type + query parameters by the caller.
    pub key: String,
    pub resource_type: String,
    pub value: Value,
    pub fetched_at: i64,
    pub ttl_ms: i64,
}

impl CacheEntry {
    pub fn new(
        key: impl Into<String>,
        resource_type: impl Into<String>,
        value: Value,
        fetched_at: i64,
        ttl_ms: i64,
    ) -> Self {
        Self { key: key.into(), resource_type: resource_type.into(), value, fetched_at, ttl_ms }
    }

    /// An entry is fresh iff `now - fetched_at <= ttl_ms`.
    pub fn is_fresh_at(&self, now: i64) -> bool {
        now.saturating_sub(self.fetched_at) <= self.ttl_ms
    }
}

/// Result of a cache read, tagged with staleness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheLookup {
    pub value: Value,
    pub stale: bool,
}
