//! Port interface for the durable read cache

use async_trait::async_trait;
use outpost_domain::{CacheEntry, Result};

/// Trait for the durable TTL read cache
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch an entry by key, expired or not. Freshness is the caller's
    /// concern (see [`crate::cache::policy`]).
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Insert or overwrite an entry.
    async fn put(&self, entry: &CacheEntry) -> Result<()>;

    /// Drop every entry of a resource type. Called by the coordinator
    /// after a mutation for that type is applied remotely.
    async fn invalidate_resource_type(&self, resource_type: &str) -> Result<usize>;

    /// Delete entries expired for longer than `grace_ms`; returns the
    /// count. Bounds storage growth without sacrificing stale fallback.
    async fn sweep_expired(&self, now_ms: i64, grace_ms: i64) -> Result<usize>;
}
