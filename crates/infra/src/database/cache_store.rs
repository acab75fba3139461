//! SQLite-backed read cache
//!
//! Entries are stored in the `cache_entries` collection keyed by cache key.
//! Expiry never deletes an entry on its own; only the retention sweep and
//! explicit invalidation remove rows, keeping stale fallback data around.

use async_trait::async_trait;
use outpost_core::CacheStore;
use outpost_domain::{CacheEntry, Result};
use tracing::debug;

use super::store::{LocalStore, COLLECTION_CACHE};

pub struct SqliteCacheStore {
    store: LocalStore,
}

impl SqliteCacheStore {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.store.get(COLLECTION_CACHE, key).await
    }

    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        self.store.put(COLLECTION_CACHE, &entry.key, entry).await
    }

    async fn invalidate_resource_type(&self, resource_type: &str) -> Result<usize> {
        let resource_type = resource_type.to_string();
        let filter_type = resource_type.clone();
        let matching: Vec<CacheEntry> = self
            .store
            .get_all_matching(COLLECTION_CACHE, move |e: &CacheEntry| {
                e.resource_type == filter_type
            })
            .await?;

        let mut removed = 0;
        for entry in &matching {
            if self.store.delete(COLLECTION_CACHE, &entry.key).await? {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(resource_type = %resource_type, removed, "cache invalidated");
        }
        Ok(removed)
    }

    async fn sweep_expired(&self, now_ms: i64, grace_ms: i64) -> Result<usize> {
        let expired: Vec<CacheEntry> = self
            .store
            .get_all_matching(COLLECTION_CACHE, move |e: &CacheEntry| {
                now_ms.saturating_sub(e.fetched_at) > e.ttl_ms.saturating_add(grace_ms)
            })
            .await?;

        let mut removed = 0;
        for entry in &expired {
            if self.store.delete(COLLECTION_CACHE, &entry.key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
