//! Offline gateway - the façade the host application calls
//!
//! Reads prefer a fresh cache entry, then a live fetch, then a stale
//! fallback. Writes are queued durably before any network activity and a
//! sync trigger is fired opportunistically; the receipt returns as soon as
//! the write is safe on disk.

use std::future::Future;
use std::sync::Arc;

use outpost_core::cache::policy;
use outpost_domain::{
    now_ms, CacheEntry, CacheLookup, ConnectivityState, EngineError, MutationKind, MutationRecord,
    Result, SyncCycleResult, WriteReceipt,
};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};

use crate::context::EngineContext;

/// Thin façade over the engine context.
#[derive(Clone)]
pub struct OfflineGateway {
    ctx: Arc<EngineContext>,
}

impl OfflineGateway {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    /// Read a resource, preferring the freshest available source.
    ///
    /// `fetcher` performs the live fetch and is only invoked on a cache
    /// miss (or expiry) while online. The returned lookup is tagged with
    /// `stale: true` when it was served from an expired entry because the
    /// live fetch failed or the engine is offline.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotAvailableOffline`] when offline with no cached
    /// entry at all; the fetcher's error when a live fetch fails and no
    /// fallback exists.
    #[instrument(skip(self, fetcher), fields(key = %key))]
    pub async fn read<F, Fut>(
        &self,
        key: &str,
        resource_type: &str,
        ttl_ms: Option<i64>,
        fetcher: F,
    ) -> Result<CacheLookup>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let ttl = ttl_ms.unwrap_or(self.ctx.config().cache.ttl_default_ms);
        let cached = self.ctx.cache().get(key).await?;

        if let Some(entry) = &cached {
            if entry.is_fresh_at(now_ms()) {
                debug!("serving fresh cache entry");
                return Ok(policy::to_lookup(entry, now_ms()));
            }
        }

        if !self.ctx.connectivity().is_online {
            return match cached {
                Some(entry) => {
                    debug!("offline, serving stale cache entry");
                    Ok(policy::to_lookup(&entry, now_ms()))
                }
                None => Err(EngineError::NotAvailableOffline(key.to_string())),
            };
        }

        match fetcher().await {
            Ok(value) => {
                let entry = CacheEntry::new(key, resource_type, value, now_ms(), ttl);
                // The fetched value is served even if caching it fails;
                // a full disk must not break reads.
                if let Err(err) = self.ctx.cache().put(&entry).await {
                    warn!(error = %err, "failed to cache fetched value");
                }
                Ok(CacheLookup { value: entry.value, stale: false })
            }
            Err(err) => match cached {
                Some(entry) => {
                    warn!(error = %err, "live fetch failed, serving stale cache entry");
                    Ok(policy::to_lookup(&entry, now_ms()))
                }
                None => Err(err),
            },
        }
    }

    /// Queue a local write for remote application.
    ///
    /// The mutation is durable before this returns; no network activity
    /// happens on the caller's path. While online a sync trigger is fired
    /// without waiting for the cycle.
    ///
    /// # Errors
    ///
    /// [`EngineError::StorageQuotaExceeded`] when the device is out of
    /// space; the write is rejected and prior state is untouched.
    #[instrument(skip(self, payload), fields(collection = %resource_collection))]
    pub async fn write(
        &self,
        resource_collection: &str,
        kind: MutationKind,
        payload: Value,
        entity_key: Option<String>,
    ) -> Result<WriteReceipt> {
        let record = MutationRecord::new(resource_collection, kind, payload, entity_key);
        self.ctx.queue().enqueue(&record).await?;

        let sync_triggered = self.ctx.connectivity().is_online;
        if sync_triggered {
            self.ctx.trigger_sync().await;
        } else {
            debug!("offline, write queued without sync trigger");
        }

        Ok(WriteReceipt { mutation_id: record.id, queued: true, sync_triggered })
    }

    /// Request a sync cycle without waiting for it.
    pub async fn trigger_sync(&self) {
        self.ctx.trigger_sync().await;
    }

    /// Number of mutations still awaiting remote application.
    pub async fn pending_count(&self) -> Result<usize> {
        self.ctx.pending_count().await
    }

    /// Mutations that exhausted their retry budget.
    pub async fn dead_lettered(&self) -> Result<Vec<MutationRecord>> {
        self.ctx.dead_lettered().await
    }

    /// Subscribe to sync cycle results.
    pub async fn subscribe_cycles(&self) -> broadcast::Receiver<SyncCycleResult> {
        self.ctx.subscribe_cycles().await
    }

    /// Current debounced connectivity state.
    pub fn connectivity(&self) -> ConnectivityState {
        self.ctx.connectivity()
    }
}
