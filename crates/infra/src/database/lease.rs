//! Persisted sync lease
//!
//! The single-flight guard for sync cycles lives in the `session_meta`
//! collection rather than process memory, so foreground and background
//! contexts sharing the database observe the same lock. Acquisition runs
//! inside an immediate transaction; two racing owners serialize on the
//! database write lock and exactly one wins.

use std::sync::Arc;

use async_trait::async_trait;
use outpost_core::{AcquireOutcome, SyncLeaseStore};
use outpost_domain::{now_ms, Result, SyncLease};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use tokio::task;
use tracing::{debug, warn};

use super::manager::{map_sql_error, StoreManager};
use super::store::COLLECTION_SESSION;
use crate::errors::map_join_error;

const LEASE_KEY: &str = "sync_lease";

pub struct SqliteSyncLease {
    manager: Arc<StoreManager>,
}

impl SqliteSyncLease {
    pub fn new(manager: Arc<StoreManager>) -> Self {
        Self { manager }
    }
}

fn read_lease(tx: &rusqlite::Transaction<'_>) -> Result<Option<SyncLease>> {
    let json: Option<String> = tx
        .query_row(
            "SELECT value FROM local_store WHERE collection = ?1 AND key = ?2",
            params![COLLECTION_SESSION, LEASE_KEY],
            |row| row.get(0),
        )
        .optional()
        .map_err(map_sql_error)?;

    match json {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

fn write_lease(tx: &rusqlite::Transaction<'_>, lease: &SyncLease) -> Result<()> {
    let json = serde_json::to_string(lease)?;
    tx.execute(
        "INSERT OR REPLACE INTO local_store (collection, key, value, updated_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![COLLECTION_SESSION, LEASE_KEY, json, now_ms()],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

#[async_trait]
impl SyncLeaseStore for SqliteSyncLease {
    async fn try_acquire(&self, owner: &str, ttl_ms: i64) -> Result<AcquireOutcome> {
        let manager = Arc::clone(&self.manager);
        let owner = owner.to_string();

        task::spawn_blocking(move || -> Result<AcquireOutcome> {
            let mut conn = manager.get_connection()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;

            let now = now_ms();
            let current = read_lease(&tx)?;

            if let Some(existing) = current {
                if !existing.is_expired_at(now) && existing.owner != owner {
                    tx.commit().map_err(map_sql_error)?;
                    return Ok(AcquireOutcome::Held(existing));
                }
                if existing.is_expired_at(now) && existing.owner != owner {
                    warn!(
                        stale_owner = %existing.owner,
                        new_owner = %owner,
                        "taking over expired sync lease"
                    );
                }
            }

            let lease = SyncLease { owner: owner.clone(), expires_at: now + ttl_ms };
            write_lease(&tx, &lease)?;
            tx.commit().map_err(map_sql_error)?;

            debug!(owner = %owner, expires_at = lease.expires_at, "sync lease acquired");
            Ok(AcquireOutcome::Acquired(lease))
        })
        .await
        .map_err(map_join_error)?
    }

    async fn release(&self, owner: &str) -> Result<()> {
        let manager = Arc::clone(&self.manager);
        let owner = owner.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = manager.get_connection()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;

            // Only the current owner may release; a newer owner's lease
            // stays untouched.
            if let Some(existing) = read_lease(&tx)? {
                if existing.owner == owner {
                    tx.execute(
                        "DELETE FROM local_store WHERE collection = ?1 AND key = ?2",
                        params![COLLECTION_SESSION, LEASE_KEY],
                    )
                    .map_err(map_sql_error)?;
                }
            }
            tx.commit().map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}
