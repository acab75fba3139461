//! Durable local store: named collections of JSON documents.
//!
//! This is the crash-durable primitive everything else is built on. Data
//! lives in SQLite, not process memory, so it survives process restarts.
//! All blocking SQL runs inside `tokio::task::spawn_blocking`; callers are
//! never blocked on the executor.

use std::sync::Arc;

use outpost_domain::{now_ms, EngineError, Result};
use rusqlite::params;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task;

use super::manager::{map_sql_error, StoreManager};
use crate::errors::map_join_error;

/// Collection holding queued [`outpost_domain::MutationRecord`]s.
pub const COLLECTION_MUTATIONS: &str = "mutation_queue";
/// Collection holding [`outpost_domain::CacheEntry`]s.
pub const COLLECTION_CACHE: &str = "cache_entries";
/// Collection holding session-scoped records (sync lease, connectivity).
pub const COLLECTION_SESSION: &str = "session_meta";

/// Handle over the keyed collection store.
#[derive(Clone)]
pub struct LocalStore {
    manager: Arc<StoreManager>,
}

impl LocalStore {
    pub fn new(manager: Arc<StoreManager>) -> Self {
        Self { manager }
    }

    /// Borrow the underlying manager (for components that need raw SQL).
    pub fn manager(&self) -> &Arc<StoreManager> {
        &self.manager
    }

    /// Insert or overwrite a value. A full disk surfaces as
    /// [`EngineError::StorageQuotaExceeded`] and leaves prior contents
    /// untouched.
    pub async fn put<T: Serialize>(&self, collection: &str, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let manager = Arc::clone(&self.manager);
        let collection = collection.to_string();
        let key = key.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = manager.get_connection()?;
            conn.execute(
                "INSERT OR REPLACE INTO local_store (collection, key, value, updated_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![collection, key, json, now_ms()],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    /// Fetch one value by key.
    pub async fn get<T: DeserializeOwned + Send + 'static>(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<T>> {
        let manager = Arc::clone(&self.manager);
        let collection = collection.to_string();
        let key = key.to_string();

        task::spawn_blocking(move || -> Result<Option<T>> {
            let conn = manager.get_connection()?;
            let mut stmt = conn
                .prepare("SELECT value FROM local_store WHERE collection = ?1 AND key = ?2")
                .map_err(map_sql_error)?;
            let mut rows = stmt.query(params![collection, key]).map_err(map_sql_error)?;

            match rows.next().map_err(map_sql_error)? {
                Some(row) => {
                    let json: String = row.get(0).map_err(map_sql_error)?;
                    Ok(Some(serde_json::from_str(&json)?))
                }
                None => Ok(None),
            }
        })
        .await
        .map_err(map_join_error)?
    }

    /// Fetch every value in a collection, in key order.
    pub async fn get_all<T: DeserializeOwned + Send + 'static>(
        &self,
        collection: &str,
    ) -> Result<Vec<T>> {
        self.get_all_matching(collection, |_: &T| true).await
    }

    /// Fetch values in a collection that satisfy `predicate`, in key order.
    pub async fn get_all_matching<T, F>(&self, collection: &str, predicate: F) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(&T) -> bool + Send + 'static,
    {
        let manager = Arc::clone(&self.manager);
        let collection = collection.to_string();

        task::spawn_blocking(move || -> Result<Vec<T>> {
            let conn = manager.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT value FROM local_store WHERE collection = ?1 ORDER BY key ASC",
                )
                .map_err(map_sql_error)?;
            let mut rows = stmt.query(params![collection]).map_err(map_sql_error)?;

            let mut values = Vec::new();
            while let Some(row) = rows.next().map_err(map_sql_error)? {
                let json: String = row.get(0).map_err(map_sql_error)?;
                let value: T = serde_json::from_str(&json)?;
                if predicate(&value) {
                    values.push(value);
                }
            }
            Ok(values)
        })
        .await
        .map_err(map_join_error)?
    }

    /// Delete one key; returns whether a row existed.
    pub async fn delete(&self, collection: &str, key: &str) -> Result<bool> {
        let manager = Arc::clone(&self.manager);
        let collection = collection.to_string();
        let key = key.to_string();

        task::spawn_blocking(move || -> Result<bool> {
            let conn = manager.get_connection()?;
            let affected = conn
                .execute(
                    "DELETE FROM local_store WHERE collection = ?1 AND key = ?2",
                    params![collection, key],
                )
                .map_err(map_sql_error)?;
            Ok(affected > 0)
        })
        .await
        .map_err(map_join_error)?
    }

    /// Count rows in a collection.
    pub async fn count(&self, collection: &str) -> Result<usize> {
        let manager = Arc::clone(&self.manager);
        let collection = collection.to_string();

        task::spawn_blocking(move || -> Result<usize> {
            let conn = manager.get_connection()?;
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM local_store WHERE collection = ?1",
                    params![collection],
                    |row| row.get(0),
                )
                .map_err(map_sql_error)?;
            usize::try_from(count)
                .map_err(|e| EngineError::Internal(format!("row count overflow: {e}")))
        })
        .await
        .map_err(map_join_error)?
    }
}
