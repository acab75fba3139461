//! Configuration structures for the engine
//!
//! Built once at startup (by the host application or the infra config
//! loader) and handed to `EngineContext`. Every field has a default so a
//! config file only needs to override what it cares about.

use serde::{Deserialize, Serialize};

use crate::constants;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub queue: QueueConfig,
    pub sync: SyncConfig,
    pub connectivity: ConnectivityConfig,
    pub remote: RemoteConfig,
}

/// Local store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "outpost.db".into(), pool_size: constants::DEFAULT_POOL_SIZE }
    }
}

/// Read-cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_default_ms: i64,
    /// How long an expired entry remains as stale fallback before the
    /// retention sweep removes it.
    pub expired_grace_ms: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_default_ms: constants::DEFAULT_TTL_MS,
            expired_grace_ms: constants::DEFAULT_CACHE_GRACE_MS,
        }
    }
}

/// Mutation queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_batch_size: usize,
    pub max_attempts: u32,
    pub retention_days: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_batch_size: constants::DEFAULT_MAX_BATCH_SIZE,
            max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
            retention_days: constants::DEFAULT_RETENTION_DAYS,
        }
    }
}

/// Sync coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// Periodic trigger interval in seconds; 0 disables the timer.
    pub interval_secs: u64,
    pub call_timeout_ms: u64,
    pub iteration_cap: u32,
    pub lease_ttl_ms: i64,
    pub sweep_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: constants::DEFAULT_BACKOFF_BASE_MS,
            backoff_cap_ms: constants::DEFAULT_BACKOFF_CAP_MS,
            interval_secs: constants::DEFAULT_SYNC_INTERVAL_SECS,
            call_timeout_ms: constants::DEFAULT_CALL_TIMEOUT_MS,
            iteration_cap: constants::DEFAULT_ITERATION_CAP,
            lease_ttl_ms: constants::DEFAULT_LEASE_TTL_MS,
            sweep_interval_secs: constants::DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

/// Connectivity monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// A reported state must hold this long before it is published.
    pub debounce_ms: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self { debounce_ms: constants::DEFAULT_DEBOUNCE_MS }
    }
}

/// Remote API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the remote API, e.g. `https://api.example.com/v1`.
    pub base_url: String,
    /// Optional static bearer token. Session management proper is an
    /// external collaborator.
    pub bearer_token: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self { base_url: "http://localhost:8080".into(), bearer_token: None }
    }
}
