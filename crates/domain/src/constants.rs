//! Engine-wide default values
//!
//! Defaults are overridable through [`crate::config::EngineConfig`].

/// Default TTL applied to cache entries when the caller does not pass one.
pub const DEFAULT_TTL_MS: i64 = 60_000;

/// Maximum mutations drained per sync batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 20;

/// Transient attempts before a mutation is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Exponential backoff base delay.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;

/// Exponential backoff ceiling (5 minutes).
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 300_000;

/// Retention horizon for synced mutations.
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Minimum hold time before a connectivity transition is reported.
pub const DEFAULT_DEBOUNCE_MS: u64 = 2_000;

/// Per-call timeout for remote operations inside a sync cycle.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 15_000;

/// Maximum drain iterations per cycle; bounds starvation from a
/// constantly-refilled queue.
pub const DEFAULT_ITERATION_CAP: u32 = 10;

/// Lifetime of the persisted sync lease. The coordinator renews it before
/// every remote call, so it only has to comfortably exceed one call
/// timeout.
pub const DEFAULT_LEASE_TTL_MS: i64 = 60_000;

/// Periodic sync trigger interval.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;

/// Retention sweep interval.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3_600;

/// Grace window after TTL expiry before a cache entry is swept. Expired
/// entries stay available as stale fallback until then.
pub const DEFAULT_CACHE_GRACE_MS: i64 = 86_400_000;

/// Default connection pool size for the local store.
pub const DEFAULT_POOL_SIZE: u32 = 4;
