//! Sync cycle and connectivity types

use serde::{Deserialize, Serialize};

/// One error surfaced by a sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCycleError {
    pub mutation_id: String,
    pub message: String,
}

/// Summary of one execution of the coordinator's drain-and-apply algorithm.
///
/// Emitted to subscribers on every cycle completion; coordinator failures
/// are folded in here rather than thrown across the façade boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCycleResult {
    pub started_at: i64,
    pub finished_at: i64,
    pub succeeded: u32,
    pub failed: u32,
    pub errors: Vec<SyncCycleError>,
}

impl SyncCycleResult {
    /// Whether any transient failure occurred, i.e. the coordinator should
    /// schedule a backoff retry.
    pub fn had_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Debounced connectivity snapshot published by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityState {
    pub is_online: bool,
    pub last_changed: i64,
}

impl ConnectivityState {
    pub fn offline_at(now: i64) -> Self {
        Self { is_online: false, last_changed: now }
    }

    pub fn online_at(now: i64) -> Self {
        Self { is_online: true, last_changed: now }
    }
}

/// Persisted single-flight ownership record for the sync coordinator.
///
/// Stored in the `session_meta` collection so that independent execution
/// contexts (foreground and background) observe the same lock. An expired
/// lease may be taken over by a new owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLease {
    pub owner: String,
    pub expires_at: i64,
}

impl SyncLease {
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}
