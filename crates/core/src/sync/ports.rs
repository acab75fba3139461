//! Port interfaces for sync operations

use async_trait::async_trait;
use outpost_domain::{MutationRecord, Result, SyncLease};

/// Trait for managing the durable mutation queue
#[async_trait]
pub trait MutationQueue: Send + Sync {
    /// Persist a mutation synchronously; never waits on network.
    async fn enqueue(&self, record: &MutationRecord) -> Result<()>;

    /// Dequeue up to `limit` pending records in global creation order.
    ///
    /// A record is excluded while an earlier unresolved record with the
    /// same entity key exists, so same-entity ordering holds across calls.
    async fn dequeue_batch(&self, limit: usize) -> Result<Vec<MutationRecord>>;

    /// Mark a record as confirmed by the remote system. Idempotent:
    /// replaying on an already-synced record is a no-op.
    async fn mark_synced(&self, id: &str) -> Result<()>;

    /// Record a failure. `permanent` drops the record from retry
    /// immediately; otherwise the attempt counter is incremented and the
    /// record is dead-lettered once it exceeds `max_attempts`.
    async fn mark_failed(&self, id: &str, error: &str, permanent: bool) -> Result<()>;

    /// Number of records still awaiting remote application.
    async fn pending_count(&self) -> Result<usize>;

    /// Records that exceeded their retry budget, for manual handling.
    async fn dead_lettered(&self) -> Result<Vec<MutationRecord>>;

    /// Restore a dead-lettered record to pending with a fresh retry budget.
    async fn requeue_dead_lettered(&self, id: &str) -> Result<()>;

    /// Delete synced records older than the horizon; returns the count.
    async fn purge_synced_before(&self, horizon_ms: i64) -> Result<usize>;
}

/// Trait for the persisted single-flight lease guarding sync cycles
///
/// The lease lives in durable storage so that independent execution
/// contexts observe the same lock; an in-memory flag would not be visible
/// across them.
#[async_trait]
pub trait SyncLeaseStore: Send + Sync {
    /// Try to acquire (or renew) the lease for `owner`. Returns the active
    /// lease when another live owner holds it.
    async fn try_acquire(&self, owner: &str, ttl_ms: i64) -> Result<AcquireOutcome>;

    /// Release the lease if still held by `owner`.
    async fn release(&self, owner: &str) -> Result<()>;
}

/// Result of a lease acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The caller now owns the lease until the returned expiry.
    Acquired(SyncLease),
    /// Another owner holds an unexpired lease.
    Held(SyncLease),
}

impl AcquireOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired(_))
    }
}
