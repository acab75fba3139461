//! Mutation queue types
//!
//! A [`MutationRecord`] is a pending local write that has not yet been
//! confirmed by the remote system. Records are created by the façade on
//! every write call and mutated only by the sync coordinator.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::impl_status_conversions;
use crate::types::now_ms;

/// The remote operation a mutation maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
}

impl_status_conversions!(MutationKind {
    Insert => "insert",
    Update => "update",
    Delete => "delete",
});

/// Lifecycle status of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationStatus {
    /// Waiting to be applied remotely (includes transiently failed records).
    Pending,
    /// Confirmed by the remote system.
    Synced,
    /// Rejected with a validation error; never retried.
    Failed,
    /// Exceeded the retry budget; excluded from automatic batches.
    DeadLettered,
}

impl_status_conversions!(MutationStatus {
    Pending => "pending",
    Synced => "synced",
    Failed => "failed",
    DeadLettered => "dead_lettered",
});

/// A durable record of a local write awaiting remote application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    /// UUIDv7: lexicographic order matches creation order.
    pub id: String,
    /// Remote resource collection the mutation targets.
    pub resource_collection: String,
    pub kind: MutationKind,
    /// Opaque payload; the engine never inspects it beyond the `"id"`
    /// field needed to address Update/Delete operations.
    pub payload: Value,
    /// Caller-supplied correlation id. Mutations sharing an entity key are
    /// applied in creation order even across separate drain batches.
    pub entity_key: Option<String>,
    pub created_at: i64,
    /// Set iff `status == Synced`.
    pub synced_at: Option<i64>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub status: MutationStatus,
}

impl MutationRecord {
    /// Create a fresh pending record with a creation-ordered id.
    pub fn new(
        resource_collection: impl Into<String>,
        kind: MutationKind,
        payload: Value,
        entity_key: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            resource_collection: resource_collection.into(),
            kind,
            payload,
            entity_key,
            created_at: now_ms(),
            synced_at: None,
            attempts: 0,
            last_error: None,
            status: MutationStatus::Pending,
        }
    }

    /// Whether this record still participates in automatic sync batches.
    pub fn is_pending(&self) -> bool {
        self.status == MutationStatus::Pending
    }
}

/// Receipt returned by the façade for every accepted write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteReceipt {
    pub mutation_id: String,
    /// Always true: writes are queued before any network activity.
    pub queued: bool,
    /// Whether a sync trigger was fired alongside the enqueue.
    pub sync_triggered: bool,
}
