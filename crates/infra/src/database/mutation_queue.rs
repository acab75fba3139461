//! SQLite-backed mutation queue
//!
//! Records live in the `mutation_queue` collection keyed by their UUIDv7
//! id, so key order equals creation order. The queue is small by design
//! (bounded by retention), so batch selection loads the collection and
//! applies the ordering rules in process, keeping them in one place.

use async_trait::async_trait;
use outpost_core::MutationQueue;
use outpost_domain::{
    now_ms, EngineError, MutationRecord, MutationStatus, Result,
};
use std::collections::HashSet;
use tracing::{debug, warn};

use super::store::{LocalStore, COLLECTION_MUTATIONS};

pub struct SqliteMutationQueue {
    store: LocalStore,
    max_attempts: u32,
}

impl SqliteMutationQueue {
    pub fn new(store: LocalStore, max_attempts: u32) -> Self {
        Self { store, max_attempts: max_attempts.max(1) }
    }

    async fn load_ordered(&self) -> Result<Vec<MutationRecord>> {
        let mut records: Vec<MutationRecord> =
            self.store.get_all(COLLECTION_MUTATIONS).await?;
        records.sort_by(|a, b| {
            a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    async fn load_record(&self, id: &str) -> Result<MutationRecord> {
        self.store
            .get(COLLECTION_MUTATIONS, id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("mutation {id}")))
    }

    async fn save_record(&self, record: &MutationRecord) -> Result<()> {
        self.store.put(COLLECTION_MUTATIONS, &record.id, record).await
    }
}

#[async_trait]
impl MutationQueue for SqliteMutationQueue {
    async fn enqueue(&self, record: &MutationRecord) -> Result<()> {
        self.save_record(record).await?;
        debug!(
            mutation_id = %record.id,
            collection = %record.resource_collection,
            kind = %record.kind,
            "mutation enqueued"
        );
        Ok(())
    }

    async fn dequeue_batch(&self, limit: usize) -> Result<Vec<MutationRecord>> {
        let records = self.load_ordered().await?;

        // An unresolved older record holds back every younger record with
        // the same entity key, so same-entity ordering survives batching.
        let mut blocked_entities: HashSet<String> = HashSet::new();
        let mut batch = Vec::new();

        for record in records {
            match record.status {
                MutationStatus::Synced | MutationStatus::Failed => continue,
                MutationStatus::DeadLettered => {
                    if let Some(key) = &record.entity_key {
                        blocked_entities.insert(key.clone());
                    }
                }
                MutationStatus::Pending => {
                    if let Some(key) = &record.entity_key {
                        if blocked_entities.contains(key) {
                            continue;
                        }
                    }
                    if batch.len() < limit {
                        batch.push(record);
                    } else if let Some(key) = &record.entity_key {
                        // Did not fit this batch; younger same-entity
                        // records must wait for it.
                        blocked_entities.insert(key.clone());
                    }
                }
            }
        }

        Ok(batch)
    }

    async fn mark_synced(&self, id: &str) -> Result<()> {
        let mut record = self.load_record(id).await?;
        if record.status == MutationStatus::Synced {
            return Ok(());
        }

        record.status = MutationStatus::Synced;
        record.synced_at = Some(now_ms());
        record.last_error = None;
        self.save_record(&record).await
    }

    async fn mark_failed(&self, id: &str, error: &str, permanent: bool) -> Result<()> {
        let mut record = self.load_record(id).await?;
        record.attempts = record.attempts.saturating_add(1);
        record.last_error = Some(error.to_string());

        if permanent {
            record.status = MutationStatus::Failed;
            warn!(mutation_id = %id, error = %error, "mutation permanently rejected");
        } else if record.attempts > self.max_attempts {
            record.status = MutationStatus::DeadLettered;
            warn!(
                mutation_id = %id,
                attempts = record.attempts,
                "mutation dead-lettered after exhausting retries"
            );
        } else {
            debug!(
                mutation_id = %id,
                attempts = record.attempts,
                error = %error,
                "mutation failed transiently, will retry"
            );
        }

        self.save_record(&record).await
    }

    async fn pending_count(&self) -> Result<usize> {
        let pending: Vec<MutationRecord> = self
            .store
            .get_all_matching(COLLECTION_MUTATIONS, MutationRecord::is_pending)
            .await?;
        Ok(pending.len())
    }

    async fn dead_lettered(&self) -> Result<Vec<MutationRecord>> {
        let mut records: Vec<MutationRecord> = self
            .store
            .get_all_matching(COLLECTION_MUTATIONS, |r: &MutationRecord| {
                r.status == MutationStatus::DeadLettered
            })
            .await?;
        records.sort_by(|a, b| {
            a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    async fn requeue_dead_lettered(&self, id: &str) -> Result<()> {
        let mut record = self.load_record(id).await?;
        if record.status != MutationStatus::DeadLettered {
            return Err(EngineError::InvalidInput(format!(
                "mutation {id} is {}, not dead_lettered",
                record.status
            )));
        }

        record.status = MutationStatus::Pending;
        record.attempts = 0;
        record.last_error = None;
        self.save_record(&record).await?;
        debug!(mutation_id = %id, "dead-lettered mutation requeued");
        Ok(())
    }

    async fn purge_synced_before(&self, horizon_ms: i64) -> Result<usize> {
        let purgeable: Vec<MutationRecord> = self
            .store
            .get_all_matching(COLLECTION_MUTATIONS, move |r: &MutationRecord| {
                r.status == MutationStatus::Synced
                    && r.synced_at.is_some_and(|at| at < horizon_ms)
            })
            .await?;

        let mut purged = 0;
        for record in &purgeable {
            if self.store.delete(COLLECTION_MUTATIONS, &record.id).await? {
                purged += 1;
            }
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use outpost_domain::MutationKind;
    use serde_json::json;
    use tempfile::TempDir;

    use super::super::manager::StoreManager;
    use super::*;

    async fn setup_queue(max_attempts: u32) -> (SqliteMutationQueue, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager =
            StoreManager::open(temp_dir.path().join("queue.db"), 4).expect("manager created");
        manager.run_migrations().expect("migrations run");
        let store = LocalStore::new(Arc::new(manager));
        (SqliteMutationQueue::new(store, max_attempts), temp_dir)
    }

    fn record(collection: &str, entity: Option<&str>) -> MutationRecord {
        MutationRecord::new(
            collection,
            MutationKind::Insert,
            json!({"id": entity.unwrap_or("x")}),
            entity.map(String::from),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dequeue_returns_creation_order() {
        let (queue, _dir) = setup_queue(5).await;
        let first = record("apps", None);
        let second = record("apps", None);
        let third = record("apps", None);

        for r in [&second, &first, &third] {
            queue.enqueue(r).await.expect("enqueue succeeds");
        }

        let batch = queue.dequeue_batch(10).await.expect("dequeue succeeds");
        let ids: Vec<&str> = batch.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str(), third.id.as_str()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dequeue_respects_limit() {
        let (queue, _dir) = setup_queue(5).await;
        for _ in 0..5 {
            queue.enqueue(&record("apps", None)).await.expect("enqueue succeeds");
        }

        let batch = queue.dequeue_batch(3).await.expect("dequeue succeeds");
        assert_eq!(batch.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dead_lettered_blocks_younger_same_entity() {
        let (queue, _dir) = setup_queue(1).await;
        let older = record("apps", Some("app-1"));
        let younger = record("apps", Some("app-1"));
        let unrelated = record("apps", Some("app-2"));
        for r in [&older, &younger, &unrelated] {
            queue.enqueue(r).await.expect("enqueue succeeds");
        }

        // Two transient failures exhaust a budget of one attempt.
        queue.mark_failed(&older.id, "timeout", false).await.expect("mark failed");
        queue.mark_failed(&older.id, "timeout", false).await.expect("mark failed");

        let batch = queue.dequeue_batch(10).await.expect("dequeue succeeds");
        let ids: Vec<&str> = batch.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![unrelated.id.as_str()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn permanent_failure_does_not_block_entity() {
        let (queue, _dir) = setup_queue(5).await;
        let older = record("apps", Some("app-1"));
        let younger = record("apps", Some("app-1"));
        for r in [&older, &younger] {
            queue.enqueue(r).await.expect("enqueue succeeds");
        }

        queue.mark_failed(&older.id, "validation rejected", true).await.expect("mark failed");

        let batch = queue.dequeue_batch(10).await.expect("dequeue succeeds");
        let ids: Vec<&str> = batch.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![younger.id.as_str()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transient_failure_keeps_record_pending() {
        let (queue, _dir) = setup_queue(5).await;
        let r = record("apps", None);
        queue.enqueue(&r).await.expect("enqueue succeeds");

        queue.mark_failed(&r.id, "503", false).await.expect("mark failed");

        assert_eq!(queue.pending_count().await.expect("count"), 1);
        let batch = queue.dequeue_batch(10).await.expect("dequeue succeeds");
        assert_eq!(batch[0].attempts, 1);
        assert_eq!(batch[0].last_error.as_deref(), Some("503"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_synced_is_idempotent() {
        let (queue, _dir) = setup_queue(5).await;
        let r = record("apps", None);
        queue.enqueue(&r).await.expect("enqueue succeeds");

        queue.mark_synced(&r.id).await.expect("first mark succeeds");
        queue.mark_synced(&r.id).await.expect("second mark is a no-op");

        assert_eq!(queue.pending_count().await.expect("count"), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn requeue_resets_retry_budget() {
        let (queue, _dir) = setup_queue(1).await;
        let r = record("apps", Some("app-1"));
        queue.enqueue(&r).await.expect("enqueue succeeds");
        queue.mark_failed(&r.id, "timeout", false).await.expect("mark failed");
        queue.mark_failed(&r.id, "timeout", false).await.expect("mark failed");

        let dead = queue.dead_lettered().await.expect("dead letter list");
        assert_eq!(dead.len(), 1);

        queue.requeue_dead_lettered(&r.id).await.expect("requeue succeeds");

        let batch = queue.dequeue_batch(10).await.expect("dequeue succeeds");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].attempts, 0);
        assert!(batch[0].last_error.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn requeue_rejects_non_dead_lettered() {
        let (queue, _dir) = setup_queue(5).await;
        let r = record("apps", None);
        queue.enqueue(&r).await.expect("enqueue succeeds");

        let err = queue.requeue_dead_lettered(&r.id).await.expect_err("requeue rejected");
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn purge_removes_only_old_synced_records() {
        let (queue, _dir) = setup_queue(5).await;
        let synced = record("apps", None);
        let pending = record("apps", None);
        for r in [&synced, &pending] {
            queue.enqueue(r).await.expect("enqueue succeeds");
        }
        queue.mark_synced(&synced.id).await.expect("mark synced");

        let purged =
            queue.purge_synced_before(now_ms() + 1_000).await.expect("purge succeeds");
        assert_eq!(purged, 1);
        assert_eq!(queue.pending_count().await.expect("count"), 1);
    }
}
