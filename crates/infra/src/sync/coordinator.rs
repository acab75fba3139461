//! Sync coordinator: drains the mutation queue against the remote system.
//!
//! One cycle acquires the persisted lease, dequeues bounded batches in
//! creation order, applies each mutation remotely with a per-call timeout,
//! and records the outcome on the queue. Join handles are tracked,
//! cancellation is explicit, and transient failures schedule a capped
//! exponential backoff through the pure state machine in `outpost-core`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use outpost_infra::{SyncCoordinator, SyncCoordinatorConfig};
//!
//! # async fn example() -> outpost_domain::Result<()> {
//! // ... create queue, cache, lease, applier, connectivity receiver ...
//! # let queue = todo!(); // Arc<dyn MutationQueue>
//! # let cache = todo!(); // Arc<dyn CacheStore>
//! # let lease = todo!(); // Arc<dyn SyncLeaseStore>
//! # let applier = todo!(); // Arc<dyn RemoteApplier>
//! # let connectivity_rx = todo!();
//! let mut coordinator = SyncCoordinator::new(
//!     queue,
//!     cache,
//!     lease,
//!     applier,
//!     connectivity_rx,
//!     SyncCoordinatorConfig::default(),
//! );
//!
//! coordinator.start()?;
//! coordinator.trigger_sync();
//! // ... application runs ...
//! coordinator.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use outpost_core::{
    AcquireOutcome, BackoffSchedule, CacheStore, MutationQueue, SyncLeaseStore, SyncStateMachine,
};
use outpost_domain::{
    now_ms, ConnectivityState, EngineConfig, EngineError, MutationRecord, Result, SyncCycleError,
    SyncCycleResult,
};
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::sync::errors::SyncError;

/// Configuration for the sync coordinator.
#[derive(Debug, Clone)]
pub struct SyncCoordinatorConfig {
    /// Maximum number of mutations applied per batch
    pub batch_size: usize,
    /// Periodic trigger interval; zero disables the timer
    pub sync_interval: Duration,
    /// Timeout for a single remote apply call
    pub call_timeout: Duration,
    /// Maximum batches drained per cycle
    pub iteration_cap: usize,
    /// Lifetime of the persisted sync lease
    pub lease_ttl_ms: i64,
    /// Backoff schedule after transient failures
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl Default for SyncCoordinatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            sync_interval: Duration::from_secs(300),
            call_timeout: Duration::from_secs(15),
            iteration_cap: 10,
            lease_ttl_ms: 60_000,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 300_000,
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&EngineConfig> for SyncCoordinatorConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            batch_size: config.queue.max_batch_size,
            sync_interval: Duration::from_secs(config.sync.interval_secs),
            call_timeout: Duration::from_millis(config.sync.call_timeout_ms),
            iteration_cap: config.sync.iteration_cap as usize,
            lease_ttl_ms: config.sync.lease_ttl_ms,
            backoff_base_ms: config.sync.backoff_base_ms,
            backoff_cap_ms: config.sync.backoff_cap_ms,
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Interface for applying one queued mutation to the remote system.
#[async_trait]
pub trait RemoteApplier: Send + Sync {
    async fn apply(&self, record: &MutationRecord) -> std::result::Result<(), SyncError>;
}

/// Everything a cycle needs, bundled so the background task owns one clone.
#[derive(Clone)]
struct CycleContext {
    queue: Arc<dyn MutationQueue>,
    cache: Arc<dyn CacheStore>,
    lease: Arc<dyn SyncLeaseStore>,
    applier: Arc<dyn RemoteApplier>,
    owner: String,
    config: SyncCoordinatorConfig,
}

struct CycleReport {
    result: SyncCycleResult,
    /// Drives backoff; permanent rejections alone do not retrigger retry.
    had_transient: bool,
}

/// Sync coordinator with explicit lifecycle management.
pub struct SyncCoordinator {
    ctx: CycleContext,
    connectivity_rx: watch::Receiver<ConnectivityState>,
    trigger: Arc<Notify>,
    results_tx: broadcast::Sender<SyncCycleResult>,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl SyncCoordinator {
    pub fn new(
        queue: Arc<dyn MutationQueue>,
        cache: Arc<dyn CacheStore>,
        lease: Arc<dyn SyncLeaseStore>,
        applier: Arc<dyn RemoteApplier>,
        connectivity_rx: watch::Receiver<ConnectivityState>,
        config: SyncCoordinatorConfig,
    ) -> Self {
        let (results_tx, _) = broadcast::channel(32);
        Self {
            ctx: CycleContext {
                queue,
                cache,
                lease,
                applier,
                owner: Uuid::new_v4().to_string(),
                config,
            },
            connectivity_rx,
            trigger: Arc::new(Notify::new()),
            results_tx,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Start the coordinator, spawning the background drain task.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(EngineError::Internal("sync coordinator already running".into()));
        }

        info!(owner = %self.ctx.owner, "starting sync coordinator");

        self.cancellation = CancellationToken::new();
        let ctx = self.ctx.clone();
        let connectivity_rx = self.connectivity_rx.clone();
        let trigger = Arc::clone(&self.trigger);
        let results_tx = self.results_tx.clone();
        let cancel = self.cancellation.clone();

        let handle = tokio::spawn(async move {
            Self::run_loop(ctx, connectivity_rx, trigger, results_tx, cancel).await;
        });

        self.task_handle = Some(handle);
        Ok(())
    }

    /// Stop the coordinator and wait for the drain task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Err(EngineError::Internal("sync coordinator not running".into()));
        }

        info!("stopping sync coordinator");
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(self.ctx.config.join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "coordinator task panicked");
                    return Err(EngineError::Internal("coordinator task panicked".into()));
                }
                Err(_) => {
                    warn!("coordinator task did not complete within join timeout");
                    return Err(EngineError::Internal("coordinator join timeout".into()));
                }
            }
        }

        info!("sync coordinator stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when the background task is active.
    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    /// Request a sync cycle without waiting for it. Coalesces with any
    /// already-pending trigger; a no-op while a cycle is in flight.
    pub fn trigger_sync(&self) {
        self.trigger.notify_one();
    }

    /// Subscribe to cycle results.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncCycleResult> {
        self.results_tx.subscribe()
    }

    async fn run_loop(
        ctx: CycleContext,
        mut connectivity_rx: watch::Receiver<ConnectivityState>,
        trigger: Arc<Notify>,
        results_tx: broadcast::Sender<SyncCycleResult>,
        cancel: CancellationToken,
    ) {
        let mut machine = SyncStateMachine::new(BackoffSchedule::new(
            ctx.config.backoff_base_ms,
            ctx.config.backoff_cap_ms,
        ));
        let mut backoff_until: Option<Instant> = None;
        let mut connectivity_open = true;

        loop {
            let interval = ctx.config.sync_interval;
            let wake = async {
                match backoff_until {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None if interval.is_zero() => std::future::pending().await,
                    None => tokio::time::sleep(interval).await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("coordinator loop cancelled");
                    machine.cancel();
                    break;
                }
                _ = trigger.notified() => {}
                changed = connectivity_rx.changed(), if connectivity_open => {
                    if changed.is_err() {
                        // Monitor gone; keep running on timer and triggers.
                        connectivity_open = false;
                        continue;
                    }
                    let state = *connectivity_rx.borrow_and_update();
                    if state.is_online {
                        machine.connectivity_restored();
                        backoff_until = None;
                    } else {
                        debug!("connectivity lost, pausing sync");
                        continue;
                    }
                }
                _ = wake => {
                    backoff_until = None;
                }
            }

            if !connectivity_rx.borrow().is_online {
                debug!("sync trigger ignored while offline");
                continue;
            }
            if !machine.begin_cycle() {
                continue;
            }

            let cycle_outcome = Self::run_cycle(&ctx).await;
            // Triggers that arrived while the cycle ran are satisfied by
            // it; consume the coalesced permit so it does not fire a
            // spurious empty cycle.
            let _ = trigger.notified().now_or_never();

            match cycle_outcome {
                Ok(Some(report)) => {
                    match machine.complete_cycle(report.had_transient) {
                        Some(delay) => {
                            debug!(
                                delay_ms = delay.as_millis() as u64,
                                "scheduling retry backoff"
                            );
                            backoff_until = Some(Instant::now() + delay);
                        }
                        // A clean cycle retires any stale retry deadline.
                        None => backoff_until = None,
                    }
                    // Nobody listening is fine.
                    let _ = results_tx.send(report.result);
                }
                Ok(None) => {
                    // Another context holds the lease; nothing to report.
                    machine.complete_cycle(false);
                }
                Err(err) => {
                    error!(error = %err, "sync cycle failed");
                    if let Some(delay) = machine.complete_cycle(true) {
                        backoff_until = Some(Instant::now() + delay);
                    }
                }
            }
        }
    }

    /// Run one guarded cycle. Returns `None` when another live owner holds
    /// the lease, in which case no result is emitted.
    async fn run_cycle(ctx: &CycleContext) -> Result<Option<CycleReport>> {
        match ctx.lease.try_acquire(&ctx.owner, ctx.config.lease_ttl_ms).await? {
            AcquireOutcome::Acquired(_) => {}
            AcquireOutcome::Held(holder) => {
                debug!(holder = %holder.owner, "sync lease held elsewhere, skipping cycle");
                return Ok(None);
            }
        }

        let outcome = Self::drain(ctx).await;

        if let Err(err) = ctx.lease.release(&ctx.owner).await {
            warn!(error = %err, "failed to release sync lease");
        }

        outcome.map(Some)
    }

    /// Drain bounded batches until the queue is empty, a failure interrupts
    /// ordering, or the iteration cap is reached.
    async fn drain(ctx: &CycleContext) -> Result<CycleReport> {
        let started_at = now_ms();
        let mut succeeded = 0_u32;
        let mut failed = 0_u32;
        let mut errors: Vec<SyncCycleError> = Vec::new();
        let mut had_transient = false;

        // Entity keys with an unresolved transient failure this cycle;
        // applying a younger record for one of these would reorder writes.
        let mut blocked_entities: HashSet<String> = HashSet::new();

        'batches: for _ in 0..ctx.config.iteration_cap.max(1) {
            let batch = ctx.queue.dequeue_batch(ctx.config.batch_size).await?;
            if batch.is_empty() {
                break;
            }

            debug!(count = batch.len(), "processing sync batch");
            let mut batch_had_transient = false;

            for record in &batch {
                if let Some(key) = &record.entity_key {
                    if blocked_entities.contains(key) {
                        debug!(
                            mutation_id = %record.id,
                            entity_key = %key,
                            "held back behind an unresolved mutation for the same entity"
                        );
                        continue;
                    }
                }

                // Each apply can run up to the call timeout; renew the
                // lease first so a slow call cannot let another context
                // take over mid-batch. Same-owner acquisition extends
                // the expiry.
                match ctx.lease.try_acquire(&ctx.owner, ctx.config.lease_ttl_ms).await? {
                    AcquireOutcome::Acquired(_) => {}
                    AcquireOutcome::Held(holder) => {
                        warn!(
                            holder = %holder.owner,
                            "sync lease lost mid-cycle, stopping drain"
                        );
                        break 'batches;
                    }
                }

                let apply_result = match tokio::time::timeout(
                    ctx.config.call_timeout,
                    ctx.applier.apply(record),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(SyncError::Timeout(ctx.config.call_timeout)),
                };

                match apply_result {
                    Ok(()) => {
                        ctx.queue.mark_synced(&record.id).await?;
                        succeeded = succeeded.saturating_add(1);
                        // The remote copy changed; cached reads of this
                        // resource type are no longer trustworthy.
                        if let Err(err) =
                            ctx.cache.invalidate_resource_type(&record.resource_collection).await
                        {
                            warn!(
                                resource_type = %record.resource_collection,
                                error = %err,
                                "cache invalidation failed"
                            );
                        }
                    }
                    Err(err) => {
                        let retry = err.should_retry();
                        warn!(
                            mutation_id = %record.id,
                            error = %err,
                            retryable = retry,
                            "applying mutation failed"
                        );
                        ctx.queue
                            .mark_failed(&record.id, &truncate_reason(&err.to_string()), !retry)
                            .await?;
                        failed = failed.saturating_add(1);
                        errors.push(SyncCycleError {
                            mutation_id: record.id.clone(),
                            message: err.to_string(),
                        });
                        if retry {
                            had_transient = true;
                            batch_had_transient = true;
                            if let Some(key) = &record.entity_key {
                                blocked_entities.insert(key.clone());
                            }
                        }
                    }
                }
            }

            // A transiently failed record is still pending; draining again
            // now would re-apply it without any backoff.
            if batch_had_transient || batch.len() < ctx.config.batch_size {
                break;
            }
        }

        let result =
            SyncCycleResult { started_at, finished_at: now_ms(), succeeded, failed, errors };
        info!(
            succeeded = result.succeeded,
            failed = result.failed,
            "sync cycle completed"
        );
        Ok(CycleReport { result, had_transient })
    }
}

fn truncate_reason(reason: &str) -> String {
    const MAX_LEN: usize = 256;
    if reason.len() <= MAX_LEN {
        return reason.to_string();
    }

    let mut truncated = reason.chars().take(MAX_LEN.saturating_sub(3)).collect::<String>();
    truncated.push_str("...");
    truncated
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("SyncCoordinator dropped while running; cancelling task");
            self.cancellation.cancel();
        }
    }
}
