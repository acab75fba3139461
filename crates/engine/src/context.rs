//! Engine context - dependency injection container

use std::sync::Arc;
use std::time::Duration;

use outpost_core::{CacheStore, MutationQueue, SyncLeaseStore};
use outpost_domain::{
    ConnectivityState, EngineConfig, EngineError, MutationRecord, Result, SyncCycleResult,
};
use outpost_infra::{
    ConnectivityHandle, ConnectivityMonitor, LocalStore, RemoteClient, RemoteClientConfig,
    RetentionConfig, RetentionSweeper, SqliteCacheStore, SqliteMutationQueue, SqliteSyncLease,
    StoreManager, SweepStats, SyncCoordinator, SyncCoordinatorConfig,
};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{info, warn};

/// Engine context - holds all components and their lifecycles.
///
/// Construction wires everything against a single durable store; `start`
/// brings the background workers up and `shutdown` tears them down in
/// reverse order. The context is cheap to share behind an `Arc`.
pub struct EngineContext {
    config: EngineConfig,
    store_manager: Arc<StoreManager>,
    queue: Arc<dyn MutationQueue>,
    cache: Arc<dyn CacheStore>,
    connectivity_rx: watch::Receiver<ConnectivityState>,
    connectivity_handle: ConnectivityHandle,
    monitor: Mutex<ConnectivityMonitor>,
    coordinator: Mutex<SyncCoordinator>,
    sweeper: Mutex<RetentionSweeper>,
}

impl EngineContext {
    /// Wire the full engine from configuration. Opens (or creates) the
    /// durable store and runs migrations; nothing is running yet.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let store_manager = Arc::new(StoreManager::open(
            &config.database.path,
            config.database.pool_size,
        )?);
        store_manager.run_migrations()?;

        let store = LocalStore::new(Arc::clone(&store_manager));
        let queue: Arc<dyn MutationQueue> =
            Arc::new(SqliteMutationQueue::new(store.clone(), config.queue.max_attempts));
        let cache: Arc<dyn CacheStore> = Arc::new(SqliteCacheStore::new(store));
        let lease: Arc<dyn SyncLeaseStore> =
            Arc::new(SqliteSyncLease::new(Arc::clone(&store_manager)));

        let applier = RemoteClient::with_config(RemoteClientConfig {
            base_url: config.remote.base_url.clone(),
            bearer_token: config.remote.bearer_token.clone(),
            timeout: Duration::from_millis(config.sync.call_timeout_ms),
        })
        .map_err(|e| EngineError::Config(e.to_string()))?;

        let monitor =
            ConnectivityMonitor::new(Duration::from_millis(config.connectivity.debounce_ms));
        let connectivity_rx = monitor.subscribe();
        let connectivity_handle = monitor.handle();

        let coordinator = SyncCoordinator::new(
            Arc::clone(&queue),
            Arc::clone(&cache),
            lease,
            Arc::new(applier),
            monitor.subscribe(),
            SyncCoordinatorConfig::from(&config),
        );

        let sweeper = RetentionSweeper::new(
            Arc::clone(&queue),
            Arc::clone(&cache),
            RetentionConfig {
                queue_retention_days: config.queue.retention_days,
                cache_grace_ms: config.cache.expired_grace_ms,
                sweep_interval: Duration::from_secs(config.sync.sweep_interval_secs),
            },
        );

        Ok(Self {
            config,
            store_manager,
            queue,
            cache,
            connectivity_rx,
            connectivity_handle,
            monitor: Mutex::new(monitor),
            coordinator: Mutex::new(coordinator),
            sweeper: Mutex::new(sweeper),
        })
    }

    /// Start the connectivity monitor, sync coordinator, and retention
    /// sweeper.
    pub async fn start(&self) -> Result<()> {
        info!("starting engine");
        self.monitor.lock().await.start()?;
        self.coordinator.lock().await.start()?;
        self.sweeper.lock().await.start()?;
        info!("engine started");
        Ok(())
    }

    /// Stop all background workers. Best-effort: a worker that fails to
    /// stop is logged and the rest are still torn down.
    pub async fn shutdown(&self) {
        info!("shutting down engine");
        if let Err(err) = self.sweeper.lock().await.stop().await {
            warn!(error = %err, "retention sweeper did not stop cleanly");
        }
        if let Err(err) = self.coordinator.lock().await.stop().await {
            warn!(error = %err, "sync coordinator did not stop cleanly");
        }
        if let Err(err) = self.monitor.lock().await.stop().await {
            warn!(error = %err, "connectivity monitor did not stop cleanly");
        }
        info!("engine stopped");
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store_manager(&self) -> &Arc<StoreManager> {
        &self.store_manager
    }

    pub(crate) fn queue(&self) -> &Arc<dyn MutationQueue> {
        &self.queue
    }

    pub(crate) fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Handle for the host to report raw reachability signals.
    pub fn connectivity_handle(&self) -> ConnectivityHandle {
        self.connectivity_handle.clone()
    }

    /// Current debounced connectivity state.
    pub fn connectivity(&self) -> ConnectivityState {
        *self.connectivity_rx.borrow()
    }

    /// Subscribe to debounced connectivity changes.
    pub fn subscribe_connectivity(&self) -> watch::Receiver<ConnectivityState> {
        self.connectivity_rx.clone()
    }

    /// Request a sync cycle without waiting for it.
    pub async fn trigger_sync(&self) {
        self.coordinator.lock().await.trigger_sync();
    }

    /// Subscribe to sync cycle results.
    pub async fn subscribe_cycles(&self) -> broadcast::Receiver<SyncCycleResult> {
        self.coordinator.lock().await.subscribe()
    }

    /// Number of mutations still awaiting remote application.
    pub async fn pending_count(&self) -> Result<usize> {
        self.queue.pending_count().await
    }

    /// Mutations that exhausted their retry budget.
    pub async fn dead_lettered(&self) -> Result<Vec<MutationRecord>> {
        self.queue.dead_lettered().await
    }

    /// Put a dead-lettered mutation back in line with a fresh budget.
    pub async fn requeue_dead_lettered(&self, id: &str) -> Result<()> {
        self.queue.requeue_dead_lettered(id).await
    }

    /// Run a retention sweep immediately.
    pub async fn run_sweep_once(&self) -> Result<SweepStats> {
        let sweeper = self.sweeper.lock().await;
        sweeper.run_once().await
    }
}
