//! Retention sweeper for storage management
//!
//! Periodically purges synced mutations past their retention horizon and
//! cache entries expired beyond the stale-fallback grace window. Pending,
//! failed, and dead-lettered mutations are never touched; fresh and
//! recently expired cache entries survive the sweep.

use std::sync::Arc;
use std::time::Duration;

use outpost_core::{CacheStore, MutationQueue};
use outpost_domain::{now_ms, EngineError, Result};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Configuration for the retention sweeper
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Retention period for synced mutations (days)
    pub queue_retention_days: u32,
    /// Grace window an expired cache entry survives as stale fallback
    pub cache_grace_ms: i64,
    /// Sweep interval
    pub sweep_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            queue_retention_days: 7,
            cache_grace_ms: 86_400_000,
            sweep_interval: Duration::from_secs(3_600),
        }
    }
}

/// Statistics from one sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepStats {
    pub mutations_purged: usize,
    pub cache_entries_removed: usize,
    pub duration_secs: f64,
}

/// Background retention sweeper with lifecycle management
pub struct RetentionSweeper {
    queue: Arc<dyn MutationQueue>,
    cache: Arc<dyn CacheStore>,
    config: RetentionConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl RetentionSweeper {
    pub fn new(
        queue: Arc<dyn MutationQueue>,
        cache: Arc<dyn CacheStore>,
        config: RetentionConfig,
    ) -> Self {
        Self {
            queue,
            cache,
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Start the sweeper, spawning the periodic background task.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(EngineError::Internal("retention sweeper already running".into()));
        }

        info!(interval_secs = self.config.sweep_interval.as_secs(), "starting retention sweeper");

        self.cancellation = CancellationToken::new();
        let queue = Arc::clone(&self.queue);
        let cache = Arc::clone(&self.cache);
        let config = self.config.clone();
        let cancel = self.cancellation.clone();

        let handle = tokio::spawn(async move {
            Self::sweep_loop(queue, cache, config, cancel).await;
        });

        self.task_handle = Some(handle);
        Ok(())
    }

    /// Stop the sweeper and wait for the background task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Err(EngineError::Internal("retention sweeper not running".into()));
        }

        info!("stopping retention sweeper");
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "sweeper task panicked");
                    return Err(EngineError::Internal("sweeper task panicked".into()));
                }
                Err(_) => {
                    warn!("sweeper task did not complete within timeout");
                    return Err(EngineError::Internal("sweeper join timeout".into()));
                }
            }
        }

        info!("retention sweeper stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    /// Run one sweep immediately. Useful for manual maintenance and tests.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<SweepStats> {
        Self::sweep(&self.queue, &self.cache, &self.config).await
    }

    async fn sweep(
        queue: &Arc<dyn MutationQueue>,
        cache: &Arc<dyn CacheStore>,
        config: &RetentionConfig,
    ) -> Result<SweepStats> {
        let start = std::time::Instant::now();
        let now = now_ms();
        let horizon = now - i64::from(config.queue_retention_days) * 86_400_000;

        let mutations_purged = queue.purge_synced_before(horizon).await?;
        let cache_entries_removed = cache.sweep_expired(now, config.cache_grace_ms).await?;

        let stats = SweepStats {
            mutations_purged,
            cache_entries_removed,
            duration_secs: start.elapsed().as_secs_f64(),
        };

        info!(
            mutations = stats.mutations_purged,
            cache_entries = stats.cache_entries_removed,
            "retention sweep completed"
        );
        Ok(stats)
    }

    async fn sweep_loop(
        queue: Arc<dyn MutationQueue>,
        cache: Arc<dyn CacheStore>,
        config: RetentionConfig,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("retention loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.sweep_interval) => {
                    if let Err(err) = Self::sweep(&queue, &cache, &config).await {
                        warn!(error = %err, "periodic retention sweep failed");
                    }
                }
            }
        }
    }
}

impl Drop for RetentionSweeper {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("RetentionSweeper dropped while running; cancelling task");
            self.cancellation.cancel();
        }
    }
}
