//! Connectivity monitor
//!
//! The host application feeds raw reachability signals through a
//! [`ConnectivityHandle`]; the monitor debounces them and publishes the
//! settled state on a watch channel. A reported state must hold for the
//! debounce window before it is published, so a flapping link does not
//! whipsaw the sync coordinator. Reports matching the published state
//! cancel any pending transition.

use std::time::Duration;

use outpost_domain::{now_ms, ConnectivityState, EngineError, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Cloneable handle the host uses to report raw reachability signals.
#[derive(Clone)]
pub struct ConnectivityHandle {
    reports_tx: mpsc::UnboundedSender<bool>,
}

impl ConnectivityHandle {
    /// Report a raw reachability observation. Never blocks; reports after
    /// the monitor has stopped are dropped.
    pub fn report(&self, is_online: bool) {
        if self.reports_tx.send(is_online).is_err() {
            debug!(is_online, "connectivity report dropped, monitor stopped");
        }
    }
}

/// Debouncing monitor with explicit lifecycle management.
pub struct ConnectivityMonitor {
    state_tx: watch::Sender<ConnectivityState>,
    reports_rx: Option<mpsc::UnboundedReceiver<bool>>,
    handle: ConnectivityHandle,
    debounce: Duration,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl ConnectivityMonitor {
    /// Create a monitor that starts out online. Optimistic by intent: the
    /// first read should attempt a live fetch, and a failed fetch already
    /// falls back to cache.
    pub fn new(debounce: Duration) -> Self {
        let (state_tx, _) = watch::channel(ConnectivityState::online_at(now_ms()));
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        Self {
            state_tx,
            reports_rx: Some(reports_rx),
            handle: ConnectivityHandle { reports_tx },
            debounce,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Handle for the host to feed raw signals into.
    pub fn handle(&self) -> ConnectivityHandle {
        self.handle.clone()
    }

    /// Subscribe to the debounced state.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state_tx.subscribe()
    }

    /// Current debounced state.
    pub fn current(&self) -> ConnectivityState {
        *self.state_tx.borrow()
    }

    /// Start the debounce task.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(EngineError::Internal("connectivity monitor already running".into()));
        }
        let reports_rx = self
            .reports_rx
            .take()
            .ok_or_else(|| EngineError::Internal("connectivity monitor cannot restart".into()))?;

        info!(debounce_ms = self.debounce.as_millis() as u64, "starting connectivity monitor");

        self.cancellation = CancellationToken::new();
        let state_tx = self.state_tx.clone();
        let debounce = self.debounce;
        let cancel = self.cancellation.clone();

        let handle = tokio::spawn(async move {
            Self::monitor_loop(reports_rx, state_tx, debounce, cancel).await;
        });

        self.task_handle = Some(handle);
        Ok(())
    }

    /// Stop the debounce task.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Err(EngineError::Internal("connectivity monitor not running".into()));
        }

        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "monitor task panicked");
                    return Err(EngineError::Internal("monitor task panicked".into()));
                }
                Err(_) => {
                    warn!("monitor task did not complete within timeout");
                    return Err(EngineError::Internal("monitor join timeout".into()));
                }
            }
        }

        info!("connectivity monitor stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    async fn monitor_loop(
        mut reports_rx: mpsc::UnboundedReceiver<bool>,
        state_tx: watch::Sender<ConnectivityState>,
        debounce: Duration,
        cancel: CancellationToken,
    ) {
        // A candidate transition and when it becomes official.
        let mut candidate: Option<(bool, Instant)> = None;

        loop {
            let settle = async {
                match candidate {
                    Some((_, deadline)) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("connectivity loop cancelled");
                    break;
                }
                report = reports_rx.recv() => {
                    let Some(raw) = report else {
                        debug!("all connectivity handles dropped");
                        break;
                    };
                    let published = state_tx.borrow().is_online;
                    if raw == published {
                        // The blip reversed itself inside the window.
                        candidate = None;
                    } else if candidate.map(|(pending, _)| pending) != Some(raw) {
                        candidate = Some((raw, Instant::now() + debounce));
                    }
                    // Repeated reports in the same direction keep the
                    // original deadline.
                }
                _ = settle => {
                    if let Some((is_online, _)) = candidate.take() {
                        let state = if is_online {
                            ConnectivityState::online_at(now_ms())
                        } else {
                            ConnectivityState::offline_at(now_ms())
                        };
                        info!(is_online, "connectivity state changed");
                        let _ = state_tx.send(state);
                    }
                }
            }
        }
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("ConnectivityMonitor dropped while running; cancelling task");
            self.cancellation.cancel();
        }
    }
}
