//! Idle session eviction

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::session::SessionStore;

/// Outcome of one sweep pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Keys present in the snapshot
    pub scanned: usize,
    /// Sessions evicted
    pub removed: usize,
    /// Keys left alone: still active, or gone before removal
    pub skipped: usize,
}

/// Removes sessions idle for longer than a threshold
pub struct SessionSweeper {
    store: Arc<SessionStore>,
    idle_timeout: Duration,
    interval: Duration,
}

impl SessionSweeper {
    /// Default idle threshold (1 hour)
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(3600);
    /// Default pause between background sweeps (5 minutes)
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

    pub fn new(store: Arc<SessionStore>) -> Self {
        Self::with_settings(store, Self::DEFAULT_IDLE_TIMEOUT, Self::DEFAULT_INTERVAL)
    }

    /// Create a sweeper with a custom threshold and interval.
    /// The interval is capped at the idle threshold.
    pub fn with_settings(store: Arc<SessionStore>, idle_timeout: Duration, interval: Duration) -> Self {
        let interval = if interval > idle_timeout {
            warn!(
                "Sweep interval {:?} exceeds idle timeout {:?}; using the idle timeout",
                interval, idle_timeout
            );
            idle_timeout
        } else {
            interval
        };

        Self {
            store,
            idle_timeout,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Create a sweeper from the `[session]` configuration section
    pub fn from_config(store: Arc<SessionStore>, config: &SessionConfig) -> Self {
        Self::with_settings(store, config.idle_timeout(), config.sweep_interval())
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sessions last active at or before this instant are stale
    fn cutoff(&self) -> DateTime<Utc> {
        let now = self.store.clock().now();
        chrono::Duration::from_std(self.idle_timeout)
            .ok()
            .and_then(|idle| now.checked_sub_signed(idle))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Run one pass over a snapshot of the store's keys
    pub fn sweep(&self) -> SweepReport {
        let cutoff = self.cutoff();
        let mut report = SweepReport::default();

        for key in self.store.snapshot_keys() {
            report.scanned += 1;
            if self.store.remove_if_idle(&key, cutoff) {
                report.removed += 1;
                info!(key = %key, "Evicted idle session");
            } else {
                report.skipped += 1;
                debug!(key = %key, "Session active or already gone, skipped");
            }
        }

        if report.removed > 0 {
            info!(
                "Session sweep removed {} of {} sessions",
                report.removed, report.scanned
            );
        }
        report
    }

    /// Start sweeping in the background every `interval`
    pub fn start(self: Arc<Self>) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

        let handle = tokio::spawn(async move {
            info!(
                "Session sweeper started (idle timeout {:?}, interval {:?})",
                self.idle_timeout, self.interval
            );

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Session sweeper stopping");
                        break;
                    }
                }
            }
        });

        SweeperHandle { shutdown_tx, handle }
    }
}

/// Handle to a running background sweeper
pub struct SweeperHandle {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to finish
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }
}
