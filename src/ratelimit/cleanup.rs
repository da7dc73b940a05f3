//! Background sweep that keeps limiter stores bounded.
//!
//! The [`CleanupScheduler`] owns a tokio task that periodically calls
//! [`LimiterRegistry::cleanup_all`]. It has an explicit lifecycle: nothing
//! runs until [`start`](CleanupScheduler::start) is called, and
//! [`stop`](CleanupScheduler::stop) waits for the task to exit.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::registry::LimiterRegistry;
use crate::error::{Result, TurnstileError};

/// Default time between sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

struct RunningSweep {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Periodically removes expired entries from every limiter in a registry.
pub struct CleanupScheduler {
    registry: Arc<LimiterRegistry>,
    interval: Duration,
    running: Mutex<Option<RunningSweep>>,
}

impl std::fmt::Debug for CleanupScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupScheduler")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

impl CleanupScheduler {
    /// Create a stopped scheduler for `registry`.
    pub fn new(registry: Arc<LimiterRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            interval,
            running: Mutex::new(None),
        }
    }

    /// Time between sweeps.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the sweep task on the current tokio runtime.
    ///
    /// The first sweep happens one interval after starting.
    pub fn start(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(TurnstileError::Config(
                "cleanup interval must be greater than 0".to_string(),
            ));
        }

        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|sweep| !sweep.handle.is_finished()) {
            return Err(TurnstileError::Scheduler(
                "cleanup scheduler is already running".to_string(),
            ));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            TurnstileError::Scheduler(format!("no tokio runtime available: {}", e))
        })?;

        let interval = self.interval;
        let first_sweep = Instant::now().checked_add(interval).ok_or_else(|| {
            TurnstileError::Config(format!(
                "cleanup interval of {}s is too large",
                interval.as_secs()
            ))
        })?;

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(&self.registry);

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(first_sweep, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sweep(&registry);
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("Cleanup task exiting");
        });

        info!(interval_secs = interval.as_secs(), "Cleanup scheduler started");
        *running = Some(RunningSweep { shutdown, handle });
        Ok(())
    }

    /// Stop the sweep task and wait for it to finish.
    ///
    /// Stopping a scheduler that is not running does nothing.
    pub async fn stop(&self) {
        let sweep = self.running.lock().take();
        let Some(sweep) = sweep else {
            return;
        };

        // The task may already be gone; the join below reports that.
        let _ = sweep.shutdown.send(true);

        if let Err(e) = sweep.handle.await {
            warn!(error = %e, "Cleanup task ended abnormally");
        }

        info!("Cleanup scheduler stopped");
    }

    /// Whether the sweep task is alive.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|sweep| !sweep.handle.is_finished())
    }

    /// Run one sweep right now, independent of the background task.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_once(&self) -> usize {
        sweep(&self.registry)
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        if let Some(sweep) = self.running.get_mut().take() {
            sweep.handle.abort();
        }
    }
}

fn sweep(registry: &LimiterRegistry) -> usize {
    let removed = registry.cleanup_all();
    debug!(
        removed = removed,
        remaining = registry.entry_count(),
        "Cleanup sweep finished"
    );
    removed
}
