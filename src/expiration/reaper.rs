//! Scheduled expiration reaper.
//!
//! One tokio task per reaper wakes at a fixed delay and runs a sweep on the
//! blocking pool. Only the shutdown channel ends the schedule: a sweep cut
//! short by its store leaves the flag raised, and the next tick clears it.
//! Stopping signals the task, interrupts a sweep in progress and waits for
//! the task to exit.

use super::manager::{ExpirationManager, SweepStats};
use crate::container::{GridKey, GridValue};
use crate::core::config::ExpirationConfig;
use crate::core::interrupt::InterruptFlag;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of the reaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaperState {
    Stopped,
    Running,
}

struct Scheduled {
    shutdown_tx: watch::Sender<bool>,
    interrupt: InterruptFlag,
    handle: JoinHandle<()>,
}

/// Periodic driver of [`ExpirationManager::process_expiration`].
pub struct ExpirationReaper<K, V> {
    manager: Arc<ExpirationManager<K, V>>,
    config: ExpirationConfig,
    scheduled: Mutex<Option<Scheduled>>,
    sweeps: Arc<AtomicU64>,
    last_sweep: Arc<Mutex<Option<SweepStats>>>,
}

impl<K: GridKey, V: GridValue> ExpirationReaper<K, V> {
    pub fn new(manager: Arc<ExpirationManager<K, V>>, config: &ExpirationConfig) -> Self {
        Self {
            manager,
            config: config.clone(),
            scheduled: Mutex::new(None),
            sweeps: Arc::new(AtomicU64::new(0)),
            last_sweep: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> ReaperState {
        if self.scheduled.lock().is_some() {
            ReaperState::Running
        } else {
            ReaperState::Stopped
        }
    }

    /// Whether a sweep is scheduled.
    pub fn is_running(&self) -> bool {
        self.state() == ReaperState::Running
    }

    /// Sweeps completed by the scheduled task.
    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Acquire)
    }

    pub fn last_sweep(&self) -> Option<SweepStats> {
        self.last_sweep.lock().clone()
    }

    /// Schedule the periodic sweep.
    ///
    /// Returns `Ok(false)` without scheduling anything when reaping is
    /// disabled or the wake-up interval is not positive. Starting a running
    /// reaper is a no-op.
    pub fn start(&self) -> Result<bool> {
        if !self.config.reaper_scheduled() {
            tracing::info!(
                reaper_enabled = self.config.reaper_enabled,
                wake_up_interval_ms = self.config.wake_up_interval_ms,
                "not starting expiration reaper"
            );
            return Ok(false);
        }

        let mut scheduled = self.scheduled.lock();
        if scheduled.is_some() {
            return Ok(true);
        }

        let runtime = tokio::runtime::Handle::try_current()
            .context("expiration reaper requires a tokio runtime")?;
        let period = Duration::from_millis(self.config.wake_up_interval_ms as u64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let interrupt = InterruptFlag::new();
        let handle = runtime.spawn(run_schedule(
            self.manager.clone(),
            period,
            shutdown_rx,
            interrupt.clone(),
            self.sweeps.clone(),
            self.last_sweep.clone(),
        ));

        *scheduled = Some(Scheduled {
            shutdown_tx,
            interrupt,
            handle,
        });
        tracing::info!(
            wake_up_interval_ms = self.config.wake_up_interval_ms,
            "expiration reaper started"
        );
        Ok(true)
    }

    /// Cancel the schedule, interrupting a sweep in progress.
    pub async fn stop(&self) {
        let Some(scheduled) = self.scheduled.lock().take() else {
            return;
        };
        // Signal first so a tick that clears the flag still sees the stop.
        let _ = scheduled.shutdown_tx.send(true);
        scheduled.interrupt.interrupt();

        match tokio::time::timeout(STOP_TIMEOUT, scheduled.handle).await {
            Ok(Ok(())) => tracing::info!("expiration reaper stopped"),
            Ok(Err(e)) => tracing::warn!(error = %e, "expiration reaper task panicked"),
            Err(_) => tracing::warn!("expiration reaper stop timed out"),
        }
    }

    /// Run one sweep on the calling thread, outside the schedule.
    pub fn run_now(&self) -> SweepStats {
        self.manager.process_expiration(&InterruptFlag::new())
    }
}

async fn run_schedule<K: GridKey, V: GridValue>(
    manager: Arc<ExpirationManager<K, V>>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    interrupt: InterruptFlag,
    sweeps: Arc<AtomicU64>,
    last_sweep: Arc<Mutex<Option<SweepStats>>>,
) {
    // Fixed delay: the first sweep runs one period after start.
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if interrupt.clear() {
                    tracing::debug!("clearing interrupt left by the previous sweep");
                }
                if *shutdown_rx.borrow() {
                    break;
                }
                let manager = manager.clone();
                let flag = interrupt.clone();
                match tokio::task::spawn_blocking(move || manager.process_expiration(&flag)).await {
                    Ok(stats) => {
                        if let Some(err) = &stats.purge_error {
                            tracing::warn!(error = %err, "store purge failed during expiration sweep");
                        }
                        *last_sweep.lock() = Some(stats);
                        sweeps.fetch_add(1, Ordering::AcqRel);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "expiration sweep task failed");
                    }
                }
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    tracing::debug!("expiration reaper task exiting");
}
