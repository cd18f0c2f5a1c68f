//! Run loop: repeated cycles, progress bookkeeping and graceful shutdown.

use crate::error::Result;
use crate::metrics::format_duration;
use crate::progress::{ProgressStore, Watermark};
use crate::sync::CycleRunner;
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Stop-after-this-cycle flag, safe to trigger from a signal task.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<ShutdownInner>,
}

#[derive(Debug, Default)]
struct ShutdownInner {
    requested: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    /// New, untriggered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake the loop if it is sleeping.
    pub fn trigger(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }

    /// Whether shutdown was requested.
    pub fn is_triggered(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Wait until shutdown is requested.
    pub async fn wait(&self) {
        while !self.is_triggered() {
            self.inner.notify.notified().await;
        }
    }

    /// Trigger on Ctrl-C (and SIGTERM on unix).
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let shutdown = self.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("Shutdown requested, stopping after the current cycle");
            shutdown.trigger();
        })
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Run loop settings.
#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    /// Pause between cycles
    pub interval: Duration,
    /// Stop after the first idle cycle
    pub exit_on_completion: bool,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown was requested
    Interrupted,
    /// A cycle applied no rows and exit-on-completion is set
    CaughtUp,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Cycles completed
    pub cycles: u64,
    /// Why the loop stopped
    pub reason: StopReason,
    /// Watermark of the last completed cycle
    pub watermark: Watermark,
}

/// Drives cycles until shutdown or, optionally, until caught up.
pub struct RunLoop<R, P> {
    runner: R,
    store: P,
    settings: RunSettings,
    shutdown: Shutdown,
}

impl<R: CycleRunner, P: ProgressStore> RunLoop<R, P> {
    /// Create a run loop.
    pub fn new(runner: R, store: P, settings: RunSettings, shutdown: Shutdown) -> Self {
        Self {
            runner,
            store,
            settings,
            shutdown,
        }
    }

    /// Run until stopped.
    ///
    /// `start_at` overrides the stored watermark; without either, the first
    /// cycle starts from the epoch. Shutdown is only observed between cycles.
    pub async fn run(&mut self, start_at: Option<Watermark>) -> Result<RunOutcome> {
        let mut last_sync = match start_at {
            Some(start_at) => {
                info!("Starting from manual watermark {}", start_at);
                start_at
            }
            None => match self.store.last_watermark().await? {
                Some(watermark) => {
                    info!("Resuming from watermark {}", watermark);
                    watermark
                }
                None => {
                    info!("No previous sync found, starting from the epoch");
                    Watermark::epoch()
                }
            },
        };
        let mut cycles = 0u64;

        loop {
            let started = Watermark::now();
            self.store.begin_cycle(started).await?;
            let stats = self.runner.run_cycle(last_sync).await?;
            let finished = Utc::now();
            self.store.record_cycle(started, finished).await?;

            last_sync = started;
            cycles += 1;
            info!(
                "Cycle {} applied {} rows, next watermark {}",
                cycles,
                stats.total_rows(),
                last_sync
            );

            if self.shutdown.is_triggered() {
                return Ok(self.outcome(cycles, StopReason::Interrupted, last_sync));
            }
            if self.settings.exit_on_completion && stats.is_idle() {
                info!("Follower caught up, exiting");
                return Ok(self.outcome(cycles, StopReason::CaughtUp, last_sync));
            }

            if !self.settings.interval.is_zero() {
                info!("Sleeping {}", format_duration(self.settings.interval));
            }
            tokio::select! {
                biased;
                _ = self.shutdown.wait() => {
                    return Ok(self.outcome(cycles, StopReason::Interrupted, last_sync));
                }
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }
    }

    fn outcome(&self, cycles: u64, reason: StopReason, watermark: Watermark) -> RunOutcome {
        RunOutcome {
            cycles,
            reason,
            watermark,
        }
    }
}
