//! Periodic sweep lifecycle
//!
//! A [`Sweep`] is one pass of a background check. [`PeriodicSweep::start`]
//! drives it on a fixed interval and hands back a [`SweepHandle`] whose
//! `stop()` cancels the timer and waits for an in-flight pass to finish.
//! Tests call `run_once` directly instead of waiting on the clock.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::metrics;

/// One pass of a periodic background check
#[async_trait]
pub trait Sweep: Send + Sync {
    /// Stable name used in logs and metric labels
    fn name(&self) -> &'static str;

    async fn run_once(&self) -> Result<()>;
}

/// Run one pass, recording its outcome
///
/// Errors are logged and counted here and never escape; the next tick is the
/// retry.
pub async fn run_and_record(sweep: &dyn Sweep) {
    let started = Instant::now();
    let outcome = sweep.run_once().await;
    let elapsed = started.elapsed().as_secs_f64();

    metrics::record_sweep(sweep.name(), elapsed, outcome.is_ok());

    match outcome {
        Ok(()) => debug!(sweep = sweep.name(), elapsed_secs = elapsed, "Sweep completed"),
        Err(e) => error!(sweep = sweep.name(), error = %e, "Sweep failed"),
    }
}

/// Timer loop driving a [`Sweep`]
pub struct PeriodicSweep {
    sweep: Arc<dyn Sweep>,
    period: Duration,
    shutdown: watch::Receiver<bool>,
}

impl PeriodicSweep {
    /// Spawn the loop; the first pass runs one full `period` after start
    pub fn start(sweep: Arc<dyn Sweep>, period: Duration) -> SweepHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let name = sweep.name();

        let task = tokio::spawn(
            Self {
                sweep,
                period,
                shutdown: shutdown_rx,
            }
            .run(),
        );

        SweepHandle {
            name,
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(mut self) {
        let name = self.sweep.name();
        info!(
            sweep = name,
            interval_ms = self.period.as_millis() as u64,
            "Starting periodic sweep"
        );

        let mut ticker = interval_at(tokio::time::Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                // Fires on stop() and when the handle is dropped
                _ = self.shutdown.changed() => break,
                _ = ticker.tick() => run_and_record(self.sweep.as_ref()).await,
            }
        }

        info!(sweep = name, "Periodic sweep stopped");
    }
}

/// Owner of a running sweep task
///
/// Dropping the handle also ends the loop, but only `stop()` waits for it.
pub struct SweepHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancel the timer and wait for the loop to exit
    pub async fn stop(self) {
        // The receiver is gone only if the task already ended
        let _ = self.shutdown.send(true);

        if let Err(e) = self.task.await {
            warn!(sweep = self.name, error = %e, "Sweep task ended abnormally");
        }
    }
}
