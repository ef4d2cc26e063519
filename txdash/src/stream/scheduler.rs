use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::transactions::Producer;

/// Default period between two ingestion ticks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Coordinator for the recurring ingestion job.
///
/// Owns one worker task that calls [`Producer::produce_once`] every
/// `interval`. A tick that fails or panics is logged and the next tick runs
/// as scheduled. [`Scheduler::stop`] lets a tick that is already running
/// finish before the worker exits.
///
pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    worker: JoinHandle<()>,
    ticks: Arc<AtomicU64>,
}

impl Scheduler {
    /// Spawns the worker loop. The first tick fires one `interval` after start.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(producer: Arc<Producer>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ticks = Arc::new(AtomicU64::new(0));
        let worker = tokio::spawn(run(producer, interval, shutdown_rx, ticks.clone()));
        tracing::debug!(?interval, "ingestion scheduler started");

        Self {
            shutdown_tx,
            worker,
            ticks,
        }
    }

    /// Number of ticks that have completed, successfully or not.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Stops scheduling new ticks and waits for the worker to exit.
    ///
    /// Returns the final tick count.
    pub async fn stop(self) -> u64 {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.worker.await {
            tracing::error!("ingestion scheduler worker failed: {e}");
        }
        let ticks = self.ticks.load(Ordering::SeqCst);
        tracing::debug!(ticks, "ingestion scheduler stopped");
        ticks
    }
}

async fn run(
    producer: Arc<Producer>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    ticks: Arc<AtomicU64>,
) {
    let mut timer = time::interval_at(Instant::now() + interval, interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = timer.tick() => {}
            // a dropped sender also ends the loop
            _ = shutdown_rx.changed() => break,
        }
        if *shutdown_rx.borrow() {
            break;
        }

        // the tick runs outside the select so shutdown never cancels it
        tick(&producer).await;
        ticks.fetch_add(1, Ordering::SeqCst);
    }
}

async fn tick(producer: &Arc<Producer>) {
    let producer = producer.clone();
    match tokio::task::spawn_blocking(move || producer.produce_once()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::error!("ingestion tick failed: {e}"),
        Err(e) => tracing::error!("ingestion tick panicked: {e}"),
    }
}
