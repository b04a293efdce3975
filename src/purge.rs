//! Background purge of expired files.
//!
//! Every tick walks the whole metadata root and removes the content, the
//! preview and the record of every file whose deletion time has passed.
//! There is no schedule to persist: a restart simply resumes sweeping.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::datetime::format_duration;
use crate::file::storage::METADATA_EXTENSION;
use crate::file::MetadataStore;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Records looked at.
    pub scanned: usize,
    /// Files removed.
    pub purged: usize,
    /// Expired files that could not be removed.
    pub failed: usize,
}

/// Count of sweeps currently running.
#[derive(Debug, Default)]
pub struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    /// Register a running sweep until the guard is dropped.
    pub fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            owner: Arc::clone(self),
        }
    }

    /// Number of running sweeps.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait until no sweep is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Marks one running sweep.
#[derive(Debug)]
pub struct InFlightGuard {
    owner: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.owner.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.owner.idle.notify_waiters();
        }
    }
}

/// Periodic sweeper over a metadata store.
#[derive(Debug, Clone)]
pub struct PurgeEngine {
    store: MetadataStore,
    frequency: Duration,
}

impl PurgeEngine {
    /// Create an engine sweeping every `frequency`.
    pub fn new(store: MetadataStore, frequency: Duration) -> Self {
        Self { store, frequency }
    }

    /// Run one full sweep as of `now`.
    pub fn sweep(&self, now: DateTime<Utc>) -> PurgeReport {
        self.sweep_until(now, || false)
    }

    /// Run one sweep, checking `stopping` between records.
    fn sweep_until<F>(&self, now: DateTime<Utc>, stopping: F) -> PurgeReport
    where
        F: Fn() -> bool,
    {
        let meta_root = self.store.layout().meta_root();
        let mut report = PurgeReport::default();
        info!("Checking metadata for files to purge ({})", now);

        for entry in WalkDir::new(meta_root).follow_links(false) {
            if stopping() {
                info!("Purge interrupted by shutdown");
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    error!("Failed to scan {}: {}", meta_root.display(), e);
                    break;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|e| e.to_str()) != Some(METADATA_EXTENSION) {
                continue;
            }
            let Some(filename) = self.store.layout().filename_from_record_path(entry.path()) else {
                continue;
            };

            report.scanned += 1;
            let record = self.store.find(&filename);
            let Some(delete_at) = record.delete_at else {
                debug!("File {} is not marked for deletion", filename);
                continue;
            };
            if now < delete_at {
                debug!("File {} should be purged on {}", filename, delete_at);
                continue;
            }

            if let Err(e) = self.store.delete_content(&record) {
                error!("Failed to delete content for {}: {}", filename, e);
                report.failed += 1;
                continue;
            }
            if let Err(e) = self.store.delete(&record) {
                error!("Failed to delete metadata for {}: {}", filename, e);
                report.failed += 1;
                continue;
            }
            info!("Deleted {}", filename);
            report.purged += 1;
        }

        report
    }

    /// Start sweeping in the background.
    ///
    /// The first sweep happens one interval after the start.
    pub fn start(self) -> PurgeHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let in_flight = Arc::new(InFlight::default());
        let task = tokio::spawn(self.run(stop_rx, Arc::clone(&in_flight)));

        PurgeHandle {
            stop: stop_tx,
            in_flight,
            task,
        }
    }

    async fn run(self, mut stop: watch::Receiver<bool>, in_flight: Arc<InFlight>) {
        info!("Running purge job every {}", format_duration(self.frequency));

        let mut timer = interval_at(Instant::now() + self.frequency, self.frequency);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.changed() => {
                    info!("Stopping purge job");
                    break;
                }
                _ = timer.tick() => {
                    if *stop.borrow() {
                        break;
                    }
                    let guard = in_flight.enter();
                    let engine = self.clone();
                    let stop_signal = stop.clone();
                    let result = tokio::task::spawn_blocking(move || {
                        let _guard = guard;
                        engine.sweep_until(Utc::now(), || *stop_signal.borrow())
                    })
                    .await;

                    match result {
                        Ok(report) if report.purged > 0 || report.failed > 0 => {
                            info!(
                                "Purge done: {} scanned, {} purged, {} failed",
                                report.scanned, report.purged, report.failed
                            );
                        }
                        Ok(report) => debug!("Purge done: {} scanned, nothing to purge", report.scanned),
                        Err(e) => error!("Purge sweep aborted: {}", e),
                    }
                }
            }
        }
    }
}

/// Handle to a running purge loop.
#[derive(Debug)]
pub struct PurgeHandle {
    stop: watch::Sender<bool>,
    in_flight: Arc<InFlight>,
    task: JoinHandle<()>,
}

impl PurgeHandle {
    /// Number of sweeps running right now (0 or 1).
    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    /// Signal the loop to stop, wait for the running sweep, then join.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        self.in_flight.wait_idle().await;
        if let Err(e) = self.task.await {
            error!("Purge task failed: {}", e);
        }
        info!("Purge job stopped");
    }
}
