//! Background reconciliation between the catalog and the video directories.
//!
//! On start the reconciler registers every video it finds and makes sure each
//! has a thumbnail. After that it periodically drops catalog rows whose file
//! has disappeared from every directory. Rows are only dropped on a definitive
//! "does not exist"; I/O errors leave them alone.

use crate::db::Db;
use crate::error::{Result, VidshelfError};
use crate::media::scanner::Scanner;
use crate::media::thumbnail::{ThumbnailGenerator, ThumbnailOutcome};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const GC_CONCURRENCY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerState {
    Startup,
    Idle,
    Scanning,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub files_found: usize,
    pub registered: usize,
    pub thumbnails_created: usize,
    pub thumbnails_failed: usize,
    pub store_errors: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    pub checked: usize,
    pub removed: usize,
    /// Rows kept because their existence could not be established.
    pub unverified: usize,
}

/// Outcome of looking for a catalog entry on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
    Unknown,
}

/// `Absent` only when every directory answered "not found". A directory
/// that is itself missing or unreadable makes the answer `Unknown`.
pub async fn file_presence(dirs: &[PathBuf], filename: &str) -> Presence {
    let mut uncertain = false;

    for dir in dirs {
        match tokio::fs::try_exists(dir.join(filename)).await {
            Ok(true) => return Presence::Present,
            Ok(false) => {
                if !matches!(tokio::fs::try_exists(dir).await, Ok(true)) {
                    debug!("Video directory {:?} is unavailable", dir);
                    uncertain = true;
                }
            }
            Err(e) => {
                warn!("Could not check {:?} in {:?}: {}", filename, dir, e);
                uncertain = true;
            }
        }
    }

    if uncertain {
        Presence::Unknown
    } else {
        Presence::Absent
    }
}

pub struct Reconciler {
    db: Arc<Db>,
    generator: Arc<ThumbnailGenerator>,
    scanner: Arc<Scanner>,
    video_dirs: Arc<Vec<PathBuf>>,
    gc_interval: Duration,
    state: watch::Sender<ReconcilerState>,
}

impl Reconciler {
    pub fn new(
        db: Arc<Db>,
        generator: Arc<ThumbnailGenerator>,
        scanner: Scanner,
        video_dirs: Vec<PathBuf>,
        gc_interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(ReconcilerState::Startup);
        Self {
            db,
            generator,
            scanner: Arc::new(scanner),
            video_dirs: Arc::new(video_dirs),
            gc_interval,
            state,
        }
    }

    pub fn state(&self) -> ReconcilerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReconcilerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ReconcilerState) {
        self.state.send_replace(state);
    }

    /// Registers every video on disk and fills in missing thumbnails.
    /// Stops early, returning what was done so far, once `shutdown` fires.
    pub async fn startup_pass(&self, shutdown: &CancellationToken) -> Result<ScanReport> {
        let scanner = self.scanner.clone();
        let dirs = self.video_dirs.clone();
        let found = tokio::task::spawn_blocking(move || scanner.scan(&dirs))
            .await
            .map_err(|e| VidshelfError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        let mut report = ScanReport {
            files_found: found.len(),
            ..Default::default()
        };

        for video in found {
            if shutdown.is_cancelled() {
                info!("Startup scan interrupted by shutdown");
                break;
            }

            match self
                .generator
                .ensure_thumbnail(&video.path, &video.filename)
                .await
            {
                ThumbnailOutcome::Created => report.thumbnails_created += 1,
                ThumbnailOutcome::Failed => report.thumbnails_failed += 1,
                ThumbnailOutcome::Existing => {}
            }

            match self.db.upsert_video(&video.filename).await {
                Ok(true) => {
                    debug!("Registered {}", video.filename);
                    report.registered += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    error!("Failed to register {} during scan: {}", video.filename, e);
                    report.store_errors += 1;
                }
            }
        }

        Ok(report)
    }

    /// Removes catalog rows whose file is gone from all video directories.
    pub async fn gc_pass(&self) -> Result<GcReport> {
        let filenames = self.db.list_all().await?;
        let dirs = self.video_dirs.clone();

        let checks: Vec<(String, Presence)> = stream::iter(filenames)
            .map(|filename| {
                let dirs = dirs.clone();
                async move {
                    let presence = file_presence(&dirs, &filename).await;
                    (filename, presence)
                }
            })
            .buffer_unordered(GC_CONCURRENCY)
            .collect()
            .await;

        let mut report = GcReport {
            checked: checks.len(),
            ..Default::default()
        };

        for (filename, presence) in checks {
            match presence {
                Presence::Present => {}
                Presence::Unknown => report.unverified += 1,
                Presence::Absent => {
                    if self.db.delete_video(&filename).await? {
                        info!("Removed {} from catalog (file no longer exists)", filename);
                        report.removed += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Spawns the reconciliation loop. It runs until `shutdown` is cancelled;
    /// the wait between GC passes is interrupted by cancellation.
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    async fn run(self, shutdown: CancellationToken) {
        info!("Reconciler started");

        self.set_state(ReconcilerState::Scanning);
        match self.startup_pass(&shutdown).await {
            Ok(report) => info!(
                "Startup scan complete: {} found, {} new, {} thumbnails created, {} failed",
                report.files_found,
                report.registered,
                report.thumbnails_created,
                report.thumbnails_failed
            ),
            Err(e) => error!("Startup scan failed: {}", e),
        }
        self.set_state(ReconcilerState::Idle);

        let mut ticker = tokio::time::interval(self.gc_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.set_state(ReconcilerState::Scanning);
                    match self.gc_pass().await {
                        Ok(report) if report.unverified > 0 => warn!(
                            "Catalog cleanup: {} checked, {} removed, {} kept unverified",
                            report.checked, report.removed, report.unverified
                        ),
                        Ok(report) => info!(
                            "Catalog cleanup: {} checked, {} removed",
                            report.checked, report.removed
                        ),
                        Err(e) => error!("Catalog cleanup failed: {}", e),
                    }
                    self.set_state(ReconcilerState::Idle);
                }
            }
        }

        info!("Reconciler stopped");
    }
}
