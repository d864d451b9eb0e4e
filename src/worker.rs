//! Download queue and the single worker that drains it.
//!
//! The front end pushes [`Item`]s onto a bounded channel through a
//! [`DownloadQueue`]; one worker task takes them in FIFO order and runs
//! classify → fetch → extract → record for each. Downloads are serialized.
//! A shared [`Tracker`] keeps a title from being queued twice.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::catalog::Item;
use crate::classify::{Classifier, ItemState, Snapshot};
use crate::config::{AppConfig, LedgerPolicy};
use crate::error::{Error, Result};
use crate::extract::extract;
use crate::fetch::{Fetched, Fetcher};
use crate::ledger::Ledger;
use crate::paths::DownloadPaths;
use crate::progress::DownloadProgress;
use crate::stats::{FileStats, SessionStats, SessionStatsBuilder};

/// What the worker did with one item.
#[derive(Debug)]
pub enum Outcome {
    /// Nothing to do: the item was already downloaded.
    Skipped,
    /// The archive was fetched (or already present) and extracted.
    Downloaded(FileStats),
    /// Fetching or extracting failed.
    Failed(Error),
    /// The run was cancelled while the item was being processed.
    Cancelled,
}

/// The per-item download pipeline.
pub struct Pipeline {
    classifier: Classifier,
    fetcher: Fetcher,
    ledger: Ledger,
    policy: LedgerPolicy,
    progress: Arc<dyn DownloadProgress>,
}

impl Pipeline {
    /// Builds a pipeline from its parts.
    #[must_use]
    pub fn new(
        fetcher: Fetcher,
        ledger: Ledger,
        policy: LedgerPolicy,
        progress: Arc<dyn DownloadProgress>,
    ) -> Self {
        Self {
            classifier: Classifier::new(fetcher.paths().clone()),
            fetcher,
            ledger,
            policy,
            progress,
        }
    }

    /// Builds a pipeline from application configuration.
    #[must_use]
    pub fn from_config(
        config: &AppConfig,
        http: reqwest::Client,
        progress: Arc<dyn DownloadProgress>,
    ) -> Self {
        let paths = DownloadPaths::new(&config.paths.download_dir);
        let fetcher = Fetcher::new(http, paths, config.download.request_timeout());
        Self::new(
            fetcher,
            Ledger::new(&config.paths.ledger_path),
            config.download.ledger_policy,
            progress,
        )
    }

    /// Path helpers for the download directory.
    #[must_use]
    pub const fn paths(&self) -> &DownloadPaths {
        self.fetcher.paths()
    }

    /// The progress observer.
    #[must_use]
    pub const fn progress(&self) -> &Arc<dyn DownloadProgress> {
        &self.progress
    }

    /// Classifies `item` against the current ledger.
    pub async fn state(&self, item: &Item) -> ItemState {
        let snapshot = self.snapshot().await;
        self.classifier.classify(item, &snapshot).await
    }

    /// Classifies many items against one read of the ledger and directory.
    pub async fn states(&self, items: &[&Item]) -> Vec<ItemState> {
        let snapshot = self.snapshot().await;
        let mut states = Vec::with_capacity(items.len());
        for item in items {
            states.push(self.classifier.classify(item, &snapshot).await);
        }
        states
    }

    async fn snapshot(&self) -> Snapshot {
        self.classifier.snapshot(self.ledger.load().await).await
    }

    /// Runs classify → fetch → extract → record for one item.
    ///
    /// Errors are reported through the progress observer and returned in
    /// the [`Outcome`]; none of them are fatal to the caller.
    pub async fn process(&self, item: &Item, token: &CancellationToken) -> Outcome {
        let state = self.state(item).await;
        if state.is_done() {
            log::info!("Already downloaded: {}", item.title);
            self.progress.on_skipped(item, "already downloaded");
            return Outcome::Skipped;
        }
        log::debug!("Processing {} ({state:?})", item.title);

        let stats = match self.fetcher.fetch(item, &self.progress, token).await {
            Ok(Fetched::Downloaded(stats)) => stats,
            Ok(Fetched::AlreadyPresent) => FileStats {
                size: 0,
                transferred: 0,
                resumed_from: 0,
                elapsed: std::time::Duration::ZERO,
            },
            Err(e) => return self.fail(item, e),
        };

        if self.policy == LedgerPolicy::AfterFetch {
            self.ledger.record(&item.title).await;
        }

        let archive = self.paths().archive_path(&item.title);
        let dest = self.paths().download_dir().to_path_buf();
        if let Err(e) = extract(&archive, &dest, &item.title, &self.progress, token).await {
            return self.fail(item, e);
        }

        if self.policy == LedgerPolicy::AfterExtract {
            self.ledger.record(&item.title).await;
        }

        self.progress.on_complete(item, &stats);
        Outcome::Downloaded(stats)
    }

    fn fail(&self, item: &Item, error: Error) -> Outcome {
        if error.is_cancelled() {
            log::info!("Cancelled: {}", item.title);
            return Outcome::Cancelled;
        }
        log::error!("{}: {error}", item.title);
        self.progress.on_error(item, &error);
        Outcome::Failed(error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Queued,
    Running,
}

#[derive(Debug, Default)]
struct TrackerState {
    in_flight: HashMap<String, Slot>,
    finished: HashSet<String>,
}

/// Titles currently queued or running, plus titles already handled this run.
///
/// Guarded by one mutex; every critical section is a single set operation.
#[derive(Debug, Default)]
pub struct Tracker {
    state: Mutex<TrackerState>,
}

impl Tracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks `title` as queued. Returns false if it is queued, running, or
    /// was already handled during this run.
    pub fn try_queue(&self, title: &str) -> bool {
        let mut state = self.lock();
        if state.in_flight.contains_key(title) || state.finished.contains(title) {
            return false;
        }
        state.in_flight.insert(title.to_string(), Slot::Queued);
        true
    }

    /// Moves a queued `title` to running. Returns false if it was not queued.
    pub fn start(&self, title: &str) -> bool {
        let mut state = self.lock();
        match state.in_flight.get_mut(title) {
            Some(slot @ Slot::Queued) => {
                *slot = Slot::Running;
                true
            }
            _ => false,
        }
    }

    /// Releases `title` from the in-flight set and remembers it as handled.
    pub fn finish(&self, title: &str) {
        let mut state = self.lock();
        state.in_flight.remove(title);
        state.finished.insert(title.to_string());
    }

    /// Drops a queued `title` without marking it handled.
    pub fn forget(&self, title: &str) {
        self.lock().in_flight.remove(title);
    }

    /// Returns true if `title` is queued or running.
    #[must_use]
    pub fn is_in_flight(&self, title: &str) -> bool {
        self.lock().in_flight.contains_key(title)
    }

    /// Returns true if anything is queued or running.
    #[must_use]
    pub fn has_in_flight(&self) -> bool {
        !self.lock().in_flight.is_empty()
    }

    #[cfg(test)]
    fn is_finished(&self, title: &str) -> bool {
        self.lock().finished.contains(title)
    }
}

/// Result of [`DownloadQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// The item was added to the queue.
    Queued,
    /// The item is already queued, running, or was handled this run.
    AlreadyQueued,
    /// The item is already downloaded.
    AlreadyDownloaded,
}

/// Producer side of the download queue.
///
/// Dropping (or [`close`](Self::close)-ing) the queue tells the worker no
/// more items are coming; it drains what is left and exits.
pub struct DownloadQueue {
    tx: mpsc::Sender<Item>,
    tracker: Arc<Tracker>,
    pipeline: Arc<Pipeline>,
}

impl DownloadQueue {
    /// Queues `item` unless it is downloaded or already tracked.
    ///
    /// Waits while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the worker has stopped.
    pub async fn enqueue(&self, item: Item) -> Result<Enqueued> {
        if self.pipeline.state(&item).await.is_done() {
            return Ok(Enqueued::AlreadyDownloaded);
        }
        if !self.tracker.try_queue(&item.title) {
            return Ok(Enqueued::AlreadyQueued);
        }
        self.pipeline.progress().on_queued(&item);
        if let Err(mpsc::error::SendError(item)) = self.tx.send(item).await {
            self.tracker.forget(&item.title);
            return Err(Error::Cancelled);
        }
        Ok(Enqueued::Queued)
    }

    /// Shared in-flight tracker.
    #[must_use]
    pub const fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    /// The pipeline the worker runs.
    #[must_use]
    pub const fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Closes the queue.
    pub fn close(self) {
        drop(self);
    }
}

/// Starts the worker task and returns the queue feeding it.
///
/// The join handle resolves to the session statistics once the queue has
/// been closed and drained.
#[must_use]
pub fn spawn_worker(
    pipeline: Arc<Pipeline>,
    capacity: usize,
    token: CancellationToken,
) -> (DownloadQueue, JoinHandle<SessionStats>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let tracker = Arc::new(Tracker::new());
    let handle = tokio::spawn(run_worker(
        rx,
        Arc::clone(&pipeline),
        Arc::clone(&tracker),
        token,
    ));
    (
        DownloadQueue {
            tx,
            tracker,
            pipeline,
        },
        handle,
    )
}

async fn run_worker(
    mut rx: mpsc::Receiver<Item>,
    pipeline: Arc<Pipeline>,
    tracker: Arc<Tracker>,
    token: CancellationToken,
) -> SessionStats {
    let mut stats = SessionStatsBuilder::new();

    while let Some(item) = rx.recv().await {
        if token.is_cancelled() {
            log::info!("Dropping queued {} after cancellation", item.title);
            tracker.forget(&item.title);
            continue;
        }
        if !tracker.start(&item.title) {
            log::debug!("Skipping {}: not queued through the tracker", item.title);
            stats.add_skipped();
            continue;
        }

        match pipeline.process(&item, &token).await {
            Outcome::Skipped => stats.add_skipped(),
            Outcome::Downloaded(file_stats) => stats.add_download(&file_stats),
            Outcome::Failed(_) => stats.add_failed(),
            Outcome::Cancelled => {}
        }
        tracker.finish(&item.title);
    }

    log::debug!("Download queue closed");
    stats.build()
}
