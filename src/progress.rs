//! Progress reporting hooks used by the fetch and extract pipeline.
//!
//! The pipeline never draws anything itself. It asks a [`DownloadProgress`]
//! for a [`Bar`] per transfer and reports notices through the same object,
//! so the terminal front end, a test recorder, or [`NoProgress`] can sit
//! behind it.

use std::io::Read;
use std::sync::Arc;

use crate::catalog::Item;
use crate::error::Error;
use crate::stats::FileStats;

/// Longest label rendered next to a bar.
pub const MAX_LABEL_LEN: usize = 30;

/// Shortens a title to fit beside a progress bar.
#[must_use]
pub fn trim_label(title: &str) -> String {
    if title.chars().count() > MAX_LABEL_LEN {
        let head: String = title.chars().take(MAX_LABEL_LEN - 3).collect();
        format!("{head}...")
    } else {
        title.to_string()
    }
}

/// An observer advanced as bytes flow through a transfer.
pub trait Bar: Send + Sync {
    /// Records `delta` more bytes.
    fn inc(&self, delta: u64);

    /// Sets the final length; `complete` marks the bar finished.
    fn set_total(&self, total: u64, complete: bool);

    /// Marks the bar as stopped before completion.
    fn abandon(&self) {}
}

/// Receives bar requests and user-visible notices from the pipeline.
///
/// All notice methods have default no-op implementations.
pub trait DownloadProgress: Send + Sync {
    /// Creates a bar for a transfer of `total` bytes (0 when unknown).
    fn new_bar(&self, label: &str, total: u64) -> Arc<dyn Bar>;

    /// Called when an item is accepted onto the queue.
    fn on_queued(&self, _item: &Item) {}

    /// Called when an item needs no work.
    fn on_skipped(&self, _item: &Item, _reason: &str) {}

    /// Called when a transfer continues from an existing `.part` file.
    fn on_resume(&self, _item: &Item, _offset: u64) {}

    /// Called when an item has been fetched and extracted.
    fn on_complete(&self, _item: &Item, _stats: &FileStats) {}

    /// Called when fetching or extracting an item fails.
    fn on_error(&self, _item: &Item, _error: &Error) {}
}

/// A bar that observes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBar;

impl Bar for NoBar {
    fn inc(&self, _delta: u64) {}
    fn set_total(&self, _total: u64, _complete: bool) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {
    fn new_bar(&self, _label: &str, _total: u64) -> Arc<dyn Bar> {
        Arc::new(NoBar)
    }
}

/// Pass-through reader that advances a [`Bar`] by every byte read.
pub struct ProxyReader<R> {
    inner: R,
    bar: Arc<dyn Bar>,
}

impl<R> ProxyReader<R> {
    /// Wraps `inner` so reads are reported to `bar`.
    pub fn new(inner: R, bar: Arc<dyn Bar>) -> Self {
        Self { inner, bar }
    }
}

impl<R: Read> Read for ProxyReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bar.inc(n as u64);
        Ok(n)
    }
}
