//! Download statistics types.

use std::time::{Duration, Instant};

/// Statistics for a single fetched archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStats {
    /// Final size of the archive in bytes.
    pub size: u64,
    /// Bytes actually transferred during this run.
    pub transferred: u64,
    /// Offset the transfer resumed from (0 for a fresh download).
    pub resumed_from: u64,
    /// Time spent fetching.
    pub elapsed: Duration,
}

impl FileStats {
    /// Returns the transfer speed in bytes per second.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn average_speed(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.transferred as f64 / secs) as u64
        } else {
            0
        }
    }
}

/// Statistics for an entire browsing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Number of titles fetched and extracted.
    pub files_downloaded: usize,
    /// Number of titles skipped (already downloaded or already handled).
    pub files_skipped: usize,
    /// Number of titles that failed to fetch or extract.
    pub files_failed: usize,
    /// Bytes transferred over the network.
    pub total_bytes: u64,
    /// Total elapsed time for the session.
    pub elapsed: Duration,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStats {
    /// Creates a new empty session stats.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            files_downloaded: 0,
            files_skipped: 0,
            files_failed: 0,
            total_bytes: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Returns the average download speed in bytes per second.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn average_speed(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.total_bytes as f64 / secs) as u64
        } else {
            0
        }
    }

    /// Returns true if nothing was attempted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.files_downloaded == 0 && self.files_skipped == 0 && self.files_failed == 0
    }
}

/// Builder for accumulating session statistics while the worker runs.
pub struct SessionStatsBuilder {
    files_downloaded: usize,
    files_skipped: usize,
    files_failed: usize,
    total_bytes: u64,
    start_time: Instant,
}

impl Default for SessionStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStatsBuilder {
    /// Creates a new session stats builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            files_downloaded: 0,
            files_skipped: 0,
            files_failed: 0,
            total_bytes: 0,
            start_time: Instant::now(),
        }
    }

    /// Records a completed title.
    pub const fn add_download(&mut self, file_stats: &FileStats) {
        self.files_downloaded += 1;
        self.total_bytes += file_stats.transferred;
    }

    /// Records a title that needed no work.
    pub const fn add_skipped(&mut self) {
        self.files_skipped += 1;
    }

    /// Records a failed title.
    pub const fn add_failed(&mut self) {
        self.files_failed += 1;
    }

    /// Builds the final session statistics.
    #[must_use]
    pub fn build(self) -> SessionStats {
        SessionStats {
            files_downloaded: self.files_downloaded,
            files_skipped: self.files_skipped,
            files_failed: self.files_failed,
            total_bytes: self.total_bytes,
            elapsed: self.start_time.elapsed(),
        }
    }
}
