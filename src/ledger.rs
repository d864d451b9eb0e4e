//! Append-only log of titles that have been downloaded.
//!
//! Each line holds one raw title. Duplicates are harmless: readers only ask
//! for membership. The file system stays the source of truth, so a ledger
//! that cannot be written only costs a faster "already downloaded" answer.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Completion ledger backed by a text file.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    write_failed: AtomicBool,
}

impl Ledger {
    /// Creates a ledger stored at `path`. Nothing is touched until the first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_failed: AtomicBool::new(false),
        }
    }

    /// Path of the ledger file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `title`, creating the file (mode `0644` on Unix) if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or written.
    pub async fn try_record(&self, title: &str) -> std::io::Result<()> {
        let mut options = tokio::fs::OpenOptions::new();
        options.append(true).create(true);
        #[cfg(unix)]
        options.mode(0o644);
        let mut file = options.open(&self.path).await?;
        file.write_all(format!("{title}\n").as_bytes()).await?;
        file.flush().await
    }

    /// Appends `title`, logging (once per ledger) instead of failing.
    ///
    /// Returns whether the line was written.
    pub async fn record(&self, title: &str) -> bool {
        match self.try_record(title).await {
            Ok(()) => true,
            Err(e) => {
                if !self.write_failed.swap(true, Ordering::Relaxed) {
                    log::warn!(
                        "Could not write ledger {}: {e}; continuing without it",
                        self.path.display()
                    );
                }
                false
            }
        }
    }

    /// Reads every recorded title. A missing or unreadable file is empty.
    pub async fn load(&self) -> HashSet<String> {
        let mut titles = HashSet::new();
        let Ok(file) = tokio::fs::File::open(&self.path).await else {
            return titles;
        };
        let mut lines = BufReader::new(file).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    titles.insert(line);
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Stopped reading ledger {}: {e}", self.path.display());
                    break;
                }
            }
        }
        titles
    }

    #[cfg(test)]
    async fn contains(&self, title: &str) -> bool {
        self.load().await.contains(title)
    }
}
