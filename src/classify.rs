//! Classification of a title's state on disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::catalog::Item;
use crate::fs::{FileSystem, TokioFileSystem};
use crate::paths::{DownloadPaths, PART_SUFFIX, archive_stem_from_url};

/// Where a title stands, derived from the ledger and the file system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    /// Nothing on disk.
    Absent,
    /// A `.part` file exists from an interrupted transfer.
    Partial,
    /// The archive is fully downloaded but not yet extracted.
    Complete,
    /// The payload has been extracted.
    Extracted,
}

impl ItemState {
    /// Returns true if no more work is needed.
    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Extracted)
    }

    /// Short tag for listings.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Absent => "",
            Self::Partial => "partial",
            Self::Complete => "fetched",
            Self::Extracted => "downloaded",
        }
    }
}

/// The ledger and the download directory's finished files, read once for a
/// batch of classifications.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    ledger: HashSet<String>,
    payload_stems: HashSet<String>,
}

impl Snapshot {
    /// Builds a snapshot from ledger titles and a directory listing.
    #[must_use]
    pub fn new(ledger: HashSet<String>, files: &[PathBuf]) -> Self {
        let payload_stems = files
            .iter()
            .filter_map(|path| payload_stem(path))
            .map(str::to_string)
            .collect();
        Self {
            ledger,
            payload_stems,
        }
    }

    fn has_payload(&self, stem: &str) -> bool {
        self.payload_stems.contains(stem)
    }
}

/// Side-effect-free classifier over a download directory.
pub struct Classifier<F: FileSystem = TokioFileSystem> {
    paths: DownloadPaths,
    fs: F,
}

impl Classifier<TokioFileSystem> {
    /// Creates a classifier using the real file system.
    #[must_use]
    pub const fn new(paths: DownloadPaths) -> Self {
        Self {
            paths,
            fs: TokioFileSystem,
        }
    }
}

impl<F: FileSystem> Classifier<F> {
    /// Creates a classifier with a custom file system implementation.
    #[must_use]
    pub const fn with_fs(paths: DownloadPaths, fs: F) -> Self {
        Self { paths, fs }
    }

    /// Path helpers for the download directory.
    #[must_use]
    pub const fn paths(&self) -> &DownloadPaths {
        &self.paths
    }

    /// Lists the download directory once and pairs it with `ledger`.
    pub async fn snapshot(&self, ledger: HashSet<String>) -> Snapshot {
        let files = self.fs.list_files(self.paths.download_dir()).await;
        Snapshot::new(ledger, &files)
    }

    /// Classifies `item` against `snapshot`.
    ///
    /// A ledger entry only counts as extracted while the archive is gone:
    /// an archive left behind by a failed extraction keeps the item
    /// [`ItemState::Complete`] so the extraction is retried.
    pub async fn classify(&self, item: &Item, snapshot: &Snapshot) -> ItemState {
        let archive = self.paths.archive_path(&item.title);
        let archive_present = self.fs.exists(&archive).await;

        if snapshot.ledger.contains(&item.title) && !archive_present {
            return ItemState::Extracted;
        }
        if archive_present {
            return ItemState::Complete;
        }
        if self.fs.exists(&self.paths.partial_path(&item.title)).await {
            return ItemState::Partial;
        }
        if self.has_extracted_payload(item, snapshot).await {
            return ItemState::Extracted;
        }
        ItemState::Absent
    }

    /// Looks for an extracted payload named after the title or the archive.
    async fn has_extracted_payload(&self, item: &Item, snapshot: &Snapshot) -> bool {
        if self.fs.exists(&self.paths.extracted_path(&item.title)).await {
            return true;
        }
        archive_stem_from_url(&item.url).is_some_and(|stem| snapshot.has_payload(&stem))
    }
}

/// Stem of `path` if it names a finished file rather than a transfer or archive.
fn payload_stem(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    if name.ends_with(PART_SUFFIX) || name.ends_with(".zip") {
        return None;
    }
    path.file_stem()?.to_str()
}
