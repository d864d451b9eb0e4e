//! On-disk naming for archives, partial downloads and extracted files.

use std::path::{Path, PathBuf};

/// Suffix appended to the archive path while a transfer is in progress.
pub const PART_SUFFIX: &str = ".part";

/// Replaces path separators in a title so it can be used as a file name.
///
/// Only `/` is rewritten (to `_`); every other character is preserved.
#[must_use]
pub fn sanitize(title: &str) -> String {
    title.replace('/', "_")
}

/// Resolves the download directory from the value of `MYRIENT_DOWNLOADS_PATH`.
///
/// Unset or empty falls back to `./.downloads`.
#[must_use]
pub fn resolve_download_dir(value: Option<&str>) -> PathBuf {
    value
        .filter(|v| !v.is_empty())
        .map_or_else(|| PathBuf::from(".").join(".downloads"), PathBuf::from)
}

/// Derived paths for titles inside a download directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPaths {
    dir: PathBuf,
}

impl DownloadPaths {
    /// Creates path helpers rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The download directory.
    #[must_use]
    pub fn download_dir(&self) -> &Path {
        &self.dir
    }

    /// Where the finished archive for `title` lives until it is extracted.
    #[must_use]
    pub fn archive_path(&self, title: &str) -> PathBuf {
        self.dir.join(sanitize(title))
    }

    /// Where the in-progress transfer for `title` is written.
    #[must_use]
    pub fn partial_path(&self, title: &str) -> PathBuf {
        self.dir.join(format!("{}{PART_SUFFIX}", sanitize(title)))
    }

    /// Candidate location of the extracted payload, derived from the title.
    ///
    /// Titles usually carry the archive's `.zip` extension; the payload is
    /// expected under the same stem.
    #[must_use]
    pub fn extracted_path(&self, title: &str) -> PathBuf {
        let name = sanitize(title);
        let stem = name.strip_suffix(".zip").unwrap_or(&name);
        self.dir.join(stem)
    }

    /// Creates the download directory (mode `0755` on Unix) if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o755);
        builder.create(&self.dir).await
    }
}

/// File stem of the archive named by the last segment of `url`, percent-decoded.
///
/// `http://host/dir/Game%20A.zip` yields `Game A`.
#[must_use]
pub fn archive_stem_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(segment).ok()?;
    let stem = decoded.strip_suffix(".zip").unwrap_or(&decoded);
    (!stem.is_empty()).then(|| sanitize(stem))
}
