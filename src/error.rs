//! Error types for the myrient-dl library.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while browsing the catalog or downloading titles.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure talking to the server.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a status other than 200 or 206.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Status code returned by the server.
        status: u16,
        /// URL that was requested.
        url: String,
    },

    /// No response headers arrived within the request timeout.
    #[error("request to {url} timed out")]
    Timeout {
        /// URL that was requested.
        url: String,
    },

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A partial-content answer started at a different offset than requested.
    #[error("server resumed at byte {got} instead of {requested}")]
    RangeNotHonored {
        /// Offset sent in the `Range` header.
        requested: u64,
        /// Offset reported by `Content-Range`.
        got: u64,
    },

    /// The archive does not contain exactly one entry.
    #[error("expected 1 file inside ZIP, got {count}")]
    UnexpectedArchiveShape {
        /// Number of entries found in the central directory.
        count: usize,
    },

    /// The single archive entry has a name that would escape the destination.
    #[error("refusing to extract entry with unsafe name {name:?}")]
    UnsafeEntryName {
        /// Raw entry name from the archive.
        name: String,
    },

    /// The archive could not be read.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The operation was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// Promoting the `.part` file to its final name failed.
    #[error("rename {} -> {} failed: {source}", from.display(), to.display())]
    Rename {
        /// Partial file path.
        from: PathBuf,
        /// Archive path.
        to: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The catalog could not be read.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// The configuration file is malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Short label used as the prefix when reporting the error to the user.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) | Self::Timeout { .. } => "network",
            Self::HttpStatus { .. } => "http",
            Self::Io(_) => "filesystem",
            Self::RangeNotHonored { .. } => "range",
            Self::UnexpectedArchiveShape { .. } | Self::UnsafeEntryName { .. } | Self::Zip(_) => {
                "archive"
            }
            Self::Cancelled => "cancelled",
            Self::Rename { .. } => "rename",
            Self::Catalog(_) => "catalog",
            Self::Config(_) => "config",
        }
    }

    /// Returns true if this error is a cancellation rather than a failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A specialized `Result` type for myrient-dl operations.
pub type Result<T> = std::result::Result<T, Error>;
