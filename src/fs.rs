//! File system probes, abstracted for testability.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Read-only file system queries used to classify titles.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Checks if anything (file or directory) exists at the given path.
    async fn exists(&self, path: &Path) -> bool;

    /// Lists the regular files directly inside `dir`. A missing directory is empty.
    async fn list_files(&self, dir: &Path) -> Vec<PathBuf>;
}

/// Default file system implementation using `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    /// Creates a new `TokioFileSystem` instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }

    async fn list_files(&self, dir: &Path) -> Vec<PathBuf> {
        let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
            return Vec::new();
        };
        let mut files = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_type().await.is_ok_and(|t| t.is_file()) {
                files.push(entry.path());
            }
        }
        files
    }
}
