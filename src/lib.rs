//! myrient-dl - browse the Redump index on Myrient and download titles.
//!
//! The library holds the download-and-extract pipeline: resumable `.part`
//! transfers, a completion ledger, on-disk state classification, single-entry
//! ZIP extraction, and a bounded FIFO queue drained by one worker. The
//! interactive browser lives behind the `cli` feature.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use myrient_dl::{AppConfig, Item, NoProgress, Pipeline, build_http_client, spawn_worker};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> myrient_dl::Result<()> {
//! let config = AppConfig::load()?;
//! let http = build_http_client(config.download.request_timeout())?;
//! let pipeline = Arc::new(Pipeline::from_config(&config, http, Arc::new(NoProgress)));
//!
//! let (queue, worker) = spawn_worker(pipeline, config.download.queue_capacity, CancellationToken::new());
//! queue
//!     .enqueue(Item::new("Game A", "1.2 GiB", "https://myrient.erista.me/files/Redump/x/Game%20A.zip"))
//!     .await?;
//! queue.close();
//!
//! let stats = worker.await.expect("worker panicked");
//! println!("Downloaded {} titles", stats.files_downloaded);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod catalog;
pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod filter;
pub mod format;
pub mod fs;
pub mod ledger;
pub mod paths;
pub mod progress;
pub mod stats;
pub mod worker;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export main types for convenience
pub use catalog::{CatalogSource, Category, HttpCatalog, Item, build_http_client};
pub use classify::{Classifier, ItemState, Snapshot};
pub use config::{AppConfig, DownloadConfig, LedgerPolicy};
pub use error::{Error, Result};
pub use extract::extract;
pub use fetch::{Fetched, Fetcher};
pub use filter::{TitleFilter, page_count, paginate};
pub use format::{format_bytes, format_duration};
pub use fs::{FileSystem, TokioFileSystem};
pub use ledger::Ledger;
pub use paths::{DownloadPaths, sanitize};
pub use progress::{Bar, DownloadProgress, NoProgress};
pub use stats::{FileStats, SessionStats};
pub use worker::{DownloadQueue, Enqueued, Outcome, Pipeline, spawn_worker};
