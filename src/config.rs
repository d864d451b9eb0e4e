//! Configuration types for browsing and download operations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paths::resolve_download_dir;

/// Environment variable overriding the download directory.
pub const DOWNLOADS_PATH_ENV: &str = "MYRIENT_DOWNLOADS_PATH";

/// Environment variable pointing at an alternative config file.
pub const CONFIG_PATH_ENV: &str = "MYRIENT_CONFIG";

/// Default upstream index of platform directories.
pub const DEFAULT_BASE_URL: &str = "https://myrient.erista.me/files/Redump/";

/// When a title is appended to the completion ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerPolicy {
    /// Record as soon as the archive has been renamed into place.
    #[default]
    AfterFetch,
    /// Record only once the inner file has been extracted.
    AfterExtract,
}

/// Configuration for download operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Number of items the download queue holds before `enqueue` waits.
    pub queue_capacity: usize,
    /// Timeout for connecting, receiving headers and each body read.
    pub request_timeout_secs: u64,
    /// When titles are written to the ledger.
    pub ledger_policy: LedgerPolicy,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            request_timeout_secs: 120,
            ledger_policy: LedgerPolicy::AfterFetch,
        }
    }
}

impl DownloadConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the queue capacity.
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the per-request timeout in seconds.
    #[must_use]
    pub const fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Sets the ledger policy.
    #[must_use]
    pub const fn with_ledger_policy(mut self, policy: LedgerPolicy) -> Self {
        self.ledger_policy = policy;
        self
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Path configuration for downloads and the completion ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConfig {
    /// Directory where archives are fetched and extracted.
    pub download_dir: PathBuf,
    /// Append-only log of completed titles.
    pub ledger_path: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            download_dir: resolve_download_dir(None),
            ledger_path: PathBuf::from("downloaded.log"),
        }
    }
}

/// Catalog browsing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Index page listing one directory per platform.
    pub base_url: String,
    /// Number of titles shown per page.
    pub page_size: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: 50,
        }
    }
}

/// On-disk config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    download_dir: Option<PathBuf>,
    ledger_path: Option<PathBuf>,
    base_url: Option<String>,
    page_size: Option<usize>,
    #[serde(default)]
    download: Option<PartialDownloadConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialDownloadConfig {
    queue_capacity: Option<usize>,
    request_timeout_secs: Option<u64>,
    ledger_policy: Option<LedgerPolicy>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    /// Download configuration.
    pub download: DownloadConfig,
    /// Path configuration.
    pub paths: PathConfig,
    /// Catalog configuration.
    pub catalog: CatalogConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location of the config file.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .filter(|p| !p.is_empty())
            .map_or_else(
                || {
                    dirs::config_dir()
                        .unwrap_or_else(|| PathBuf::from("."))
                        .join("myrient-dl")
                        .join("config.toml")
                },
                PathBuf::from,
            )
    }

    /// Loads defaults, then the config file if present, then the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_config_path())
    }

    /// Like [`load`](Self::load), reading the given config file instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the config file exists but cannot be parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_download_dir_override(std::env::var(DOWNLOADS_PATH_ENV).ok().as_deref());
        Ok(config)
    }

    /// Loads defaults overlaid with the given file. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::Config(format!("{}: {e}", path.display()))),
        };
        log::info!("Loaded config from {}", path.display());
        Self::from_toml(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Parses configuration from TOML text on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not a valid config.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        let mut config = Self::default();
        if let Some(dir) = file.download_dir {
            config.paths.download_dir = dir;
        }
        if let Some(ledger) = file.ledger_path {
            config.paths.ledger_path = ledger;
        }
        if let Some(url) = file.base_url {
            config.catalog.base_url = url;
        }
        if let Some(size) = file.page_size.filter(|&s| s > 0) {
            config.catalog.page_size = size;
        }
        if let Some(download) = file.download {
            if let Some(capacity) = download.queue_capacity.filter(|&c| c > 0) {
                config.download.queue_capacity = capacity;
            }
            if let Some(secs) = download.request_timeout_secs {
                config.download.request_timeout_secs = secs;
            }
            if let Some(policy) = download.ledger_policy {
                config.download.ledger_policy = policy;
            }
        }
        Ok(config)
    }

    /// Applies the value of `MYRIENT_DOWNLOADS_PATH`; empty or unset leaves the
    /// current directory in place.
    pub fn apply_download_dir_override(&mut self, value: Option<&str>) {
        if value.is_some_and(|v| !v.is_empty()) {
            self.paths.download_dir = resolve_download_dir(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_download_config() {
        let config = DownloadConfig::default();
        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert_eq!(config.ledger_policy, LedgerPolicy::AfterFetch);
    }

    #[test]
    fn download_config_builder_pattern() {
        let config = DownloadConfig::new()
            .with_queue_capacity(3)
            .with_request_timeout_secs(5)
            .with_ledger_policy(LedgerPolicy::AfterExtract);

        assert_eq!(config.queue_capacity, 3);
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.ledger_policy, LedgerPolicy::AfterExtract);
    }

    #[test]
    fn default_paths() {
        let config = PathConfig::default();
        assert_eq!(config.download_dir, PathBuf::from("./.downloads"));
        assert_eq!(config.ledger_path, PathBuf::from("downloaded.log"));
    }

    #[test]
    fn default_catalog() {
        let config = CatalogConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.page_size, 50);
    }

    #[test]
    fn toml_overlays_defaults() {
        let config = AppConfig::from_toml(
            r#"
            download_dir = "/srv/games"
            page_size = 20

            [download]
            ledger_policy = "after-extract"
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.download_dir, PathBuf::from("/srv/games"));
        assert_eq!(config.paths.ledger_path, PathBuf::from("downloaded.log"));
        assert_eq!(config.catalog.page_size, 20);
        assert_eq!(config.download.ledger_policy, LedgerPolicy::AfterExtract);
        assert_eq!(config.download.queue_capacity, 10);
    }

    #[test]
    fn toml_rejects_unknown_keys() {
        let err = AppConfig::from_toml("concurrency = 4").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AppConfig::from_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn env_override_ignores_empty() {
        let mut config = AppConfig::default();
        config.apply_download_dir_override(Some(""));
        assert_eq!(config.paths.download_dir, PathBuf::from("./.downloads"));
        config.apply_download_dir_override(None);
        assert_eq!(config.paths.download_dir, PathBuf::from("./.downloads"));
        config.apply_download_dir_override(Some("/tmp/roms"));
        assert_eq!(config.paths.download_dir, PathBuf::from("/tmp/roms"));
    }
}
