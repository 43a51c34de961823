//! Immutable run configuration for the pipeline.
//!
//! A single [`Config`] is built once (from a JSON file, CLI overrides, or
//! defaults) and passed by `Arc` into the [`Fetcher`](crate::Fetcher),
//! [`Collector`](crate::Collector), and [`Downloader`](crate::Downloader)
//! constructors. There is no process-wide mutable configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::fetch::DEFAULT_FAIL_TIMES;

/// Default worker count for both the collector and downloader pools.
pub const DEFAULT_NUM_THREADS: usize = 12;

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default delay between successive downloads within one worker, in seconds.
pub const DEFAULT_DOWNLOAD_DELAY_SECS: u64 = 2;

/// Default cumulative download budget in megabytes (0 disables the limit).
pub const DEFAULT_CAPACITY_MB: u64 = 1024;

/// Production API origin.
pub const DEFAULT_API_BASE: &str = "https://www.pixiv.net";

/// Browser identity sent with every request unless overridden.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Download behavior: pool sizes, pacing, storage root, feature flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Root directory for downloaded artwork and metadata.
    pub store_path: PathBuf,
    /// Worker pool size for the collector and downloader (each).
    pub num_threads: usize,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum fetch attempts per request (including the first).
    pub fail_times: u32,
    /// Delay between successive download starts within one worker, in seconds.
    ///
    /// Pacing is per-worker, not global: with N workers the effective global
    /// rate is up to N times the inverse of this delay.
    pub download_delay_secs: u64,
    /// Cumulative download budget in megabytes; 0 disables the limit.
    pub capacity_mb: u64,
    /// Collect and persist per-artwork tag lists.
    pub with_tag: bool,
    /// Collect and persist per-artwork bookmark data.
    pub bookmark: bool,
    /// Record resolved URLs without fetching asset bytes.
    pub url_only: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("images"),
            num_threads: DEFAULT_NUM_THREADS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            fail_times: DEFAULT_FAIL_TIMES,
            download_delay_secs: DEFAULT_DOWNLOAD_DELAY_SECS,
            capacity_mb: DEFAULT_CAPACITY_MB,
            with_tag: false,
            bookmark: false,
            url_only: false,
        }
    }
}

/// Network identity: API origin, proxy, and base headers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Origin of the pixiv API, without a trailing slash.
    pub api_base: String,
    /// Optional proxy URL applied to every request (e.g. `http://127.0.0.1:1080`).
    pub proxy: Option<String>,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            proxy: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Viewer identity for endpoints that require a session.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Numeric pixiv user id of the viewer (sent as `x-user-id`).
    pub user_id: Option<String>,
    /// Session cookie (`PHPSESSID=...`) for authenticated endpoints.
    pub cookie: Option<String>,
}

/// Complete immutable configuration for one pipeline run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Download behavior and storage layout.
    pub download: DownloadConfig,
    /// Proxy and header identity.
    pub network: NetworkConfig,
    /// Viewer identity.
    pub user: UserConfig,
}

impl Config {
    /// Loads configuration from a JSON file.
    ///
    /// Missing fields fall back to their defaults, so a partial file such as
    /// `{"user": {"cookie": "PHPSESSID=..."}}` is valid.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Errors raised while loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        /// Path that failed to load.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON or has the wrong shape.
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}
