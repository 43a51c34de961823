//! Source drivers feeding identifiers into the pipeline.
//!
//! A crawler decides *which* artwork identifiers to fetch - from rankings,
//! bookmarks, keyword search, or an artist's gallery - and then hands them
//! to the shared [`Collector`]/[`Downloader`] pair. Every driver follows
//! the same contract: `collector.add(ids)` zero or more times, then one
//! `collector.collect()`, then one `downloader.download()`.
//!
//! # Architecture
//!
//! - [`Crawler`] - Async trait that individual drivers implement
//! - [`Pipeline`] - Shared fetcher/collector/downloader bundle
//! - [`RankingCrawler`] - Daily/weekly/monthly ranking pages
//! - [`BookmarkCrawler`] - The viewer's public or private bookmarks
//! - [`KeywordCrawler`] - Keyword search pagination
//! - [`UserCrawler`] - A single artist's full gallery

mod bookmark;
mod keyword;
mod ranking;
mod user;

pub use bookmark::BookmarkCrawler;
pub use keyword::{KeywordCrawler, SearchMode, SearchOrder};
pub use ranking::{RANKING_PAGE_SIZE, RankingCrawler};
pub use user::UserCrawler;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::collector::{CollectStats, Collector};
use crate::config::Config;
use crate::downloader::{DownloadStats, Downloader};
use crate::fetch::{FetchError, Fetcher};

/// Errors that prevent a crawl from starting or discovering anything.
///
/// Per-identifier and per-URL failures inside the pipeline are isolated
/// and never surface here; this covers configuration problems and a dead
/// first discovery request.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// The driver needs a credential the configuration does not carry.
    #[error("missing credential `{field}` required by the {crawler} crawler")]
    MissingCredential {
        /// Configuration field that is absent.
        field: &'static str,
        /// The driver that needs it.
        crawler: &'static str,
    },

    /// The initial discovery request failed after all retries.
    #[error("discovery fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The initial discovery payload was malformed.
    #[error("discovery payload malformed: {0}")]
    Select(#[from] crate::selector::SelectError),
}

/// Outcome of a completed crawl.
#[derive(Debug)]
pub struct CrawlSummary {
    /// Distinct identifiers discovered and scheduled.
    pub identifiers: usize,
    /// Distinct image URLs resolved from those identifiers.
    pub images: usize,
    /// Resolution-phase counters.
    pub collect: CollectStats,
    /// Download-phase counters.
    pub download: DownloadStats,
    /// Every resolved URL, populated in `url_only` mode.
    pub url_manifest: Vec<String>,
}

/// Trait that all source drivers implement.
///
/// # Object Safety
///
/// Uses `async_trait` to support dynamic dispatch via `Box<dyn Crawler>`.
/// Rust 2024 native async traits are not object-safe.
#[async_trait]
pub trait Crawler: Send + Sync {
    /// Returns the driver's name (e.g. "ranking", "bookmark").
    fn name(&self) -> &str;

    /// Discovers identifiers and runs the pipeline to completion.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError`] if discovery cannot start; pipeline-internal
    /// failures are counted in the summary instead.
    async fn run(&self) -> Result<CrawlSummary, CrawlError>;
}

/// The shared fetcher/collector/downloader bundle every driver runs on.
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Immutable run configuration.
    pub config: Arc<Config>,
    /// Shared HTTP fetcher.
    pub fetcher: Arc<Fetcher>,
    /// Identifier resolution stage.
    pub collector: Arc<Collector>,
    /// Asset download stage.
    pub downloader: Arc<Downloader>,
}

impl Pipeline {
    /// Builds the pipeline from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the HTTP client cannot be constructed
    /// (malformed proxy or cookie).
    pub fn new(config: Arc<Config>) -> Result<Self, FetchError> {
        let fetcher = Arc::new(Fetcher::new(Arc::clone(&config))?);
        let downloader = Arc::new(Downloader::new(Arc::clone(&config), Arc::clone(&fetcher)));
        let collector = Arc::new(Collector::new(
            Arc::clone(&config),
            Arc::clone(&fetcher),
            Arc::clone(&downloader),
        ));
        Ok(Self {
            config,
            fetcher,
            collector,
            downloader,
        })
    }

    /// Runs collection then download over whatever identifiers the driver
    /// added, and assembles the summary.
    pub(crate) async fn finish(&self) -> CrawlSummary {
        let collect = self.collector.collect().await;
        let download = self.downloader.download().await;
        let url_manifest = if self.config.download.url_only {
            self.downloader.url_manifest()
        } else {
            Vec::new()
        };

        let summary = CrawlSummary {
            identifiers: self.collector.len(),
            images: self.downloader.discovered(),
            collect,
            download,
            url_manifest,
        };
        info!(
            identifiers = summary.identifiers,
            images = summary.images,
            downloaded = summary.download.downloaded(),
            skipped = summary.download.skipped(),
            failed = summary.download.failed(),
            "crawl complete"
        );
        summary
    }
}
