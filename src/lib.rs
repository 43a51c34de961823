//! Pixivfetch Core Library
//!
//! This library provides the core functionality for the pixivfetch tool,
//! which discovers artwork identifiers from pixiv (rankings, bookmarks,
//! keyword search, artist galleries), resolves each into downloadable
//! image URLs plus optional metadata, and fetches everything to local
//! storage, resuming safely across runs.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`fetch`] - HTTP fetcher with retry/backoff and proxy support
//! - [`selector`] - Pure payload-to-data extraction (pages, metadata, tags)
//! - [`collector`] - Identifier deduplication and parallel URL resolution
//! - [`downloader`] - Parallel, rate-limited asset downloads
//! - [`crawlers`] - Source drivers feeding identifiers into the pipeline
//! - [`storage`] - On-disk layout, atomic writes, cache checks

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod collector;
pub mod config;
pub mod crawlers;
pub mod downloader;
pub mod fetch;
pub mod selector;
pub mod storage;

// Re-export commonly used types
pub use collector::Collector;
pub use config::{Config, DownloadConfig, NetworkConfig, UserConfig};
pub use crawlers::{
    BookmarkCrawler, CrawlError, CrawlSummary, Crawler, KeywordCrawler, RankingCrawler,
    UserCrawler,
};
pub use downloader::{DownloadStats, Downloader, ResourceUrl};
pub use fetch::{
    DEFAULT_FAIL_TIMES, FailureType, FetchError, Fetcher, RetryDecision, RetryPolicy,
    classify_status,
};
pub use selector::{MetadataKind, MetadataRecord, SelectError};
