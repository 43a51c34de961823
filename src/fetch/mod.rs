//! HTTP fetching with retry/backoff, proxy, and header management.
//!
//! This module provides the [`Fetcher`], a thin wrapper around a pooled
//! `reqwest::Client` that applies the configured proxy, browser-identity
//! headers, session cookie, and per-request timeout, and retries transient
//! failures with exponential backoff.
//!
//! The fetcher never touches the filesystem; it returns raw bytes that
//! callers validate further (JSON parsing is a [`selector`](crate::selector)
//! concern, not a fetch concern).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pixivfetch_core::{Config, Fetcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = Fetcher::new(Arc::new(Config::default()))?;
//! let bytes = fetcher.fetch("https://www.pixiv.net/ranking.php?format=json", &[]).await?;
//! println!("{} bytes", bytes.len());
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod retry;

pub use client::Fetcher;
pub use error::FetchError;
pub use retry::{
    DEFAULT_FAIL_TIMES, FailureType, RetryDecision, RetryPolicy, classify_error, classify_status,
};
