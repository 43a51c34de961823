//! Keyword-search driver: pages through search results for a query.
//!
//! Supports pixiv's advanced search syntax, e.g.
//! `(Lucy OR 边缘行者) AND (5000users OR 10000users)`. Ordering by
//! popularity requires a premium session.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{CrawlError, CrawlSummary, Crawler, Pipeline};
use crate::selector;

/// Content filter applied to search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// All-ages results only.
    Safe,
    /// R18 results only (requires a session cookie).
    R18,
    /// No filter.
    All,
}

impl SearchMode {
    fn as_param(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::R18 => "r18",
            Self::All => "all",
        }
    }
}

/// Result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOrder {
    /// Newest first (the default).
    DateDescending,
    /// Most popular first (requires premium).
    Popular,
}

impl SearchOrder {
    fn as_param(self) -> &'static str {
        match self {
            Self::DateDescending => "date_d",
            Self::Popular => "popular_d",
        }
    }
}

/// Downloads search results for a keyword.
#[derive(Debug)]
pub struct KeywordCrawler {
    pipeline: Pipeline,
    keyword: String,
    order: SearchOrder,
    mode: SearchMode,
    n_artworks: usize,
}

impl KeywordCrawler {
    /// Creates a keyword driver collecting up to `n_artworks` results.
    #[must_use]
    pub fn new(
        pipeline: Pipeline,
        keyword: impl Into<String>,
        order: SearchOrder,
        mode: SearchMode,
        n_artworks: usize,
    ) -> Self {
        Self {
            pipeline,
            keyword: keyword.into(),
            order,
            mode,
            n_artworks,
        }
    }
}

#[async_trait]
impl Crawler for KeywordCrawler {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn run(&self) -> Result<CrawlSummary, CrawlError> {
        let api = &self.pipeline.config.network.api_base;
        let encoded = urlencoding::encode(&self.keyword);
        let referer = format!("{api}/tags/{encoded}/artworks");

        info!(
            keyword = %self.keyword,
            order = ?self.order,
            mode = ?self.mode,
            n_artworks = self.n_artworks,
            "===== Keyword crawler start ====="
        );

        let mut collected = 0usize;
        let mut page = 1usize;

        while collected < self.n_artworks {
            let url = format!(
                "{api}/ajax/search/artworks/{encoded}?word={encoded}&order={}&mode={}&p={page}&s_mode=s_tag",
                self.order.as_param(),
                self.mode.as_param(),
            );
            let bytes = match self
                .pipeline
                .fetcher
                .fetch(&url, &[("Referer", referer.as_str())])
                .await
            {
                Ok(bytes) => bytes,
                Err(e) if page == 1 => return Err(e.into()),
                Err(e) => {
                    warn!(page, error = %e, "search page fetch failed");
                    break;
                }
            };

            let ids = match selector::select_search_ids(&bytes) {
                Ok(ids) => ids,
                Err(e) if page == 1 => return Err(e.into()),
                Err(e) => {
                    warn!(page, error = %e, "malformed search page");
                    break;
                }
            };

            let Some(mut ids) = ids else {
                break; // past the last result page
            };
            ids.truncate(self.n_artworks - collected);
            collected += ids.len();
            self.pipeline.collector.add(ids);
            page += 1;
        }

        info!(collected, "keyword discovery complete");
        Ok(self.pipeline.finish().await)
    }
}
