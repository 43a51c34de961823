//! Ranking-page driver: walks daily/weekly/monthly ranking pages across a
//! date range and schedules every listed artwork.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use tracing::{info, warn};

use super::{CrawlError, CrawlSummary, Crawler, Pipeline};
use crate::selector;

/// Artworks per ranking page as served by `ranking.php`.
pub const RANKING_PAGE_SIZE: usize = 50;

/// Downloads artworks from the ranking pages.
///
/// For each configured mode and each date in
/// `[start_date, start_date + date_range)`, pages through the ranking
/// until `artworks_per_date` identifiers are collected or the ranking
/// runs out. R18 modes require a session cookie.
#[derive(Debug)]
pub struct RankingCrawler {
    pipeline: Pipeline,
    modes: Vec<String>,
    start_date: NaiveDate,
    date_range: u32,
    artworks_per_date: usize,
}

impl RankingCrawler {
    /// Creates a ranking driver.
    ///
    /// `modes` are ranking mode names (`daily`, `weekly`, `monthly`,
    /// `male`, `female`, and their `_r18` variants).
    #[must_use]
    pub fn new(
        pipeline: Pipeline,
        modes: Vec<String>,
        start_date: NaiveDate,
        date_range: u32,
        artworks_per_date: usize,
    ) -> Self {
        Self {
            pipeline,
            modes,
            start_date,
            date_range,
            artworks_per_date,
        }
    }

    /// Collects identifiers for one mode and date, paging until the cap
    /// or the end of the ranking.
    async fn collect_date(&self, mode: &str, date: NaiveDate) -> Result<Vec<String>, CrawlError> {
        let api = &self.pipeline.config.network.api_base;
        let date_param = date.format("%Y%m%d").to_string();
        let referer = format!("{api}/ranking.php");
        let pages = self.artworks_per_date.div_ceil(RANKING_PAGE_SIZE);

        let mut ids = Vec::new();
        for page in 1..=pages {
            let url =
                format!("{api}/ranking.php?mode={mode}&date={date_param}&p={page}&format=json");
            let bytes = match self
                .pipeline
                .fetcher
                .fetch(&url, &[("Referer", referer.as_str())])
                .await
            {
                Ok(bytes) => bytes,
                Err(e) if page == 1 => return Err(e.into()),
                Err(e) => {
                    warn!(mode, date = %date_param, page, error = %e, "ranking page fetch failed");
                    break;
                }
            };

            match selector::select_ranking_ids(&bytes) {
                Ok(Some(page_ids)) => {
                    ids.extend(page_ids);
                    if ids.len() >= self.artworks_per_date {
                        ids.truncate(self.artworks_per_date);
                        break;
                    }
                }
                Ok(None) => break, // past the end of the ranking
                Err(e) if page == 1 => return Err(e.into()),
                Err(e) => {
                    warn!(mode, date = %date_param, page, error = %e, "malformed ranking page");
                    break;
                }
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl Crawler for RankingCrawler {
    fn name(&self) -> &str {
        "ranking"
    }

    async fn run(&self) -> Result<CrawlSummary, CrawlError> {
        info!(
            modes = ?self.modes,
            start = %self.start_date,
            days = self.date_range,
            "===== Ranking crawler start ====="
        );

        // Only the very first discovery request of the run is fatal
        // (nothing has been found yet). A later date or mode that dies
        // is logged and skipped so earlier discoveries still reach the
        // pipeline.
        let mut first = true;
        for mode in &self.modes {
            for offset in 0..self.date_range {
                let date = self.start_date + Duration::days(i64::from(offset));
                let ids = match self.collect_date(mode, date).await {
                    Ok(ids) => ids,
                    Err(e) if first => return Err(e),
                    Err(e) => {
                        warn!(mode = %mode, date = %date, error = %e, "ranking date discovery failed");
                        continue;
                    }
                };
                first = false;
                info!(mode = %mode, date = %date, ids = ids.len(), "ranking date collected");
                self.pipeline.collector.add(ids);
            }
        }

        Ok(self.pipeline.finish().await)
    }
}
