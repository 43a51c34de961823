//! Artist-gallery driver: schedules every artwork of a single artist.

use async_trait::async_trait;
use tracing::info;

use super::{CrawlError, CrawlSummary, Crawler, Pipeline};
use crate::selector;

/// Downloads every artwork from one artist's gallery.
#[derive(Debug)]
pub struct UserCrawler {
    pipeline: Pipeline,
    artist_id: String,
}

impl UserCrawler {
    /// Creates a driver for the given artist.
    #[must_use]
    pub fn new(pipeline: Pipeline, artist_id: impl Into<String>) -> Self {
        Self {
            pipeline,
            artist_id: artist_id.into(),
        }
    }
}

#[async_trait]
impl Crawler for UserCrawler {
    fn name(&self) -> &str {
        "user"
    }

    async fn run(&self) -> Result<CrawlSummary, CrawlError> {
        let api = &self.pipeline.config.network.api_base;
        let url = format!("{api}/ajax/user/{}/profile/all", self.artist_id);
        let referer = format!("{api}/users/{}", self.artist_id);

        info!(artist_id = %self.artist_id, "===== User crawler start =====");

        let bytes = self
            .pipeline
            .fetcher
            .fetch(&url, &[("Referer", referer.as_str())])
            .await?;
        let ids = selector::select_user_ids(&bytes)?.unwrap_or_default();

        info!(artist_id = %self.artist_id, ids = ids.len(), "user gallery discovered");
        self.pipeline.collector.add(ids);

        Ok(self.pipeline.finish().await)
    }
}
