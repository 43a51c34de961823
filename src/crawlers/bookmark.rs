//! Bookmark driver: pages through the viewer's bookmarked artworks.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{CrawlError, CrawlSummary, Crawler, Pipeline};
use crate::selector;

/// Bookmarks per page as served by the bookmarks endpoint.
const BOOKMARK_PAGE_SIZE: usize = 48;

/// Downloads artworks from the viewer's bookmarks.
///
/// Requires `user.user_id` and `user.cookie` in the configuration; private
/// bookmarks (`rest=hide`) are only visible to the session owner.
#[derive(Debug)]
pub struct BookmarkCrawler {
    pipeline: Pipeline,
    n_artworks: usize,
    private: bool,
}

impl BookmarkCrawler {
    /// Creates a bookmark driver collecting up to `n_artworks` public
    /// bookmarks.
    #[must_use]
    pub fn new(pipeline: Pipeline, n_artworks: usize) -> Self {
        Self {
            pipeline,
            n_artworks,
            private: false,
        }
    }

    /// Creates a driver over the viewer's private bookmarks instead.
    #[must_use]
    pub fn private(pipeline: Pipeline, n_artworks: usize) -> Self {
        Self {
            pipeline,
            n_artworks,
            private: true,
        }
    }

    fn credentials(&self) -> Result<&str, CrawlError> {
        let user = &self.pipeline.config.user;
        if user.cookie.is_none() {
            return Err(CrawlError::MissingCredential {
                field: "cookie",
                crawler: "bookmark",
            });
        }
        user.user_id
            .as_deref()
            .ok_or(CrawlError::MissingCredential {
                field: "user_id",
                crawler: "bookmark",
            })
    }
}

#[async_trait]
impl Crawler for BookmarkCrawler {
    fn name(&self) -> &str {
        "bookmark"
    }

    async fn run(&self) -> Result<CrawlSummary, CrawlError> {
        let uid = self.credentials()?;
        let api = &self.pipeline.config.network.api_base;
        let rest = if self.private { "hide" } else { "show" };
        let referer = format!("{api}/users/{uid}/bookmarks/artworks");

        info!(
            uid,
            n_artworks = self.n_artworks,
            private = self.private,
            "===== Bookmark crawler start ====="
        );

        let mut collected = 0usize;
        let mut offset = 0usize;
        let mut total = None;

        while collected < self.n_artworks {
            let url = format!(
                "{api}/ajax/user/{uid}/illusts/bookmarks?tag=&offset={offset}&limit={BOOKMARK_PAGE_SIZE}&rest={rest}"
            );
            let bytes = match self
                .pipeline
                .fetcher
                .fetch(&url, &[("Referer", referer.as_str())])
                .await
            {
                Ok(bytes) => bytes,
                Err(e) if offset == 0 => return Err(e.into()),
                Err(e) => {
                    warn!(offset, error = %e, "bookmark page fetch failed");
                    break;
                }
            };

            let page = match selector::select_bookmark_ids(&bytes) {
                Ok(page) => page,
                Err(e) if offset == 0 => return Err(e.into()),
                Err(e) => {
                    warn!(offset, error = %e, "malformed bookmark page");
                    break;
                }
            };

            let Some((mut ids, page_total)) = page else {
                break; // past the last bookmark
            };
            total.get_or_insert(page_total);

            ids.truncate(self.n_artworks - collected);
            collected += ids.len();
            self.pipeline.collector.add(ids);

            offset += BOOKMARK_PAGE_SIZE;
            if u64::try_from(offset).unwrap_or(u64::MAX) >= page_total {
                break;
            }
        }

        info!(collected, total = ?total, "bookmark discovery complete");
        Ok(self.pipeline.finish().await)
    }
}
