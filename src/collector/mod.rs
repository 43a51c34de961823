//! Identifier deduplication and parallel URL resolution.
//!
//! The [`Collector`] owns the working set of artwork identifiers fed in by
//! a source driver. `collect()` resolves every identifier into its image
//! URLs across a bounded pool and forwards each non-empty result to the
//! [`Downloader`] as soon as it arrives, so downloads can start while
//! later identifiers are still resolving. An optional metadata pass runs
//! concurrently in its own pool and skips any identifier whose metadata
//! file already exists on disk.
//!
//! NOTE: An artwork may contain multiple images.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use indicatif::ProgressBar;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::downloader::Downloader;
use crate::fetch::Fetcher;
use crate::selector::{self, MetadataKind};
use crate::storage;

/// Referer sent with metadata fetches.
const METADATA_REFERER: &str = "https://www.pixiv.net/bookmark.php?type=user";

/// Counters for one `collect()` run.
#[derive(Debug, Default)]
pub struct CollectStats {
    resolved: AtomicUsize,
    empty: AtomicUsize,
    failed: AtomicUsize,
    metadata_written: AtomicUsize,
    metadata_skipped: AtomicUsize,
    metadata_failed: AtomicUsize,
}

impl CollectStats {
    /// Identifiers resolved to at least one URL.
    #[must_use]
    pub fn resolved(&self) -> usize {
        self.resolved.load(Ordering::SeqCst)
    }

    /// Identifiers that legitimately resolved to zero pages.
    #[must_use]
    pub fn empty(&self) -> usize {
        self.empty.load(Ordering::SeqCst)
    }

    /// Identifiers whose resolution failed (recoverable on a later run).
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Metadata documents written this run, across all kinds.
    #[must_use]
    pub fn metadata_written(&self) -> usize {
        self.metadata_written.load(Ordering::SeqCst)
    }

    /// Metadata fetches skipped because the files already existed.
    #[must_use]
    pub fn metadata_skipped(&self) -> usize {
        self.metadata_skipped.load(Ordering::SeqCst)
    }

    /// Metadata fetches or writes that failed.
    #[must_use]
    pub fn metadata_failed(&self) -> usize {
        self.metadata_failed.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> Self {
        let snap = Self::default();
        snap.resolved.store(self.resolved(), Ordering::SeqCst);
        snap.empty.store(self.empty(), Ordering::SeqCst);
        snap.failed.store(self.failed(), Ordering::SeqCst);
        snap.metadata_written
            .store(self.metadata_written(), Ordering::SeqCst);
        snap.metadata_skipped
            .store(self.metadata_skipped(), Ordering::SeqCst);
        snap.metadata_failed
            .store(self.metadata_failed(), Ordering::SeqCst);
        snap
    }
}

/// Resolves identifiers to resource URLs and feeds the downloader.
#[derive(Debug)]
pub struct Collector {
    config: Arc<Config>,
    fetcher: Arc<Fetcher>,
    downloader: Arc<Downloader>,
    /// The deduplicated working set. Insertion-only, mutex-guarded.
    ids: Mutex<HashSet<String>>,
}

impl Collector {
    /// Creates a collector feeding the given downloader.
    #[must_use]
    pub fn new(config: Arc<Config>, fetcher: Arc<Fetcher>, downloader: Arc<Downloader>) -> Self {
        Self {
            config,
            fetcher,
            downloader,
            ids: Mutex::new(HashSet::new()),
        }
    }

    /// Idempotently unions identifiers into the working set.
    pub fn add<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = lock(&self.ids);
        for id in ids {
            set.insert(id.into());
        }
    }

    /// Number of distinct identifiers in the working set.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.ids).len()
    }

    /// Whether the working set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.ids).is_empty()
    }

    /// Resolves every identifier and forwards resulting URLs to the
    /// downloader; runs the configured metadata passes concurrently.
    ///
    /// Returns only after both the resolution pool and the metadata pool
    /// have drained. Per-identifier failures are logged and counted, never
    /// propagated.
    #[instrument(skip(self), fields(ids = self.len()))]
    pub async fn collect(&self) -> CollectStats {
        let ids: Vec<String> = lock(&self.ids).iter().cloned().collect();
        let stats = Arc::new(CollectStats::default());

        info!(ids = ids.len(), "===== Collector start =====");
        info!("NOTE: An artwork may contain multiple images.");

        let metadata_kinds = self.enabled_metadata_kinds();
        // The metadata pool runs alongside the resolution pool (the "+1"
        // slot); both must drain before collect() returns.
        tokio::join!(
            self.page_pass(&ids, &stats),
            self.metadata_pass(&ids, &metadata_kinds, &stats),
        );

        info!(
            resolved = stats.resolved(),
            empty = stats.empty(),
            failed = stats.failed(),
            images = self.downloader.discovered(),
            "===== Collector complete ====="
        );

        stats.snapshot()
    }

    /// Fans page resolution out across the bounded pool, forwarding URL
    /// lists to the downloader in completion order.
    async fn page_pass(&self, ids: &[String], stats: &Arc<CollectStats>) {
        let semaphore = Arc::new(Semaphore::new(self.config.download.num_threads.max(1)));
        let progress = ProgressBar::new(ids.len() as u64);
        progress.set_message("Collecting urls");

        let mut handles = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break; // Semaphore closed, pool is shutting down
            };
            let config = Arc::clone(&self.config);
            let fetcher = Arc::clone(&self.fetcher);
            let downloader = Arc::clone(&self.downloader);
            let stats = Arc::clone(stats);
            let progress = progress.clone();
            let id = id.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                resolve_one(&config, &fetcher, &downloader, &id, &stats).await;
                progress.inc(1);
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "resolution task panicked");
            }
        }
        progress.finish_and_clear();
    }

    /// The metadata kinds enabled by the configuration flags.
    fn enabled_metadata_kinds(&self) -> Vec<MetadataKind> {
        let mut kinds = Vec::new();
        if self.config.download.with_tag {
            kinds.push(MetadataKind::Metadata);
            kinds.push(MetadataKind::Tags);
        }
        if self.config.download.bookmark {
            kinds.push(MetadataKind::Bookmark);
        }
        kinds
    }

    /// Runs the metadata pool: one fetch per identifier still missing a
    /// file, then one selector per missing kind over the shared payload.
    async fn metadata_pass(&self, ids: &[String], kinds: &[MetadataKind], stats: &Arc<CollectStats>) {
        if kinds.is_empty() {
            return;
        }

        // Cache check: identifiers whose every enabled file already exists
        // never reach the network.
        let mut remaining = Vec::new();
        for id in ids {
            let missing: Vec<MetadataKind> = kinds
                .iter()
                .copied()
                .filter(|kind| {
                    !storage::metadata_path(&self.config.download.store_path, id, *kind).exists()
                })
                .collect();
            if missing.is_empty() {
                debug!(illust_id = %id, "metadata already exists, skipping");
                stats.metadata_skipped.fetch_add(1, Ordering::SeqCst);
            } else {
                remaining.push((id.clone(), missing));
            }
        }

        info!(
            ids = remaining.len(),
            skipped = stats.metadata_skipped(),
            "===== Metadata collector start ====="
        );

        let semaphore = Arc::new(Semaphore::new(self.config.download.num_threads.max(1)));
        let mut handles = Vec::with_capacity(remaining.len());
        for (id, missing) in remaining {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let config = Arc::clone(&self.config);
            let fetcher = Arc::clone(&self.fetcher);
            let stats = Arc::clone(stats);

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                collect_metadata_one(&config, &fetcher, &id, &missing, &stats).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "metadata task panicked");
            }
        }

        info!(
            written = stats.metadata_written(),
            failed = stats.metadata_failed(),
            "===== Metadata collector complete ====="
        );
    }
}

/// Resolves one identifier's pages and forwards URLs to the downloader.
async fn resolve_one(
    config: &Config,
    fetcher: &Fetcher,
    downloader: &Downloader,
    illust_id: &str,
    stats: &CollectStats,
) {
    let url = format!(
        "{}/ajax/illust/{illust_id}/pages?lang=zh",
        config.network.api_base
    );
    let referer = format!("https://www.pixiv.net/artworks/{illust_id}");
    let mut headers = vec![("Referer", referer.as_str())];
    if let Some(user_id) = &config.user.user_id {
        headers.push(("x-user-id", user_id.as_str()));
    }

    let bytes = match fetcher.fetch(&url, &headers).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(illust_id, error = %e, "page resolution failed");
            stats.failed.fetch_add(1, Ordering::SeqCst);
            return;
        }
    };

    match selector::select_page(&bytes, illust_id) {
        Ok(Some(urls)) => {
            debug!(illust_id, pages = urls.len(), "resolved");
            stats.resolved.fetch_add(1, Ordering::SeqCst);
            // Forward immediately - downloads may start before the
            // remaining identifiers finish resolving.
            downloader.add(urls);
        }
        Ok(None) => {
            debug!(illust_id, "artwork has zero pages");
            stats.empty.fetch_add(1, Ordering::SeqCst);
        }
        Err(e) => {
            warn!(illust_id, error = %e, "malformed pages payload");
            stats.failed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Fetches one identifier's illust payload and persists each missing
/// metadata kind extracted from it.
async fn collect_metadata_one(
    config: &Config,
    fetcher: &Fetcher,
    illust_id: &str,
    kinds: &[MetadataKind],
    stats: &CollectStats,
) {
    let url = format!("{}/ajax/illust/{illust_id}", config.network.api_base);
    let bytes = match fetcher.fetch(&url, &[("Referer", METADATA_REFERER)]).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(illust_id, error = %e, "metadata fetch failed");
            stats.metadata_failed.fetch_add(1, Ordering::SeqCst);
            return;
        }
    };

    for kind in kinds {
        match kind.select(&bytes) {
            Ok(Some(record)) => {
                if let Err(e) = persist_metadata(config, illust_id, *kind, &record).await {
                    warn!(illust_id, file = kind.filename(), error = %e, "metadata write failed");
                    stats.metadata_failed.fetch_add(1, Ordering::SeqCst);
                } else {
                    stats.metadata_written.fetch_add(1, Ordering::SeqCst);
                }
            }
            Ok(None) => {
                debug!(illust_id, file = kind.filename(), "no data to persist");
            }
            Err(e) => {
                warn!(illust_id, file = kind.filename(), error = %e, "malformed illust payload");
                stats.metadata_failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

/// Writes one metadata document: a JSON object keyed by identifier,
/// pretty-printed, non-ASCII characters preserved literally.
async fn persist_metadata(
    config: &Config,
    illust_id: &str,
    kind: MetadataKind,
    record: &serde_json::Value,
) -> Result<(), PersistError> {
    let dir = storage::illust_dir(&config.download.store_path, illust_id);
    storage::ensure_dir(&dir).await?;

    let document = serde_json::json!({ illust_id: record });
    let text = serde_json::to_string_pretty(&document)?;
    let path = storage::metadata_path(&config.download.store_path, illust_id, kind);
    storage::write_atomic(&path, text.as_bytes()).await?;
    debug!(illust_id, path = %path.display(), "metadata written");
    Ok(())
}

/// Internal error for one metadata persist; callers only log it.
#[derive(Debug, thiserror::Error)]
enum PersistError {
    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),
    #[error("cannot serialize metadata: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_collector(config: Config) -> Collector {
        let config = Arc::new(config);
        let fetcher = Arc::new(Fetcher::new(Arc::clone(&config)).unwrap());
        let downloader = Arc::new(Downloader::new(Arc::clone(&config), Arc::clone(&fetcher)));
        Collector::new(config, fetcher, downloader)
    }

    #[test]
    fn test_add_overlapping_ids_counts_distinct() {
        let collector = test_collector(Config::default());
        collector.add(vec!["100", "101"]);
        collector.add(vec!["101", "102"]);
        collector.add(vec!["100"]);
        assert_eq!(collector.len(), 3);
    }

    #[test]
    fn test_add_accepts_owned_strings() {
        let collector = test_collector(Config::default());
        collector.add(vec!["100".to_string()]);
        assert!(!collector.is_empty());
    }

    #[test]
    fn test_enabled_metadata_kinds_from_flags() {
        let mut config = Config::default();
        config.download.with_tag = true;
        config.download.bookmark = true;
        let collector = test_collector(config);
        assert_eq!(
            collector.enabled_metadata_kinds(),
            vec![
                MetadataKind::Metadata,
                MetadataKind::Tags,
                MetadataKind::Bookmark
            ]
        );

        let collector = test_collector(Config::default());
        assert!(collector.enabled_metadata_kinds().is_empty());
    }

    #[tokio::test]
    async fn test_persist_metadata_keyed_and_pretty() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.download.store_path = dir.path().to_path_buf();

        let record = serde_json::json!({"title": "雪景色"});
        persist_metadata(&config, "100", MetadataKind::Metadata, &record)
            .await
            .unwrap();

        let text = std::fs::read_to_string(dir.path().join("100/metadata.json")).unwrap();
        // Keyed by identifier, indented, non-ASCII preserved literally
        assert!(text.contains("\"100\""));
        assert!(text.contains("\n  "));
        assert!(text.contains("雪景色"));
        assert!(!text.contains("\\u"));
    }
}
