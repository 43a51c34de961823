//! Parallel, rate-limited asset downloads.
//!
//! The [`Downloader`] accumulates deduplicated [`ResourceUrl`]s from the
//! collector and drains them through a fixed pool of worker loops. Each
//! worker pulls tasks from a shared queue and sleeps the configured delay
//! between the starts of successive fetches.
//!
//! Pacing is per-worker, not global: with N workers the effective global
//! request rate is up to N times the inverse of the per-worker delay.
//!
//! Resumability is the skip check: a destination path that already exists
//! on disk is counted as satisfied and never touches the network.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use indicatif::ProgressBar;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::fetch::Fetcher;
use crate::storage;

/// One downloadable asset: a fully qualified URL plus the identifier and
/// page ordinal it came from (used for the referer header and the
/// destination filename).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceUrl {
    /// The identifier of the owning artwork.
    pub illust_id: String,
    /// Page index within the artwork.
    pub ordinal: usize,
    /// Fully qualified asset address.
    pub url: String,
}

impl ResourceUrl {
    /// Creates a resource URL.
    #[must_use]
    pub fn new(illust_id: impl Into<String>, ordinal: usize, url: impl Into<String>) -> Self {
        Self {
            illust_id: illust_id.into(),
            ordinal,
            url: url.into(),
        }
    }

    /// The artwork page this asset belongs to, used as the referer.
    #[must_use]
    pub fn referer(&self) -> String {
        format!("https://www.pixiv.net/artworks/{}", self.illust_id)
    }
}

/// Counters for one `download()` drain.
///
/// Uses atomic counters for thread-safe updates from concurrent workers.
#[derive(Debug, Default)]
pub struct DownloadStats {
    downloaded: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    bytes: AtomicU64,
}

impl DownloadStats {
    /// Number of assets fetched and written this run.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::SeqCst)
    }

    /// Number of assets skipped because their destination already existed
    /// (or the capacity budget was exhausted).
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Number of assets that failed all fetch attempts or could not be written.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Total bytes written this run.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> Self {
        let snap = Self::default();
        snap.downloaded.store(self.downloaded(), Ordering::SeqCst);
        snap.skipped.store(self.skipped(), Ordering::SeqCst);
        snap.failed.store(self.failed(), Ordering::SeqCst);
        snap.bytes.store(self.bytes(), Ordering::SeqCst);
        snap
    }
}

/// Parallel asset downloader with a deduplicating intake.
///
/// Shared by `Arc` between the collector (which feeds it as resolutions
/// complete) and the source driver (which drains it after collection).
/// The URL set only ever grows by idempotent union, so concurrent `add`
/// calls from resolution tasks are safe.
#[derive(Debug)]
pub struct Downloader {
    config: Arc<Config>,
    fetcher: Arc<Fetcher>,
    /// URLs accepted but not yet drained.
    pending: Mutex<VecDeque<ResourceUrl>>,
    /// Every URL ever accepted, keyed by address. The dedup set.
    seen: Mutex<HashSet<String>>,
}

impl Downloader {
    /// Creates a downloader over the shared fetcher and configuration.
    #[must_use]
    pub fn new(config: Arc<Config>, fetcher: Arc<Fetcher>) -> Self {
        Self {
            config,
            fetcher,
            pending: Mutex::new(VecDeque::new()),
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Idempotently unions resource URLs into the working set.
    ///
    /// A URL that was already added (by any earlier resolution attempt) is
    /// ignored; duplicates never reach the download queue.
    pub fn add<I>(&self, urls: I)
    where
        I: IntoIterator<Item = ResourceUrl>,
    {
        let mut seen = lock(&self.seen);
        let mut pending = lock(&self.pending);
        for resource in urls {
            if seen.insert(resource.url.clone()) {
                pending.push_back(resource);
            }
        }
    }

    /// Number of distinct URLs accepted so far.
    #[must_use]
    pub fn discovered(&self) -> usize {
        lock(&self.seen).len()
    }

    /// Snapshot of every accepted URL, for `url_only` manifests.
    #[must_use]
    pub fn url_manifest(&self) -> Vec<String> {
        let mut urls: Vec<String> = lock(&self.seen).iter().cloned().collect();
        urls.sort();
        urls
    }

    /// Drains the pending set through `num_threads` worker loops.
    ///
    /// Individual failures are logged and counted, never propagated; one
    /// bad URL cannot stall the batch. In `url_only` mode the network and
    /// filesystem are not touched at all.
    #[instrument(skip(self))]
    pub async fn download(&self) -> DownloadStats {
        let tasks: VecDeque<ResourceUrl> = {
            let mut pending = lock(&self.pending);
            std::mem::take(&mut *pending)
        };

        let stats = Arc::new(DownloadStats::default());

        if self.config.download.url_only {
            info!(
                urls = tasks.len(),
                "url_only mode: recording URLs without downloading"
            );
            return stats.snapshot();
        }

        info!(urls = tasks.len(), "===== Downloader start =====");
        let progress = ProgressBar::new(tasks.len() as u64);
        progress.set_message("Downloading images");

        let queue = Arc::new(Mutex::new(tasks));
        let workers = self.config.download.num_threads.max(1);
        let delay = Duration::from_secs(self.config.download.download_delay_secs);

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let config = Arc::clone(&self.config);
            let fetcher = Arc::clone(&self.fetcher);
            let queue = Arc::clone(&queue);
            let stats = Arc::clone(&stats);
            let progress = progress.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, &config, &fetcher, &queue, &stats, delay, &progress).await;
            }));
        }

        for handle in handles {
            // Task panics are logged but don't fail the batch
            if let Err(e) = handle.await {
                warn!(error = %e, "download worker panicked");
            }
        }

        progress.finish_and_clear();
        info!(
            downloaded = stats.downloaded(),
            skipped = stats.skipped(),
            failed = stats.failed(),
            bytes = stats.bytes(),
            "===== Downloader complete ====="
        );

        stats.snapshot()
    }
}

/// One worker: pull tasks until the queue is empty, pacing between the
/// starts of successive fetches.
async fn worker_loop(
    worker_id: usize,
    config: &Config,
    fetcher: &Fetcher,
    queue: &Mutex<VecDeque<ResourceUrl>>,
    stats: &DownloadStats,
    delay: Duration,
    progress: &ProgressBar,
) {
    let mut fetched_before = false;
    loop {
        let task = lock(queue).pop_front();
        let Some(resource) = task else { break };

        let dest = storage::asset_path(
            &config.download.store_path,
            &resource.illust_id,
            resource.ordinal,
            &resource.url,
        );

        // Skip check - the dominant resumability mechanism.
        if dest.exists() {
            debug!(worker_id, path = %dest.display(), "already on disk, skipping");
            stats.skipped.fetch_add(1, Ordering::SeqCst);
            progress.inc(1);
            continue;
        }

        if capacity_exhausted(config, stats) {
            warn!(
                worker_id,
                url = %resource.url,
                capacity_mb = config.download.capacity_mb,
                "capacity budget exhausted, skipping remaining download"
            );
            stats.skipped.fetch_add(1, Ordering::SeqCst);
            progress.inc(1);
            continue;
        }

        // Per-worker pacing between fetch starts.
        if fetched_before && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        fetched_before = true;

        match download_one(config, fetcher, &resource, &dest).await {
            Ok(written) => {
                stats.downloaded.fetch_add(1, Ordering::SeqCst);
                stats.bytes.fetch_add(written, Ordering::SeqCst);
            }
            Err(e) => {
                warn!(worker_id, url = %resource.url, error = %e, "download failed");
                stats.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
        progress.inc(1);
    }
}

/// Fetches one asset and writes it atomically to its destination.
async fn download_one(
    config: &Config,
    fetcher: &Fetcher,
    resource: &ResourceUrl,
    dest: &Path,
) -> Result<u64, DownloadOneError> {
    let referer = resource.referer();
    let bytes = fetcher
        .fetch(&resource.url, &[("Referer", referer.as_str())])
        .await?;

    let illust_dir = storage::illust_dir(&config.download.store_path, &resource.illust_id);
    storage::ensure_dir(&illust_dir).await?;
    storage::write_atomic(dest, &bytes).await?;

    debug!(path = %dest.display(), bytes = bytes.len(), "asset written");
    Ok(bytes.len() as u64)
}

fn capacity_exhausted(config: &Config, stats: &DownloadStats) -> bool {
    let capacity_mb = config.download.capacity_mb;
    if capacity_mb == 0 {
        return false;
    }
    // A pathological budget saturates to "effectively unlimited" rather
    // than wrapping.
    stats.bytes() >= capacity_mb.saturating_mul(1024 * 1024)
}

/// Internal error for one download attempt; callers only log it.
#[derive(Debug, thiserror::Error)]
enum DownloadOneError {
    #[error(transparent)]
    Fetch(#[from] crate::fetch::FetchError),
    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),
}

/// Locks a mutex, recovering from poisoning (a panicked worker must not
/// wedge the rest of the pool).
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
