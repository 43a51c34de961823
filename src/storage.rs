//! On-disk layout and write discipline.
//!
//! Everything downloaded for one identifier lives in its own directory
//! under the configured store root:
//!
//! ```text
//! {store_path}/{illust_id}/
//!     {illust_id}_p0.png
//!     {illust_id}_p1.png
//!     metadata.json
//!     tags.json
//!     bookmark_data.json
//! ```
//!
//! File existence at these paths is the pipeline's only resumability
//! mechanism: a path that exists is never re-fetched. Writes go through a
//! temporary sibling path and an atomic rename so an interrupted run never
//! leaves a truncated artifact behind to poison the cache check.

use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

use crate::selector::MetadataKind;

/// Fallback extension when the asset URL carries none.
const DEFAULT_EXTENSION: &str = ".png";

/// Errors raised by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A directory could not be created or a file could not be written.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Creates a directory and all missing parents. Idempotent and safe under
/// concurrent callers (an already-existing directory is not an error).
///
/// # Errors
///
/// Returns [`StorageError::Io`] if creation fails for another reason.
pub async fn ensure_dir(path: &Path) -> Result<(), StorageError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| StorageError::io(path, e))
}

/// Writes bytes to `path` atomically: the bytes land in a `.part` sibling
/// first and are renamed into place, so readers never observe a partial
/// file.
///
/// # Errors
///
/// Returns [`StorageError::Io`] if the write or rename fails. The `.part`
/// file is removed best-effort on failure.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let tmp_path = tmp_sibling(path);
    if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(StorageError::io(tmp_path, e));
    }
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(StorageError::io(path, e));
    }
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(|| "download".into(), std::ffi::OsStr::to_os_string);
    name.push(".part");
    path.with_file_name(name)
}

/// Directory holding everything for one identifier.
#[must_use]
pub fn illust_dir(store_path: &Path, illust_id: &str) -> PathBuf {
    store_path.join(illust_id)
}

/// Path of one metadata document for an identifier.
#[must_use]
pub fn metadata_path(store_path: &Path, illust_id: &str, kind: MetadataKind) -> PathBuf {
    illust_dir(store_path, illust_id).join(kind.filename())
}

/// Deterministic asset filename from identifier, page ordinal, and the
/// extension of the source URL: `{id}_p{ordinal}{ext}`.
#[must_use]
pub fn asset_filename(illust_id: &str, ordinal: usize, url: &str) -> String {
    let ext = extension_from_url(url).unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    format!("{illust_id}_p{ordinal}{ext}")
}

/// Destination path of one downloadable asset.
#[must_use]
pub fn asset_path(store_path: &Path, illust_id: &str, ordinal: usize, url: &str) -> PathBuf {
    illust_dir(store_path, illust_id).join(asset_filename(illust_id, ordinal, url))
}

/// Extracts a lowercase `.ext` from the last path segment of a URL.
fn extension_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last_segment = parsed.path_segments()?.next_back()?;
    let dot_index = last_segment.rfind('.')?;
    let ext = &last_segment[dot_index..];
    if ext.len() <= 1 || ext.len() > 12 {
        return None;
    }
    Some(ext.to_lowercase())
}
