//! Pure extraction of data from pixiv ajax payloads.
//!
//! Every function here is a pure transform from raw response bytes to
//! structured data; no I/O and no state. The three-way distinction the
//! collector's cache logic depends on is preserved everywhere:
//!
//! - `Ok(Some(data))` - payload carried data
//! - `Ok(None)` - payload is legitimately empty (zero pages, no bookmark
//!   data); nothing to download, not a failure
//! - `Err(SelectError)` - malformed payload (API error flag, schema
//!   mismatch); a definite failure for this attempt, retryable on a later
//!   run
//!
//! The pixiv ajax envelope is `{"error": bool, "message": str, "body": ...}`.

use serde_json::Value;
use thiserror::Error;

use crate::downloader::ResourceUrl;

/// Arbitrary structured metadata document persisted per identifier.
pub type MetadataRecord = Value;

/// Errors raised when a payload cannot be interpreted.
#[derive(Debug, Error)]
pub enum SelectError {
    /// The payload is not valid JSON.
    #[error("payload is not valid JSON: {source}")]
    Json {
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The API reported an error in the response envelope.
    #[error("API error: {message}")]
    Api {
        /// The `message` field from the envelope, if any.
        message: String,
    },

    /// A required field is missing or has the wrong type.
    #[error("payload schema mismatch: missing or invalid field `{field}`")]
    Schema {
        /// Dotted path of the offending field.
        field: &'static str,
    },
}

/// The closed set of per-identifier metadata extractions.
///
/// Each variant pairs an output filename with its selector; the collector's
/// metadata pass dispatches on this instead of taking a function pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    /// Full illust record (`metadata.json`).
    Metadata,
    /// Tag list (`tags.json`).
    Tags,
    /// Bookmark attributes (`bookmark_data.json`).
    Bookmark,
}

impl MetadataKind {
    /// Output filename for this kind, relative to the identifier's directory.
    #[must_use]
    pub fn filename(self) -> &'static str {
        match self {
            Self::Metadata => "metadata.json",
            Self::Tags => "tags.json",
            Self::Bookmark => "bookmark_data.json",
        }
    }

    /// Runs the selector for this kind over a raw illust payload.
    ///
    /// # Errors
    ///
    /// Returns [`SelectError`] for malformed payloads.
    pub fn select(self, bytes: &[u8]) -> Result<Option<MetadataRecord>, SelectError> {
        match self {
            Self::Metadata => select_metadata(bytes),
            Self::Tags => select_tags(bytes),
            Self::Bookmark => select_bookmark_data(bytes),
        }
    }
}

/// Parses the envelope, returning the `body` value.
fn select_body(bytes: &[u8]) -> Result<Value, SelectError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|source| SelectError::Json { source })?;

    let error_flag = value
        .get("error")
        .and_then(Value::as_bool)
        .ok_or(SelectError::Schema { field: "error" })?;
    if error_flag {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(SelectError::Api { message });
    }

    value
        .get("body")
        .cloned()
        .ok_or(SelectError::Schema { field: "body" })
}

/// Extracts the downloadable image URLs from a pages payload
/// (`/ajax/illust/{id}/pages`).
///
/// Returns `Ok(None)` when the artwork has zero pages - nothing to
/// download, not a failure.
///
/// # Errors
///
/// Returns [`SelectError`] if the envelope or any page entry is malformed.
pub fn select_page(bytes: &[u8], illust_id: &str) -> Result<Option<Vec<ResourceUrl>>, SelectError> {
    let body = select_body(bytes)?;
    let pages = body
        .as_array()
        .ok_or(SelectError::Schema { field: "body" })?;

    if pages.is_empty() {
        return Ok(None);
    }

    let mut urls = Vec::with_capacity(pages.len());
    for (ordinal, page) in pages.iter().enumerate() {
        let original = page
            .get("urls")
            .and_then(|u| u.get("original"))
            .and_then(Value::as_str)
            .ok_or(SelectError::Schema {
                field: "body[].urls.original",
            })?;
        urls.push(ResourceUrl::new(illust_id, ordinal, original));
    }
    Ok(Some(urls))
}

/// Extracts the full illust record from an illust payload (`/ajax/illust/{id}`).
///
/// # Errors
///
/// Returns [`SelectError`] if the envelope is malformed.
pub fn select_metadata(bytes: &[u8]) -> Result<Option<MetadataRecord>, SelectError> {
    let body = select_body(bytes)?;
    if body.is_null() {
        return Ok(None);
    }
    if !body.is_object() {
        return Err(SelectError::Schema { field: "body" });
    }
    Ok(Some(body))
}

/// Extracts the tag list from an illust payload.
///
/// Each entry keeps the tag name and, when present, its translations.
///
/// # Errors
///
/// Returns [`SelectError`] if the envelope or the tag container is malformed.
pub fn select_tags(bytes: &[u8]) -> Result<Option<MetadataRecord>, SelectError> {
    let body = select_body(bytes)?;
    if body.is_null() {
        return Ok(None);
    }
    let tags = body
        .get("tags")
        .and_then(|t| t.get("tags"))
        .and_then(Value::as_array)
        .ok_or(SelectError::Schema {
            field: "body.tags.tags",
        })?;

    let mut records = Vec::with_capacity(tags.len());
    for tag in tags {
        let name = tag
            .get("tag")
            .and_then(Value::as_str)
            .ok_or(SelectError::Schema {
                field: "body.tags.tags[].tag",
            })?;
        let mut record = serde_json::Map::new();
        record.insert("tag".to_string(), Value::String(name.to_string()));
        if let Some(translation) = tag.get("translation") {
            if !translation.is_null() {
                record.insert("translation".to_string(), translation.clone());
            }
        }
        records.push(Value::Object(record));
    }
    Ok(Some(Value::Array(records)))
}

/// Extracts the viewer's bookmark attributes from an illust payload.
///
/// Returns `Ok(None)` when the artwork is not bookmarked by the viewer.
///
/// # Errors
///
/// Returns [`SelectError`] if the envelope is malformed.
pub fn select_bookmark_data(bytes: &[u8]) -> Result<Option<MetadataRecord>, SelectError> {
    let body = select_body(bytes)?;
    if body.is_null() {
        return Ok(None);
    }
    match body.get("bookmarkData") {
        None | Some(Value::Null) => Ok(None),
        Some(data) => Ok(Some(data.clone())),
    }
}

/// Extracts identifiers from a ranking page (`ranking.php?format=json`).
///
/// Returns `Ok(None)` when the page carries no entries (past the end of
/// the ranking).
///
/// # Errors
///
/// Returns [`SelectError`] if the payload is malformed.
pub fn select_ranking_ids(bytes: &[u8]) -> Result<Option<Vec<String>>, SelectError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|source| SelectError::Json { source })?;

    // ranking.php signals "no such page" with an `error` string instead of
    // the contents array.
    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return Err(SelectError::Api {
            message: message.to_string(),
        });
    }

    let contents = value
        .get("contents")
        .and_then(Value::as_array)
        .ok_or(SelectError::Schema { field: "contents" })?;
    if contents.is_empty() {
        return Ok(None);
    }

    let mut ids = Vec::with_capacity(contents.len());
    for entry in contents {
        let id = entry
            .get("illust_id")
            .ok_or(SelectError::Schema {
                field: "contents[].illust_id",
            })?;
        ids.push(id_to_string(id).ok_or(SelectError::Schema {
            field: "contents[].illust_id",
        })?);
    }
    Ok(Some(ids))
}

/// Extracts identifiers and the total bookmark count from a bookmarks page
/// (`/ajax/user/{uid}/illusts/bookmarks`).
///
/// Returns `Ok(None)` when the page carries no works (past the end).
///
/// # Errors
///
/// Returns [`SelectError`] if the payload is malformed.
#[allow(clippy::type_complexity)]
pub fn select_bookmark_ids(bytes: &[u8]) -> Result<Option<(Vec<String>, u64)>, SelectError> {
    let body = select_body(bytes)?;
    let total = body
        .get("total")
        .and_then(Value::as_u64)
        .ok_or(SelectError::Schema { field: "body.total" })?;
    let works = body
        .get("works")
        .and_then(Value::as_array)
        .ok_or(SelectError::Schema { field: "body.works" })?;
    if works.is_empty() {
        return Ok(None);
    }

    let mut ids = Vec::with_capacity(works.len());
    for work in works {
        let id = work.get("id").ok_or(SelectError::Schema {
            field: "body.works[].id",
        })?;
        ids.push(id_to_string(id).ok_or(SelectError::Schema {
            field: "body.works[].id",
        })?);
    }
    Ok(Some((ids, total)))
}

/// Extracts identifiers from a keyword search page
/// (`/ajax/search/artworks/{word}`).
///
/// Returns `Ok(None)` when the page carries no results.
///
/// # Errors
///
/// Returns [`SelectError`] if the payload is malformed.
pub fn select_search_ids(bytes: &[u8]) -> Result<Option<Vec<String>>, SelectError> {
    let body = select_body(bytes)?;
    let data = body
        .get("illustManga")
        .and_then(|m| m.get("data"))
        .and_then(Value::as_array)
        .ok_or(SelectError::Schema {
            field: "body.illustManga.data",
        })?;
    if data.is_empty() {
        return Ok(None);
    }

    let mut ids = Vec::with_capacity(data.len());
    for entry in data {
        let id = entry.get("id").ok_or(SelectError::Schema {
            field: "body.illustManga.data[].id",
        })?;
        ids.push(id_to_string(id).ok_or(SelectError::Schema {
            field: "body.illustManga.data[].id",
        })?);
    }
    Ok(Some(ids))
}

/// Extracts the identifiers of every artwork in a user profile
/// (`/ajax/user/{id}/profile/all`).
///
/// Returns `Ok(None)` when the artist has no artworks.
///
/// # Errors
///
/// Returns [`SelectError`] if the payload is malformed.
pub fn select_user_ids(bytes: &[u8]) -> Result<Option<Vec<String>>, SelectError> {
    let body = select_body(bytes)?;
    let illusts = body
        .get("illusts")
        .ok_or(SelectError::Schema {
            field: "body.illusts",
        })?;

    // An artist with no artworks gets an empty array here instead of a map.
    let ids: Vec<String> = match illusts {
        Value::Object(map) => map.keys().cloned().collect(),
        Value::Array(entries) if entries.is_empty() => Vec::new(),
        _ => {
            return Err(SelectError::Schema {
                field: "body.illusts",
            });
        }
    };

    if ids.is_empty() {
        return Ok(None);
    }
    Ok(Some(ids))
}

/// Identifiers appear as both JSON strings and JSON numbers across endpoints.
fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pages_payload(urls: &[&str]) -> Vec<u8> {
        let pages: Vec<Value> = urls
            .iter()
            .map(|u| serde_json::json!({"urls": {"original": u}}))
            .collect();
        serde_json::to_vec(&serde_json::json!({
            "error": false,
            "message": "",
            "body": pages,
        }))
        .unwrap()
    }

    #[test]
    fn test_select_page_multiple_pages() {
        let payload = pages_payload(&[
            "https://i.pximg.net/img-original/img/100_p0.png",
            "https://i.pximg.net/img-original/img/100_p1.png",
        ]);
        let urls = select_page(&payload, "100").unwrap().unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].illust_id, "100");
        assert_eq!(urls[0].ordinal, 0);
        assert_eq!(urls[1].ordinal, 1);
        assert!(urls[1].url.ends_with("_p1.png"));
    }

    #[test]
    fn test_select_page_zero_pages_is_empty_not_error() {
        let payload = pages_payload(&[]);
        assert!(select_page(&payload, "101").unwrap().is_none());
    }

    #[test]
    fn test_select_page_api_error_flag() {
        let payload = br#"{"error": true, "message": "restricted", "body": null}"#;
        let result = select_page(payload, "100");
        assert!(matches!(result, Err(SelectError::Api { message }) if message == "restricted"));
    }

    #[test]
    fn test_select_page_missing_error_flag_is_schema_error() {
        let payload = br#"{"body": []}"#;
        assert!(matches!(
            select_page(payload, "100"),
            Err(SelectError::Schema { field: "error" })
        ));
    }

    #[test]
    fn test_select_page_missing_original_url_is_schema_error() {
        let payload = br#"{"error": false, "body": [{"urls": {}}]}"#;
        assert!(matches!(
            select_page(payload, "100"),
            Err(SelectError::Schema { .. })
        ));
    }

    #[test]
    fn test_select_page_not_json() {
        let result = select_page(b"<html>rate limited</html>", "100");
        assert!(matches!(result, Err(SelectError::Json { .. })));
    }

    #[test]
    fn test_select_metadata_returns_body() {
        let payload = br#"{"error": false, "body": {"illustId": "100", "title": "t"}}"#;
        let record = select_metadata(payload).unwrap().unwrap();
        assert_eq!(record["illustId"], "100");
    }

    #[test]
    fn test_select_metadata_null_body() {
        let payload = br#"{"error": false, "body": null}"#;
        assert!(select_metadata(payload).unwrap().is_none());
    }

    #[test]
    fn test_select_tags_keeps_name_and_translation() {
        let payload = serde_json::to_vec(&serde_json::json!({
            "error": false,
            "body": {"tags": {"tags": [
                {"tag": "オリジナル", "translation": {"en": "original"}},
                {"tag": "風景"},
            ]}},
        }))
        .unwrap();
        let record = select_tags(&payload).unwrap().unwrap();
        let tags = record.as_array().unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0]["tag"], "オリジナル");
        assert_eq!(tags[0]["translation"]["en"], "original");
        assert!(tags[1].get("translation").is_none());
    }

    #[test]
    fn test_select_tags_missing_container_is_schema_error() {
        let payload = br#"{"error": false, "body": {"title": "t"}}"#;
        assert!(matches!(
            select_tags(payload),
            Err(SelectError::Schema { .. })
        ));
    }

    #[test]
    fn test_select_bookmark_data_absent_is_empty() {
        let payload = br#"{"error": false, "body": {"bookmarkData": null}}"#;
        assert!(select_bookmark_data(payload).unwrap().is_none());
    }

    #[test]
    fn test_select_bookmark_data_present() {
        let payload = br#"{"error": false, "body": {"bookmarkData": {"id": "9", "private": true}}}"#;
        let record = select_bookmark_data(payload).unwrap().unwrap();
        assert_eq!(record["private"], true);
    }

    #[test]
    fn test_metadata_kind_filenames() {
        assert_eq!(MetadataKind::Metadata.filename(), "metadata.json");
        assert_eq!(MetadataKind::Tags.filename(), "tags.json");
        assert_eq!(MetadataKind::Bookmark.filename(), "bookmark_data.json");
    }

    #[test]
    fn test_select_ranking_ids_numeric_and_string() {
        let payload = br#"{"contents": [{"illust_id": 100}, {"illust_id": "101"}]}"#;
        let ids = select_ranking_ids(payload).unwrap().unwrap();
        assert_eq!(ids, vec!["100".to_string(), "101".to_string()]);
    }

    #[test]
    fn test_select_ranking_ids_error_string() {
        let payload = br#"{"error": "no such ranking page"}"#;
        assert!(matches!(
            select_ranking_ids(payload),
            Err(SelectError::Api { .. })
        ));
    }

    #[test]
    fn test_select_ranking_ids_empty_page() {
        let payload = br#"{"contents": []}"#;
        assert!(select_ranking_ids(payload).unwrap().is_none());
    }

    #[test]
    fn test_select_bookmark_ids_with_total() {
        let payload = br#"{"error": false, "body": {"total": 120, "works": [{"id": "55"}]}}"#;
        let (ids, total) = select_bookmark_ids(payload).unwrap().unwrap();
        assert_eq!(ids, vec!["55".to_string()]);
        assert_eq!(total, 120);
    }

    #[test]
    fn test_select_search_ids() {
        let payload =
            br#"{"error": false, "body": {"illustManga": {"data": [{"id": "7"}, {"id": "8"}]}}}"#;
        let ids = select_search_ids(payload).unwrap().unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_select_user_ids_object_keys() {
        let payload = br#"{"error": false, "body": {"illusts": {"100": null, "101": null}}}"#;
        let mut ids = select_user_ids(payload).unwrap().unwrap();
        ids.sort();
        assert_eq!(ids, vec!["100".to_string(), "101".to_string()]);
    }

    #[test]
    fn test_select_user_ids_empty_array_form() {
        let payload = br#"{"error": false, "body": {"illusts": []}}"#;
        assert!(select_user_ids(payload).unwrap().is_none());
    }
}
