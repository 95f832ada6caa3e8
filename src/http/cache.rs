//! HTTP validator module
//!
//! Provides `ETag` generation from file metadata and conditional request
//! evaluation (`If-None-Match`, `If-Modified-Since`).

use super::date;
use std::time::{SystemTime, UNIX_EPOCH};

/// Generate an `ETag` from file size and modification time
///
/// The file is streamed, never hashed, so the tag is derived from metadata
/// the same way most static servers do it.
///
/// # Returns
/// Quoted `ETag` string, e.g., `"17a3c9e1f00-400"`
pub fn generate_etag(len: u64, modified: SystemTime) -> String {
    let nanos = modified
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    format!("\"{nanos:x}-{len:x}\"")
}

/// Check if client's `If-None-Match` header matches the server's `ETag`
///
/// Supports:
/// - Single `ETag`: `"abc123"`
/// - Multiple `ETags`: `"abc123", "def456"`
/// - Weak tags: `W/"abc123"` (weak comparison)
/// - Wildcard: `*`
pub fn check_etag_match(if_none_match: Option<&str>, etag: &str) -> bool {
    if_none_match.is_some_and(|client_etag| {
        client_etag.split(',').any(|e| {
            let e = e.trim();
            e == "*" || e.strip_prefix("W/").unwrap_or(e) == etag
        })
    })
}

/// Decide whether a conditional GET/HEAD can be answered with 304
///
/// `If-None-Match` takes precedence: when present, `If-Modified-Since` is
/// ignored. An unparseable `If-Modified-Since` never yields 304.
pub fn is_not_modified(
    if_none_match: Option<&str>,
    if_modified_since: Option<&str>,
    etag: &str,
    modified: SystemTime,
) -> bool {
    if if_none_match.is_some() {
        return check_etag_match(if_none_match, etag);
    }

    let Some(since) = if_modified_since.and_then(date::parse_http_date) else {
        return false;
    };
    date::truncate_to_seconds(modified) <= since
}
