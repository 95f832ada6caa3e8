//! Static file serving module
//!
//! Turns resolved targets into responses: conditional checks, streamed file
//! bodies and directory listings.

use crate::handler::listing;
use crate::handler::router::RequestContext;
use crate::http::{self, body, cache, date, FileBody, FileHeaders, ResponseBody};
use crate::logger;
use crate::resolver::{DirectoryTarget, FileTarget};
use hyper::{Response, StatusCode};
use std::io::ErrorKind;
use tokio::fs::File;

/// Serve a regular file
///
/// The file is only opened for GET requests that are not answered with 304.
/// It is streamed in chunks of `chunk_size` bytes, never loaded whole.
pub async fn serve_file(
    ctx: &RequestContext<'_>,
    file: &FileTarget,
    chunk_size: usize,
) -> Response<ResponseBody> {
    let etag = cache::generate_etag(file.len, file.modified);
    let last_modified = date::format_http_date(file.modified);

    if cache::is_not_modified(
        ctx.if_none_match,
        ctx.if_modified_since,
        &etag,
        file.modified,
    ) {
        return http::build_304_response(&etag, &last_modified);
    }

    let headers = FileHeaders {
        content_type: file.content_type,
        content_length: file.len,
        last_modified: &last_modified,
        etag: &etag,
    };

    if ctx.is_head {
        return http::build_file_response(&headers, body::empty());
    }

    match File::open(&file.path).await {
        Ok(handle) => {
            let body = FileBody::new(handle, file.len, chunk_size).boxed();
            http::build_file_response(&headers, body)
        }
        Err(e) => open_error_response(ctx, file, &e),
    }
}

/// The file changed between resolution and open
fn open_error_response(
    ctx: &RequestContext<'_>,
    file: &FileTarget,
    err: &std::io::Error,
) -> Response<ResponseBody> {
    match err.kind() {
        ErrorKind::NotFound => {
            logger::log_warning(&format!(
                "File disappeared before it could be opened: {}",
                file.path.display()
            ));
            http::build_error_response(StatusCode::NOT_FOUND, ctx.is_head)
        }
        ErrorKind::PermissionDenied => {
            logger::log_warning(&format!(
                "Permission denied opening {}",
                file.path.display()
            ));
            http::build_error_response(StatusCode::FORBIDDEN, ctx.is_head)
        }
        _ => {
            logger::log_error(&format!(
                "Failed to open {}: {err}",
                file.path.display()
            ));
            http::build_500_response(ctx.is_head)
        }
    }
}

/// Serve the generated listing of a directory without an index file
pub fn serve_directory(ctx: &RequestContext<'_>, dir: &DirectoryTarget) -> Response<ResponseBody> {
    let html = listing::render(&dir.display_path, &dir.entries);
    http::build_html_response(html, ctx.is_head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::DirEntryInfo;
    use http_body_util::BodyExt;
    use hyper::header::{CONTENT_LENGTH, ETAG, LAST_MODIFIED};
    use std::time::{Duration, UNIX_EPOCH};

    fn ctx(is_head: bool) -> RequestContext<'static> {
        RequestContext {
            path: "/a.txt",
            query: None,
            is_head,
            if_none_match: None,
            if_modified_since: None,
        }
    }

    fn target(dir: &tempfile::TempDir, content: &[u8]) -> FileTarget {
        let path = dir.path().join("a.txt");
        std::fs::write(&path, content).unwrap();
        let metadata = std::fs::metadata(&path).unwrap();
        FileTarget::from_metadata(path.clone(), &path, &metadata)
    }

    async fn body_bytes(resp: Response<ResponseBody>) -> Vec<u8> {
        resp.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    #[tokio::test]
    async fn test_get_streams_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = target(&dir, b"hello world");
        let resp = serve_file(&ctx(false), &file, 4).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_LENGTH], "11");
        assert!(resp.headers().contains_key(ETAG));
        assert!(resp.headers().contains_key(LAST_MODIFIED));
        assert_eq!(body_bytes(resp).await, b"hello world");
    }

    #[tokio::test]
    async fn test_head_has_headers_but_no_body() {
        let dir = tempfile::tempdir().unwrap();
        let file = target(&dir, b"hello world");
        let resp = serve_file(&ctx(true), &file, 4).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_LENGTH], "11");
        assert!(body_bytes(resp).await.is_empty());
    }

    #[tokio::test]
    async fn test_matching_etag_gives_304() {
        let dir = tempfile::tempdir().unwrap();
        let file = target(&dir, b"hello");
        let etag = cache::generate_etag(file.len, file.modified);
        let mut request = ctx(false);
        request.if_none_match = Some(&etag);
        let resp = serve_file(&request, &file, 4).await;
        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
        assert!(body_bytes(resp).await.is_empty());
    }

    #[tokio::test]
    async fn test_old_if_modified_since_gives_200() {
        let dir = tempfile::tempdir().unwrap();
        let file = target(&dir, b"hello");
        let mut request = ctx(false);
        request.if_modified_since = Some("Sun, 06 Nov 1994 08:49:37 GMT");
        let resp = serve_file(&request, &file, 4).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_vanished_file_gives_404() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileTarget {
            path: dir.path().join("gone.txt"),
            len: 5,
            modified: UNIX_EPOCH + Duration::from_secs(1_000_000),
            content_type: "text/plain; charset=utf-8",
        };
        let resp = serve_file(&ctx(false), &file, 4).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_directory_listing() {
        let dir = DirectoryTarget {
            path: std::path::PathBuf::from("/srv"),
            display_path: "/".to_string(),
            entries: vec![DirEntryInfo {
                name: "a.txt".to_string(),
                is_dir: false,
                is_symlink: false,
            }],
        };
        let resp = serve_directory(&ctx(false), &dir);
        assert_eq!(resp.status(), StatusCode::OK);
        let html = String::from_utf8(body_bytes(resp).await).unwrap();
        assert!(html.contains("Directory listing for /"));
        assert!(html.contains("href=\"a.txt\""));
    }
}
