//! HTTP response building module
//!
//! Provides builders for every status the server emits. Headers are inserted
//! in the order they should appear on the wire.

use super::body::{self, ResponseBody};
use hyper::header::{
    HeaderValue, ALLOW, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED, LOCATION,
};
use hyper::{Response, StatusCode};

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
pub const ALLOWED_METHODS: &str = "GET, HEAD";

/// Validators sent with a file response
pub struct FileHeaders<'a> {
    pub content_type: &'a str,
    pub content_length: u64,
    pub last_modified: &'a str,
    pub etag: &'a str,
}

/// Build 200 OK response for a file; `body` is empty for HEAD
pub fn build_file_response(headers: &FileHeaders<'_>, body: ResponseBody) -> Response<ResponseBody> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, headers.content_type)
        .header(CONTENT_LENGTH, headers.content_length)
        .header(LAST_MODIFIED, headers.last_modified)
        .header(ETAG, headers.etag)
        .body(body)
        .unwrap_or_else(|e| {
            log_build_error("200", &e);
            build_500_response(false)
        })
}

/// Build 304 Not Modified response
pub fn build_304_response(etag: &str, last_modified: &str) -> Response<ResponseBody> {
    Response::builder()
        .status(StatusCode::NOT_MODIFIED)
        .header(LAST_MODIFIED, last_modified)
        .header(ETAG, etag)
        .body(body::empty())
        .unwrap_or_else(|e| {
            log_build_error("304", &e);
            build_500_response(false)
        })
}

/// Build 301 Moved Permanently response
pub fn build_redirect_response(location: &str) -> Response<ResponseBody> {
    Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(LOCATION, location)
        .header(CONTENT_LENGTH, 0)
        .body(body::empty())
        .unwrap_or_else(|e| {
            log_build_error("301", &e);
            build_500_response(false)
        })
}

/// Build 200 OK response carrying generated HTML
pub fn build_html_response(content: String, is_head: bool) -> Response<ResponseBody> {
    let content_length = content.len();
    let body = if is_head {
        body::empty()
    } else {
        body::full(content)
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, HTML_CONTENT_TYPE)
        .header(CONTENT_LENGTH, content_length)
        .body(body)
        .unwrap_or_else(|e| {
            log_build_error("HTML", &e);
            build_500_response(is_head)
        })
}

/// Build an error response with a small HTML explanation
///
/// Used for 400, 403, 404 and 414.
pub fn build_error_response(status: StatusCode, is_head: bool) -> Response<ResponseBody> {
    error_page(status, is_head)
}

/// Build 405 Method Not Allowed response
pub fn build_405_response(is_head: bool) -> Response<ResponseBody> {
    let mut response = error_page(StatusCode::METHOD_NOT_ALLOWED, is_head);
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
    response
}

/// Build 500 Internal Server Error response
///
/// Never carries details of the failure, and asks hyper to close the
/// connection once it is written.
pub fn build_500_response(is_head: bool) -> Response<ResponseBody> {
    let mut response = error_page(StatusCode::INTERNAL_SERVER_ERROR, is_head);
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

fn error_page(status: StatusCode, is_head: bool) -> Response<ResponseBody> {
    let page = error_html(status);
    let content_length = page.len();
    let body = if is_head {
        body::empty()
    } else {
        body::full(page)
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(content_length));
    response
}

fn error_html(status: StatusCode) -> String {
    let code = status.as_u16();
    let reason = status.canonical_reason().unwrap_or("Error");
    format!(
        "<!DOCTYPE HTML>\n\
         <html lang=\"en\">\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <title>{code} {reason}</title>\n\
         </head>\n\
         <body>\n\
         <h1>{code} {reason}</h1>\n\
         </body>\n\
         </html>\n"
    )
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}
