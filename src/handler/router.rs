//! Request routing dispatch module
//!
//! Entry point for HTTP request processing, responsible for method validation,
//! path resolution and dispatching to the file or listing handlers.

use crate::config::AppState;
use crate::handler::static_files;
use crate::http::{self, ResponseBody};
use crate::logger::{self, AccessLogEntry};
use crate::resolver::{ResolveError, ResolvedTarget};
use hyper::header::{
    HeaderName, HeaderValue, CONTENT_LENGTH, IF_MODIFIED_SINCE, IF_NONE_MATCH, REFERER, SERVER, USER_AGENT,
};
use hyper::http::request::Parts;
use hyper::{Method, Request, Response, StatusCode, Version};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Request context encapsulating information needed for request processing
pub struct RequestContext<'a> {
    /// Raw (still percent-encoded) request path
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub is_head: bool,
    pub if_none_match: Option<&'a str>,
    pub if_modified_since: Option<&'a str>,
}

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<ResponseBody>, Infallible> {
    let started = Instant::now();
    // Request bodies are never read
    let (parts, _) = req.into_parts();
    let method = &parts.method;
    let is_head = *method == Method::HEAD;

    let mut response = if matches!(*method, Method::GET | Method::HEAD) {
        let headers = &parts.headers;
        let ctx = RequestContext {
            path: parts.uri.path(),
            query: parts.uri.query(),
            is_head,
            if_none_match: headers.get(IF_NONE_MATCH).and_then(|v| v.to_str().ok()),
            if_modified_since: headers
                .get(IF_MODIFIED_SINCE)
                .and_then(|v| v.to_str().ok()),
        };
        route_request(&ctx, &state).await
    } else {
        logger::log_warning(&format!("Method not allowed: {method}"));
        http::build_405_response(false)
    };

    if let Ok(server) = HeaderValue::from_str(&state.config.http.server_name) {
        response.headers_mut().insert(SERVER, server);
    }

    if state.config.logging.access_log {
        let entry = access_entry(&parts, &response, peer_addr, started);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

/// Resolve the request path and dispatch on the result
async fn route_request(ctx: &RequestContext<'_>, state: &AppState) -> Response<ResponseBody> {
    match state.resolver.resolve(ctx.path).await {
        Ok(ResolvedTarget::File(file)) => {
            static_files::serve_file(ctx, &file, state.config.http.read_buffer_size).await
        }
        Ok(ResolvedTarget::Directory(dir)) => static_files::serve_directory(ctx, &dir),
        Ok(ResolvedTarget::Redirect { location }) => {
            let location = match ctx.query {
                Some(query) => format!("{location}?{query}"),
                None => location,
            };
            http::build_redirect_response(&location)
        }
        Ok(ResolvedTarget::NotFound) => {
            http::build_error_response(StatusCode::NOT_FOUND, ctx.is_head)
        }
        Ok(ResolvedTarget::Forbidden) => {
            http::build_error_response(StatusCode::FORBIDDEN, ctx.is_head)
        }
        Err(ResolveError::BadRequest(reason)) => {
            logger::log_debug(&format!("Bad request path {}: {reason}", ctx.path));
            http::build_error_response(StatusCode::BAD_REQUEST, ctx.is_head)
        }
        Err(ResolveError::UriTooLong) => {
            http::build_error_response(StatusCode::URI_TOO_LONG, ctx.is_head)
        }
        Err(ResolveError::Io(e)) => {
            logger::log_error(&format!("Failed to resolve {}: {e}", ctx.path));
            http::build_500_response(ctx.is_head)
        }
    }
}

fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2.0",
        Version::HTTP_3 => "3.0",
        _ => "1.1",
    }
}

/// Build the access log record once the response head is known
fn access_entry(
    req: &Parts,
    response: &Response<ResponseBody>,
    peer_addr: SocketAddr,
    started: Instant,
) -> AccessLogEntry {
    let header = |name: HeaderName| {
        req.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        req.method.to_string(),
        req.uri.path().to_string(),
    );
    entry.query = req.uri.query().map(ToString::to_string);
    entry.http_version = version_str(req.version).to_string();
    entry.status = response.status().as_u16();
    entry.body_bytes = if req.method == Method::HEAD {
        0
    } else {
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    };
    entry.referer = header(REFERER);
    entry.user_agent = header(USER_AGENT);
    entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
    entry
}
