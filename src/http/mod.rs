//! HTTP protocol layer module
//!
//! Provides HTTP protocol-related base functionality, decoupled from path
//! resolution and connection handling.

pub mod body;
pub mod cache;
pub mod date;
pub mod mime;
pub mod response;

// Re-export commonly used types
pub use body::{FileBody, ResponseBody};
pub use response::{
    build_304_response, build_405_response, build_500_response, build_error_response,
    build_file_response, build_html_response, build_redirect_response, FileHeaders,
};
