//! Static HTTP/1.1 file server
//!
//! Serves one directory tree over GET and HEAD with directory listings,
//! conditional requests and streamed file bodies.

pub mod cli;
pub mod config;
pub mod handler;
pub mod http;
pub mod logger;
pub mod resolver;
pub mod server;
