// Application state module
// Immutable state shared by every connection task

use std::io;

use super::types::Config;
use crate::resolver::PathResolver;

/// Application state
///
/// Built once at startup and shared behind an `Arc`; nothing in it changes
/// while the server runs, so request handling never takes a lock.
pub struct AppState {
    pub config: Config,
    pub resolver: PathResolver,
}

impl AppState {
    /// Canonicalize the configured root and build the resolver.
    ///
    /// Fails when the root does not exist or is not a directory.
    pub fn new(config: Config) -> io::Result<Self> {
        let resolver = PathResolver::new(&config.server.root, config.http.index_files.clone())?;
        Ok(Self { config, resolver })
    }
}
