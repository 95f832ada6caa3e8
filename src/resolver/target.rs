//! Resolution results

use std::fmt;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::http::mime;

/// What a request path refers to beneath the root
#[derive(Debug)]
pub enum ResolvedTarget {
    File(FileTarget),
    Directory(DirectoryTarget),
    /// Directory requested without its trailing slash
    Redirect { location: String },
    NotFound,
    /// Outside the root, unreadable, or not a regular file or directory
    Forbidden,
}

/// A regular file inside the root
#[derive(Debug, Clone)]
pub struct FileTarget {
    /// Canonical path
    pub path: PathBuf,
    pub len: u64,
    pub modified: SystemTime,
    pub content_type: &'static str,
}

impl FileTarget {
    /// `requested` is the path as named in the request, before symlinks are
    /// resolved; the content type is guessed from its extension
    pub fn from_metadata(path: PathBuf, requested: &Path, metadata: &Metadata) -> Self {
        let content_type = mime::content_type_for(requested);
        Self {
            len: metadata.len(),
            modified: metadata.modified().unwrap_or(UNIX_EPOCH),
            content_type,
            path,
        }
    }
}

/// A directory inside the root, with its immediate children
#[derive(Debug, Clone)]
pub struct DirectoryTarget {
    /// Canonical path
    pub path: PathBuf,
    /// Decoded request path, used as the listing title
    pub display_path: String,
    /// Sorted case-insensitively by name
    pub entries: Vec<DirEntryInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
    pub is_symlink: bool,
}

impl DirEntryInfo {
    /// Name as shown in a listing: `/` after directories, `@` after symlinks
    pub fn display_name(&self) -> String {
        if self.is_symlink {
            format!("{}@", self.name)
        } else if self.is_dir {
            format!("{}/", self.name)
        } else {
            self.name.clone()
        }
    }

    /// Relative link target; directories keep their trailing slash
    pub fn href(&self) -> String {
        let encoded = urlencoding::encode(&self.name);
        if self.is_dir {
            format!("{encoded}/")
        } else {
            encoded.into_owned()
        }
    }
}

/// Requests that cannot be resolved at all
#[derive(Debug)]
pub enum ResolveError {
    /// Undecodable path or one containing a NUL byte
    BadRequest(&'static str),
    /// Path or one of its segments exceeds filesystem limits
    UriTooLong,
    /// Unexpected filesystem failure
    Io(io::Error),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(reason) => write!(f, "bad request path: {reason}"),
            Self::UriTooLong => write!(f, "request path too long"),
            Self::Io(e) => write!(f, "filesystem error: {e}"),
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// True when `path` is `root` or lies beneath it (component-wise)
pub fn is_within(root: &Path, path: &Path) -> bool {
    path.starts_with(root)
}
