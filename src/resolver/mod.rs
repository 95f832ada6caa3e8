//! Path resolution module
//!
//! Maps request paths onto the served directory tree. The root is
//! canonicalized once; every `File` or `Directory` target handed back has a
//! canonical path beneath it, checked after symlinks are resolved.

mod target;

pub use target::{DirEntryInfo, DirectoryTarget, FileTarget, ResolveError, ResolvedTarget};

use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::logger;
use target::is_within;

/// Longest decoded request path accepted (Linux `PATH_MAX`)
pub const MAX_PATH_LEN: usize = 4096;
/// Longest single path segment accepted (`NAME_MAX`)
pub const MAX_SEGMENT_LEN: usize = 255;

/// Resolves request paths beneath a fixed root directory
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    index_files: Vec<String>,
}

impl PathResolver {
    /// Canonicalize `root` and check that it is a directory
    pub fn new(root: impl AsRef<Path>, index_files: Vec<String>) -> io::Result<Self> {
        let root = root.as_ref().canonicalize().map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("root directory '{}': {e}", root.as_ref().display()),
            )
        })?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("root '{}' is not a directory", root.display()),
            ));
        }
        Ok(Self { root, index_files })
    }

    /// Canonical root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a raw (still percent-encoded) request path
    pub async fn resolve(&self, raw_path: &str) -> Result<ResolvedTarget, ResolveError> {
        let decoded = decode_path(raw_path)?;
        let Some(segments) = normalize_segments(&decoded)? else {
            logger::log_warning(&format!("Path traversal attempt blocked: {raw_path}"));
            return Ok(ResolvedTarget::Forbidden);
        };

        let mut candidate = self.root.clone();
        candidate.extend(&segments);

        let canonical = match fs::canonicalize(&candidate).await {
            Ok(p) => p,
            Err(e) => return classify_io_error(e),
        };
        if !is_within(&self.root, &canonical) {
            logger::log_warning(&format!(
                "Path traversal attempt blocked: {} -> {}",
                raw_path,
                canonical.display()
            ));
            return Ok(ResolvedTarget::Forbidden);
        }

        let metadata = match fs::metadata(&canonical).await {
            Ok(m) => m,
            Err(e) => return classify_io_error(e),
        };

        if metadata.is_dir() {
            if !raw_path.ends_with('/') {
                return Ok(ResolvedTarget::Redirect {
                    location: directory_location(raw_path),
                });
            }
            if let Some(index) = self.find_index(&canonical).await {
                return Ok(ResolvedTarget::File(index));
            }
            let entries = match read_entries(&canonical).await {
                Ok(entries) => entries,
                Err(e) => return classify_io_error(e),
            };
            let display_path = if decoded.is_empty() {
                "/".to_string()
            } else {
                decoded
            };
            return Ok(ResolvedTarget::Directory(DirectoryTarget {
                path: canonical,
                display_path,
                entries,
            }));
        }

        if metadata.is_file() {
            if raw_path.ends_with('/') {
                return Ok(ResolvedTarget::NotFound);
            }
            return Ok(ResolvedTarget::File(FileTarget::from_metadata(
                canonical, &candidate, &metadata,
            )));
        }

        logger::log_debug(&format!(
            "Refusing to serve special file {}",
            canonical.display()
        ));
        Ok(ResolvedTarget::Forbidden)
    }

    /// First configured index file that is a regular file inside the root
    async fn find_index(&self, dir: &Path) -> Option<FileTarget> {
        for name in &self.index_files {
            let requested = dir.join(name);
            let Ok(path) = fs::canonicalize(&requested).await else {
                continue;
            };
            if !is_within(&self.root, &path) {
                continue;
            }
            match fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => {
                    return Some(FileTarget::from_metadata(path, &requested, &metadata));
                }
                _ => {}
            }
        }
        None
    }
}

/// Percent-decode a request path, enforcing UTF-8, no NUL and length limits
fn decode_path(raw_path: &str) -> Result<String, ResolveError> {
    if has_malformed_escape(raw_path) {
        return Err(ResolveError::BadRequest("malformed percent-encoding"));
    }
    let decoded = urlencoding::decode(raw_path)
        .map_err(|_| ResolveError::BadRequest("path is not valid UTF-8"))?;
    if decoded.contains('\0') {
        return Err(ResolveError::BadRequest("path contains a NUL byte"));
    }
    if decoded.len() > MAX_PATH_LEN {
        return Err(ResolveError::UriTooLong);
    }
    Ok(decoded.into_owned())
}

/// `%` must always introduce two hex digits
fn has_malformed_escape(raw_path: &str) -> bool {
    let bytes = raw_path.as_bytes();
    bytes.iter().enumerate().any(|(i, &b)| {
        b == b'%'
            && !(bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit))
    })
}

/// Collapse `.`, `..` and empty segments
///
/// Returns `Ok(None)` when `..` would climb above the root or a segment is not
/// a plain file name on this platform.
fn normalize_segments(decoded: &str) -> Result<Option<Vec<&str>>, ResolveError> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Ok(None);
                }
            }
            _ => {
                if segment.len() > MAX_SEGMENT_LEN {
                    return Err(ResolveError::UriTooLong);
                }
                if !is_plain_segment(segment) {
                    return Ok(None);
                }
                segments.push(segment);
            }
        }
    }
    Ok(Some(segments))
}

/// A segment must be exactly one normal component (no drive prefix or
/// platform separator hiding inside it)
fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Same path with one trailing slash; leading slashes are collapsed so the
/// `Location` can never be read as a network-path reference (`//host/`)
fn directory_location(raw_path: &str) -> String {
    let trimmed = raw_path.trim_start_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

fn classify_io_error(e: io::Error) -> Result<ResolvedTarget, ResolveError> {
    match e.kind() {
        io::ErrorKind::NotFound
        | io::ErrorKind::NotADirectory
        | io::ErrorKind::InvalidFilename => Ok(ResolvedTarget::NotFound),
        // `ErrorKind::FilesystemLoop` cannot be named on stable Rust
        kind if format!("{kind:?}") == "FilesystemLoop" => Ok(ResolvedTarget::NotFound),
        io::ErrorKind::PermissionDenied => Ok(ResolvedTarget::Forbidden),
        _ => Err(ResolveError::Io(e)),
    }
}

/// Immediate children of `dir`, sorted case-insensitively
async fn read_entries(dir: &Path) -> io::Result<Vec<DirEntryInfo>> {
    let mut reader = fs::read_dir(dir).await?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        let is_symlink = file_type.is_symlink();
        let is_dir = if is_symlink {
            fs::metadata(entry.path()).await.is_ok_and(|m| m.is_dir())
        } else {
            file_type.is_dir()
        };
        entries.push(DirEntryInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir,
            is_symlink,
        });
    }
    entries.sort_by_cached_key(|e| e.name.to_lowercase());
    Ok(entries)
}
