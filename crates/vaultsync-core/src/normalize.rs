//! Canonical path forms used for identity comparison.
//!
//! Reservation sets, the ignore list, and the destination index all compare
//! paths by their normalized string form: native separators become `/`,
//! trailing separators are stripped, and on case-insensitive platforms the
//! whole string is case-folded. Two paths are the same object iff their
//! normalized forms are equal.

use std::path::{Path, PathBuf};

/// Produce the canonical string form of a path.
pub fn normalize(path: &Path) -> String {
    let mut s = path.to_string_lossy().replace('\\', "/");
    #[cfg(windows)]
    s.make_ascii_lowercase();
    while s.ends_with('/') {
        s.pop();
    }
    s
}

/// Prefix containment over normalized forms: `path` is `dir` itself or lives
/// somewhere beneath it.
pub fn is_under(dir: &str, path: &str) -> bool {
    if path == dir {
        return true;
    }
    if dir.is_empty() {
        return false;
    }
    path.len() > dir.len() && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/'
}

/// Decompose `path` as `root / rel`, falling back to the full path when it
/// does not live under `root`.
pub fn relative(root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix(root) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => path.to_path_buf(),
    }
}
