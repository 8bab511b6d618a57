//! Path canonicalization and segmentation.
//!
//! Paths inside a filesystem are slash-separated and relative to its root.
//! Which strings are acceptable is decided by a pluggable predicate carried
//! in [`PathRules`].

use std::fmt;
use std::sync::Arc;

use crate::config::PathPolicy;
use crate::error::{VfsError, VfsResult};

/// Separator used by every in-memory path.
pub const SEPARATOR: char = '/';

/// Predicate deciding whether a trimmed path is acceptable.
pub type PathPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Path validity rules for one filesystem instance.
#[derive(Clone)]
pub struct PathRules {
    predicate: PathPredicate,
}

impl PathRules {
    /// Accept every path.
    pub fn permissive() -> Self {
        Self::with_predicate(|_| true)
    }

    /// Accept only lexically valid relative paths (see [`valid_path`]).
    pub fn strict() -> Self {
        Self::with_predicate(valid_path)
    }

    /// Use a custom predicate.
    pub fn with_predicate(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Returns true if the predicate accepts `path`.
    pub fn accepts(&self, path: &str) -> bool {
        (self.predicate)(path)
    }

    /// Trim, validate, drop one trailing separator and any volume prefix.
    ///
    /// An empty result names the root.
    pub fn clean<'a>(&self, path: &'a str) -> VfsResult<&'a str> {
        let trimmed = path.trim();
        if !self.accepts(trimmed) {
            return Err(VfsError::invalid_path(path));
        }
        let trimmed = trimmed.strip_suffix(SEPARATOR).unwrap_or(trimmed);
        Ok(&trimmed[volume_name(trimmed).len()..])
    }

    /// Clean `path` and split it into non-empty segments.
    pub fn split<'a>(&self, path: &'a str) -> VfsResult<Vec<&'a str>> {
        Ok(self
            .clean(path)?
            .split(SEPARATOR)
            .filter(|s| !s.is_empty())
            .collect())
    }

    /// Returns true if `path` is `"."` or its final segment is `"."`.
    pub fn ends_with_dot(&self, path: &str) -> bool {
        match self.clean(path) {
            Ok(cleaned) => base(cleaned) == ".",
            Err(_) => false,
        }
    }
}

impl Default for PathRules {
    fn default() -> Self {
        Self::permissive()
    }
}

impl fmt::Debug for PathRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathRules").finish_non_exhaustive()
    }
}

impl From<PathPolicy> for PathRules {
    fn from(policy: PathPolicy) -> Self {
        match policy {
            PathPolicy::Permissive => Self::permissive(),
            PathPolicy::Strict => Self::strict(),
        }
    }
}

/// Lexical validity of a slash-separated relative path.
///
/// `"."` is valid; otherwise no empty, `"."` or `".."` segments and no
/// leading or trailing separator.
pub fn valid_path(path: &str) -> bool {
    if path == "." {
        return true;
    }
    path.split(SEPARATOR)
        .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

/// Final segment of `path`, `"."` for an empty path.
pub fn base(path: &str) -> &str {
    let path = path.strip_suffix(SEPARATOR).unwrap_or(path);
    if path.is_empty() {
        return ".";
    }
    match path.rfind(SEPARATOR) {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// Everything before the final segment, `"."` when there is none.
pub fn dir(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(0) => "/",
        Some(i) => &path[..i],
        None => ".",
    }
}

/// Join two paths, treating `"."` and `""` as the root.
pub fn join(parent: &str, name: &str) -> String {
    match (parent, name) {
        ("." | "", _) => name.to_string(),
        (_, "." | "") => parent.to_string(),
        _ if parent.ends_with(SEPARATOR) => format!("{parent}{name}"),
        _ => format!("{parent}{SEPARATOR}{name}"),
    }
}

/// `path` relative to `base`, `"."` when they are equal, `None` when `path`
/// lies outside `base`. A base of `"."` or `""` is the root.
pub fn strip_base<'a>(base: &str, path: &'a str) -> Option<&'a str> {
    if base == "." || base.is_empty() {
        return Some(path);
    }
    if path == base {
        return Some(".");
    }
    path.strip_prefix(base)?.strip_prefix(SEPARATOR)
}

#[cfg(windows)]
fn volume_name(path: &str) -> &str {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        &path[..2]
    } else {
        ""
    }
}

#[cfg(not(windows))]
fn volume_name(_path: &str) -> &str {
    ""
}
