//! Directory iteration.

use std::sync::Arc;
use std::vec;

use super::dir::DirNode;
use crate::error::{VfsError, VfsResult};
use crate::types::{DirPage, Entry};

/// Forward-only iterator over one directory's children, in name order.
///
/// The set of names is captured when the iterator is created. A child removed
/// from the tree afterwards is skipped; one added afterwards is not seen.
/// Entry paths are relative to the view the iterator was opened through.
pub struct DirIterator {
    dir: Arc<DirNode>,
    base: String,
    names: vec::IntoIter<String>,
}

impl DirIterator {
    pub(crate) fn new(dir: Arc<DirNode>, base: impl Into<String>) -> Self {
        let names = dir.child_names().into_iter();
        Self {
            dir,
            base: base.into(),
            names,
        }
    }

    /// Up to `n` entries, or every remaining entry when `n <= 0`.
    ///
    /// With `n > 0`, a page shorter than `n` has `eof` set and an exhausted
    /// iterator fails with [`VfsError::EndOfDirectory`]. With `n <= 0` the
    /// page always has `eof` set and may be empty.
    pub fn next_n(&mut self, n: isize) -> VfsResult<DirPage> {
        if n <= 0 {
            return Ok(DirPage {
                entries: self.by_ref().collect(),
                eof: true,
            });
        }
        let want = n.unsigned_abs();
        let entries: Vec<Entry> = self.by_ref().take(want).collect();
        if entries.is_empty() {
            return Err(VfsError::EndOfDirectory);
        }
        let eof = entries.len() < want;
        Ok(DirPage { entries, eof })
    }
}

impl Iterator for DirIterator {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        loop {
            let name = self.names.next()?;
            if let Some(child) = self.dir.child(&name) {
                return Some(child.entry().rebased(&self.base));
            }
        }
    }
}

impl std::fmt::Debug for DirIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirIterator")
            .field("dir", &self.dir.path())
            .field("remaining", &self.names.len())
            .finish()
    }
}
