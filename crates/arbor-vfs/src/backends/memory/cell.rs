//! File content storage.
//!
//! A cell owns one regular file's bytes and metadata. Every handle opened on
//! the file shares the same cell.

use parking_lot::RwLock;
use std::time::SystemTime;

use super::dir::DirId;
use crate::config::VfsConfig;
use crate::error::{VfsError, VfsResult};
use crate::types::Entry;

pub(crate) struct ContentCell {
    /// Owning directory, or the directory itself for a `.` cell.
    dir: DirId,
    dot: bool,
    state: RwLock<CellState>,
}

struct CellState {
    /// Allocated buffer. `buf.len()` is the capacity; bytes past `size` are zero.
    buf: Vec<u8>,
    size: usize,
    entry: Entry,
}

impl ContentCell {
    pub(crate) fn new(dir: DirId, entry: Entry, capacity: usize) -> Self {
        tracing::trace!(dir, path = entry.path(), capacity, "new content cell");
        Self {
            dir,
            dot: false,
            state: RwLock::new(CellState {
                buf: vec![0; capacity],
                size: 0,
                entry,
            }),
        }
    }

    /// The `.` cell standing in for directory `dir`.
    pub(crate) fn dot(dir: DirId, entry: Entry) -> Self {
        Self {
            dir,
            dot: true,
            state: RwLock::new(CellState {
                buf: Vec::new(),
                size: 0,
                entry,
            }),
        }
    }

    pub(crate) fn dir_id(&self) -> DirId {
        self.dir
    }

    pub(crate) fn is_dot(&self) -> bool {
        self.dot
    }

    pub(crate) fn is_dir(&self) -> bool {
        self.state.read().entry.is_dir()
    }

    pub(crate) fn entry(&self) -> Entry {
        self.state.read().entry.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.read().size
    }

    pub(crate) fn capacity(&self) -> usize {
        self.state.read().buf.len()
    }

    /// Run `f` over the written bytes, `buf[..size]`, under one read lock.
    pub(crate) fn with_active<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let state = self.state.read();
        f(&state.buf[..state.size])
    }

    /// Copy bytes starting at `offset` into `out`. Returns the count copied.
    pub(crate) fn read_at(&self, offset: u64, out: &mut [u8]) -> usize {
        self.with_active(|active| {
            let Some(tail) = usize::try_from(offset).ok().and_then(|o| active.get(o..)) else {
                return 0;
            };
            let n = out.len().min(tail.len());
            out[..n].copy_from_slice(&tail[..n]);
            n
        })
    }

    /// Write `data` at `offset`, growing the buffer as needed.
    ///
    /// The modification time is checked before any byte is copied, so a
    /// rejected write leaves the content untouched.
    pub(crate) fn write_at(&self, offset: u64, data: &[u8], config: &VfsConfig) -> VfsResult<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let offset = usize::try_from(offset).map_err(|_| VfsError::TooLarge)?;
        let end = offset.checked_add(data.len()).ok_or(VfsError::TooLarge)?;
        if end > config.max_content_len {
            return Err(VfsError::TooLarge);
        }

        let mut state = self.state.write();
        let capacity = state.buf.len();
        if state.size.max(offset) + data.len() >= capacity {
            let grown = grown_capacity(
                capacity,
                data.len(),
                config.growth_factor,
                config.max_content_len,
            )?
            .max(end);
            tracing::trace!(path = state.entry.path(), capacity, grown, "growing content buffer");
            state.buf.resize(grown, 0);
        }

        state.entry.set_mod_time(SystemTime::now())?;
        state.buf[offset..end].copy_from_slice(data);
        state.size = state.size.max(end);
        let size = state.size as u64;
        state.entry.set_size(size);
        Ok(data.len())
    }

    /// Drop the logical content. Capacity is kept.
    pub(crate) fn truncate(&self) {
        let mut state = self.state.write();
        let size = state.size;
        state.buf[..size].fill(0);
        state.size = 0;
        state.entry.set_size(0);
    }
}

/// Capacity after growing `capacity` to fit `n` more bytes.
pub(crate) fn grown_capacity(
    capacity: usize,
    n: usize,
    factor: f64,
    max: usize,
) -> VfsResult<usize> {
    let target = ((capacity as f64 + n as f64) * factor).round();
    if !target.is_finite() || target > max as f64 {
        return Err(VfsError::TooLarge);
    }
    Ok(target as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathRules;
    use crate::types::{Attributes, FileMode};

    fn bytes(cell: &ContentCell) -> Vec<u8> {
        cell.with_active(<[u8]>::to_vec)
    }

    fn cell(capacity: usize) -> ContentCell {
        let entry = Entry::new(
            "f.bin",
            Attributes::new(FileMode::file(0o644)),
            &PathRules::permissive(),
        )
        .unwrap();
        ContentCell::new(1, entry, capacity)
    }

    #[test]
    fn test_grown_capacity() {
        assert_eq!(grown_capacity(0, 2000, 1.618, usize::MAX).unwrap(), 3236);
        assert_eq!(grown_capacity(10, 10, 1.618, usize::MAX).unwrap(), 32);
        assert!(matches!(grown_capacity(100, 100, 1.618, 300), Err(VfsError::TooLarge)));
    }

    #[test]
    fn test_write_grows_and_tracks_size() {
        let cell = cell(0);
        let config = VfsConfig::default();
        assert_eq!(cell.write_at(0, b"hello", &config).unwrap(), 5);
        assert_eq!(cell.len(), 5);
        assert!(cell.capacity() >= 5);
        assert_eq!(cell.entry().size(), 5);
        assert_eq!(bytes(&cell), b"hello");
    }

    #[test]
    fn test_growth_preserves_bytes() {
        let cell = cell(4);
        let config = VfsConfig::default();
        cell.write_at(0, b"abcd", &config).unwrap();
        let before = cell.capacity();
        cell.write_at(4, &[b'x'; 100], &config).unwrap();
        assert!(cell.capacity() > before);
        let content = bytes(&cell);
        assert_eq!(&content[..4], b"abcd");
        assert_eq!(content.len(), 104);
    }

    #[test]
    fn test_write_past_max_is_too_large() {
        let cell = cell(0);
        let config = VfsConfig::default().with_max_content_len(100);
        cell.write_at(0, &[1; 50], &config).unwrap();
        let err = cell.write_at(50, &[2; 50], &config).unwrap_err();
        assert!(matches!(err, VfsError::TooLarge));
        assert_eq!(bytes(&cell), vec![1; 50]);
    }

    #[test]
    fn test_read_at_bounds() {
        let cell = cell(0);
        cell.write_at(0, b"0123456789", &VfsConfig::default()).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(cell.read_at(8, &mut buf), 2);
        assert_eq!(&buf[..2], b"89");
        assert_eq!(cell.read_at(10, &mut buf), 0);
        assert_eq!(cell.read_at(u64::MAX, &mut buf), 0);
    }

    #[test]
    fn test_truncate_keeps_capacity() {
        let cell = cell(0);
        cell.write_at(0, b"some content", &VfsConfig::default()).unwrap();
        let capacity = cell.capacity();
        cell.truncate();
        assert_eq!(cell.len(), 0);
        assert_eq!(cell.entry().size(), 0);
        assert_eq!(cell.capacity(), capacity);
        assert!(bytes(&cell).is_empty());
    }

    #[test]
    fn test_repeated_reads_do_not_deadlock() {
        let cell = cell(0);
        cell.write_at(0, b"abc", &VfsConfig::default()).unwrap();
        let mut buf = [0u8; 8];
        for _ in 0..1000 {
            assert_eq!(cell.read_at(0, &mut buf), 3);
            assert_eq!(&buf[..3], b"abc");
            assert_eq!(cell.with_active(<[u8]>::len), 3);
            assert_eq!(cell.len(), 3);
        }
    }
}
