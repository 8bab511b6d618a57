//! Filesystem capability traits.
//!
//! Capabilities are split so a backend can offer read access without write
//! access. Every backend in this crate implements all of them.
//!
//! Paths are slash-separated and relative to the filesystem's root.

use std::io::{self, SeekFrom};

use crate::error::{Op, VfsError, VfsResult};
use crate::types::{DirPage, Entry, FileMode, OpenFlags, ReadAt};

/// Chunk size for bulk transfers.
pub(crate) const COPY_CHUNK: usize = 32 * 1024;

/// An open file or directory handle.
///
/// Each handle owns its own cursors. Handles are shared by reference, so
/// every method takes `&self`.
pub trait VfsFile: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Read from the read cursor. `Ok(0)` means end of data.
    fn read(&self, buf: &mut [u8]) -> VfsResult<usize>;

    /// Read from an absolute offset without moving the cursor.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<ReadAt>;

    /// Move the read cursor.
    fn seek(&self, pos: SeekFrom) -> VfsResult<u64>;

    /// Read up to `n` directory entries, or all remaining when `n <= 0`.
    ///
    /// A page shorter than `n` has `eof` set. With `n > 0`, reading past
    /// the last entry fails with [`VfsError::EndOfDirectory`].
    fn read_dir(&self, n: isize) -> VfsResult<DirPage>;

    /// Metadata for the open node.
    fn stat(&self) -> VfsResult<Entry>;

    /// Read everything from the cursor to the end of data.
    fn read_to_end(&self, out: &mut Vec<u8>) -> VfsResult<usize> {
        let mut chunk = vec![0u8; COPY_CHUNK];
        let mut total = 0;
        loop {
            let n = self.read(&mut chunk)?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&chunk[..n]);
            total += n;
        }
    }

    // ========================================================================
    // Writing
    // ========================================================================

    /// Write at the write cursor.
    fn write(&self, buf: &[u8]) -> VfsResult<usize>;

    /// Copy everything from `src` through [`VfsFile::write`].
    fn read_from(&self, src: &mut dyn io::Read) -> VfsResult<u64> {
        let mut chunk = vec![0u8; COPY_CHUNK];
        let mut total = 0u64;
        loop {
            let n = match src.read(&mut chunk) {
                Ok(0) => return Ok(total),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let path = self.stat().map(|s| s.path().to_string()).unwrap_or_default();
                    return Err(VfsError::Io(e).with_op(Op::ReadFrom, path));
                }
            };
            let mut written = 0;
            while written < n {
                written += self.write(&chunk[written..n])?;
            }
            total += n as u64;
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Close the handle. Only the first call succeeds.
    fn close(&self) -> VfsResult<()>;
}

/// Read-side filesystem operations.
pub trait ReadableFs: Send + Sync {
    /// Open a file or directory for reading.
    fn open(&self, path: &str) -> VfsResult<Box<dyn VfsFile>>;

    /// Metadata for a path.
    fn stat(&self, path: &str) -> VfsResult<Entry>;

    /// All entries of a directory, sorted by name.
    fn read_dir(&self, path: &str) -> VfsResult<Vec<Entry>>;

    /// Whole content of a regular file.
    fn read_file(&self, path: &str) -> VfsResult<Vec<u8>>;

    /// Paths matching a shell pattern.
    fn glob(&self, pattern: &str) -> VfsResult<Vec<String>>;

    /// A view rooted at `dir`.
    fn sub(&self, dir: &str) -> VfsResult<Box<dyn FileSystem>>;

    /// Check if a path exists.
    fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }
}

/// Write-side filesystem operations.
pub trait WritableFs: Send + Sync {
    /// Create or truncate a file for reading and writing.
    fn create(&self, path: &str) -> VfsResult<Box<dyn VfsFile>>;

    /// Open with explicit flags and a mode for newly created nodes.
    fn open_file(&self, path: &str, flags: OpenFlags, mode: FileMode)
    -> VfsResult<Box<dyn VfsFile>>;

    /// Create one directory. The parent must exist.
    fn mkdir(&self, path: &str, mode: FileMode) -> VfsResult<()>;

    /// Create a directory and any missing parents.
    fn mkdir_all(&self, path: &str, mode: FileMode) -> VfsResult<()>;

    /// Replace the content of a file, creating it if needed.
    fn write_file(&self, path: &str, data: &[u8], mode: FileMode) -> VfsResult<()>;

    /// Remove a file or empty directory.
    fn remove(&self, path: &str) -> VfsResult<()>;

    /// Remove a path and everything below it.
    fn remove_all(&self, path: &str) -> VfsResult<()>;

    /// Rename a path.
    fn rename(&self, from: &str, to: &str) -> VfsResult<()>;
}

/// A complete filesystem backend.
pub trait FileSystem: ReadableFs + WritableFs {
    /// Separator used in this filesystem's paths.
    fn path_separator(&self) -> &str;

    /// Backend identifier.
    fn provider(&self) -> &str;

    /// Root path of this filesystem.
    fn root(&self) -> VfsResult<String>;

    /// Release the filesystem.
    fn close(&self) -> VfsResult<()>;
}
