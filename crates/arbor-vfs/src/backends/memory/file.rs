//! Open file handles over content cells.

use parking_lot::Mutex;
use std::io::{self, SeekFrom};
use std::sync::Arc;

use super::Shared;
use super::cell::ContentCell;
use super::iter::DirIterator;
use crate::error::{Op, VfsError, VfsResult};
use crate::ops::VfsFile;
use crate::types::{DirPage, Entry, OpenFlags, ReadAt};

/// A handle on an in-memory file or directory.
///
/// Handles on the same file share its content but keep their own read and
/// write cursors. Directory handles are always read-only.
pub struct MemFile {
    cell: Arc<ContentCell>,
    shared: Arc<Shared>,
    flags: OpenFlags,
    path: String,
    /// Tree path of the view root the handle was opened through.
    base: String,
    state: Mutex<HandleState>,
}

#[derive(Default)]
struct HandleState {
    read_off: u64,
    write_off: u64,
    closed: bool,
    dir_iter: Option<DirIterator>,
}

impl MemFile {
    pub(crate) fn new(
        shared: Arc<Shared>,
        cell: Arc<ContentCell>,
        flags: OpenFlags,
        path: impl Into<String>,
        base: impl Into<String>,
    ) -> Self {
        let is_dir = cell.is_dir();
        let flags = if is_dir { OpenFlags::RDONLY } else { flags };
        if !is_dir && flags.has(OpenFlags::TRUNC) {
            cell.truncate();
        }
        let write_off = if flags.has(OpenFlags::APPEND) {
            cell.len() as u64
        } else {
            0
        };
        Self {
            cell,
            shared,
            flags,
            path: path.into(),
            base: base.into(),
            state: Mutex::new(HandleState {
                write_off,
                ..HandleState::default()
            }),
        }
    }

    /// Path this handle was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Effective open flags. Directory handles report read-only.
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// Allocated buffer size of the underlying file.
    pub fn capacity(&self) -> usize {
        self.cell.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn fail(&self, op: Op, err: VfsError) -> VfsError {
        err.with_op(op, self.path.as_str())
    }

    fn check_readable(&self, state: &HandleState) -> VfsResult<()> {
        if state.closed {
            return Err(VfsError::Closed);
        }
        if self.cell.is_dir() {
            return Err(VfsError::is_a_directory(self.path.as_str()));
        }
        if !self.flags.is_readable() {
            return Err(VfsError::WriteOnly);
        }
        Ok(())
    }

    fn check_writable(&self, state: &HandleState) -> VfsResult<()> {
        if state.closed {
            return Err(VfsError::Closed);
        }
        if self.cell.is_dir() {
            return Err(VfsError::is_a_directory(self.path.as_str()));
        }
        if !self.flags.is_writable() {
            return Err(VfsError::ReadOnly);
        }
        Ok(())
    }

    fn current_entry(&self) -> VfsResult<Entry> {
        let entry = if self.cell.is_dot() {
            self.shared
                .dirs
                .lookup(self.cell.dir_id())
                .map(|dir| dir.entry())
                .ok_or_else(|| VfsError::not_found(self.path.as_str()))?
        } else {
            self.cell.entry()
        };
        Ok(entry.rebased(&self.base))
    }
}

impl VfsFile for MemFile {
    fn read(&self, buf: &mut [u8]) -> VfsResult<usize> {
        let mut state = self.state.lock();
        self.check_readable(&state)
            .map_err(|e| self.fail(Op::Read, e))?;
        if buf.is_empty() {
            return Ok(0);
        }
        let n = self.cell.read_at(state.read_off, buf);
        state.read_off += n as u64;
        Ok(n)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<ReadAt> {
        let state = self.state.lock();
        self.check_readable(&state)
            .map_err(|e| self.fail(Op::ReadAt, e))?;
        let len = self.cell.read_at(offset, buf);
        Ok(ReadAt {
            len,
            eof: len < buf.len(),
        })
    }

    fn read_to_end(&self, out: &mut Vec<u8>) -> VfsResult<usize> {
        let mut state = self.state.lock();
        self.check_readable(&state)
            .map_err(|e| self.fail(Op::Read, e))?;
        let offset = state.read_off;
        let n = self.cell.with_active(|active| {
            let tail = usize::try_from(offset)
                .ok()
                .and_then(|o| active.get(o..))
                .unwrap_or_default();
            out.extend_from_slice(tail);
            tail.len()
        });
        state.read_off += n as u64;
        Ok(n)
    }

    fn seek(&self, pos: SeekFrom) -> VfsResult<u64> {
        let mut state = self.state.lock();
        self.check_readable(&state)
            .map_err(|e| self.fail(Op::Seek, e))?;
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(state.read_off) + i128::from(delta),
            SeekFrom::End(delta) => self.cell.len() as i128 + i128::from(delta),
        };
        let target = u64::try_from(target).map_err(|_| {
            self.fail(
                Op::Seek,
                VfsError::invalid_input(format!("invalid seek position {target}")),
            )
        })?;
        state.read_off = target;
        Ok(target)
    }

    fn read_dir(&self, n: isize) -> VfsResult<DirPage> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.fail(Op::ReadDir, VfsError::Closed));
        }
        if !self.cell.is_dir() {
            return Err(self.fail(Op::ReadDir, VfsError::not_a_directory(self.path.as_str())));
        }
        if state.dir_iter.is_none() {
            let dir = self
                .shared
                .dirs
                .lookup(self.cell.dir_id())
                .ok_or_else(|| self.fail(Op::ReadDir, VfsError::not_found(self.path.as_str())))?;
            state.dir_iter = Some(DirIterator::new(dir, self.base.as_str()));
        }
        match state.dir_iter.as_mut() {
            Some(iter) => iter.next_n(n).map_err(|e| self.fail(Op::ReadDir, e)),
            None => Ok(DirPage::default()),
        }
    }

    fn stat(&self) -> VfsResult<Entry> {
        let state = self.state.lock();
        if state.closed {
            return Err(self.fail(Op::Stat, VfsError::Closed));
        }
        self.current_entry().map_err(|e| self.fail(Op::Stat, e))
    }

    fn write(&self, buf: &[u8]) -> VfsResult<usize> {
        let mut state = self.state.lock();
        self.check_writable(&state)
            .map_err(|e| self.fail(Op::Write, e))?;
        let n = self
            .cell
            .write_at(state.write_off, buf, &self.shared.config)
            .map_err(|e| self.fail(Op::Write, e))?;
        state.write_off += n as u64;
        Ok(n)
    }

    fn read_from(&self, src: &mut dyn io::Read) -> VfsResult<u64> {
        {
            let state = self.state.lock();
            self.check_writable(&state)
                .map_err(|e| self.fail(Op::ReadFrom, e))?;
        }
        let mut chunk = vec![0u8; crate::ops::COPY_CHUNK];
        let mut total = 0u64;
        loop {
            let n = match src.read(&mut chunk) {
                Ok(0) => return Ok(total),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail(Op::ReadFrom, VfsError::Io(e))),
            };
            VfsFile::write(self, &chunk[..n])?;
            total += n as u64;
        }
    }

    fn close(&self) -> VfsResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.fail(Op::Close, VfsError::Closed));
        }
        state.closed = true;
        state.dir_iter = None;
        Ok(())
    }
}

impl io::Read for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(VfsFile::read(self, buf)?)
    }
}

impl io::Write for MemFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(VfsFile::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for MemFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(VfsFile::seek(self, pos)?)
    }
}

impl std::fmt::Debug for MemFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemFile")
            .field("path", &self.path)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
