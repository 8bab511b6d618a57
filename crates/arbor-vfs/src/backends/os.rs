//! Host filesystem backend.
//!
//! Forwards every operation to `std::fs`. Without a base directory paths are
//! passed through unchanged; with one, paths must be valid relative paths and
//! are joined onto the base.

use parking_lot::Mutex;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

use crate::error::{Op, VfsError, VfsResult};
use crate::ops::{FileSystem, ReadableFs, VfsFile, WritableFs};
use crate::path::{self, PathRules};
use crate::types::{Attributes, DirPage, Entry, FileMode, OpenFlags, ReadAt};

/// Permissions used by `create`.
const CREATE_MODE: u32 = 0o666;

/// Host filesystem.
///
/// `OsFs::new()` resolves paths against the process working directory.
/// `OsFs::rooted(dir)` resolves them against `dir`.
#[derive(Debug, Clone, Default)]
pub struct OsFs {
    base: Option<PathBuf>,
}

impl OsFs {
    /// Pass paths through unchanged.
    pub fn new() -> Self {
        Self { base: None }
    }

    /// Resolve paths below `base`.
    ///
    /// The base is canonicalized at construction time when it exists.
    pub fn rooted(base: impl Into<PathBuf>) -> Self {
        let base: PathBuf = base.into();
        let base = dunce::canonicalize(&base).unwrap_or(base);
        Self { base: Some(base) }
    }

    /// Base directory, if any.
    pub fn base(&self) -> Option<&Path> {
        self.base.as_deref()
    }

    fn resolve(&self, path: &str) -> VfsResult<PathBuf> {
        let Some(base) = &self.base else {
            return Ok(PathBuf::from(path));
        };
        let path = path.trim();
        if path.is_empty() || path == "." {
            return Ok(base.clone());
        }
        if !path::valid_path(path) {
            return Err(VfsError::invalid_path(path));
        }
        Ok(base.join(path))
    }

    fn call<T>(&self, op: Op, path: &str, f: impl FnOnce() -> VfsResult<T>) -> VfsResult<T> {
        debug!(%op, path, "Host filesystem call");
        f().map_err(|e| e.with_op(op, path))
    }

    fn open_handle(&self, path: &str, flags: OpenFlags, mode: FileMode) -> VfsResult<OsFile> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Ok(OsFile::directory(path, full));
        }
        if flags.has(OpenFlags::CREATE) && mode.is_dir() {
            dir_builder(mode, true).create(&full)?;
            return Ok(OsFile::directory(path, full));
        }

        let mut options = fs::OpenOptions::new();
        options
            .read(flags.is_readable())
            .write(flags.is_writable())
            .append(flags.has(OpenFlags::APPEND))
            .create(flags.has(OpenFlags::CREATE))
            .truncate(flags.has(OpenFlags::TRUNC));
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode.perm());
        }
        let file = options.open(&full)?;
        Ok(OsFile::regular(path, full, flags, file))
    }
}

fn dir_builder(mode: FileMode, recursive: bool) -> fs::DirBuilder {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(recursive);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode.perm());
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder
}

/// Build an entry from host metadata.
///
/// Hosts may report a creation time later than the modification time (files
/// copied with preserved mtimes); the creation time is lowered to match.
fn entry_from_metadata(path: &str, meta: &fs::Metadata) -> VfsResult<Entry> {
    let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    let ctime = meta.created().map(|c| c.min(mtime)).unwrap_or(mtime);
    let mut builder = Attributes::builder()
        .ctime(ctime)
        .mtime(mtime)
        .mode(mode_of(meta));
    if !meta.is_dir() {
        builder = builder.size(meta.len());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        builder = builder.uid(meta.uid()).gid(meta.gid()).inode(meta.ino());
    }
    Entry::new(path, builder.build()?, &PathRules::permissive())
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata) -> FileMode {
    use std::os::unix::fs::PermissionsExt;
    FileMode::new(meta.permissions().mode())
}

#[cfg(not(unix))]
fn mode_of(meta: &fs::Metadata) -> FileMode {
    let perm = if meta.permissions().readonly() { 0o444 } else { 0o666 };
    if meta.is_dir() {
        FileMode::dir(perm | 0o111)
    } else {
        FileMode::file(perm)
    }
}

/// A handle on a host file or directory.
pub struct OsFile {
    path: String,
    full: PathBuf,
    flags: OpenFlags,
    state: Mutex<OsFileState>,
}

struct OsFileState {
    /// `None` for directories.
    file: Option<fs::File>,
    dir_iter: Option<fs::ReadDir>,
    closed: bool,
}

impl OsFile {
    fn regular(path: &str, full: PathBuf, flags: OpenFlags, file: fs::File) -> Self {
        Self {
            path: path.to_string(),
            full,
            flags,
            state: Mutex::new(OsFileState {
                file: Some(file),
                dir_iter: None,
                closed: false,
            }),
        }
    }

    fn directory(path: &str, full: PathBuf) -> Self {
        Self {
            path: path.to_string(),
            full,
            flags: OpenFlags::RDONLY,
            state: Mutex::new(OsFileState {
                file: None,
                dir_iter: None,
                closed: false,
            }),
        }
    }

    /// Host path this handle refers to.
    pub fn host_path(&self) -> &Path {
        &self.full
    }

    fn fail(&self, op: Op, err: impl Into<VfsError>) -> VfsError {
        err.into().with_op(op, self.path.as_str())
    }

    /// Run `f` on the open regular file, checking closed state and access.
    fn with_file<T>(
        &self,
        op: Op,
        need_write: bool,
        f: impl FnOnce(&mut fs::File) -> io::Result<T>,
    ) -> VfsResult<T> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.fail(op, VfsError::Closed));
        }
        let Some(file) = state.file.as_mut() else {
            return Err(self.fail(op, VfsError::is_a_directory(self.path.as_str())));
        };
        if need_write && !self.flags.is_writable() {
            return Err(self.fail(op, VfsError::ReadOnly));
        }
        if !need_write && !self.flags.is_readable() {
            return Err(self.fail(op, VfsError::WriteOnly));
        }
        f(file).map_err(|e| self.fail(op, e))
    }
}

impl VfsFile for OsFile {
    fn read(&self, buf: &mut [u8]) -> VfsResult<usize> {
        self.with_file(Op::Read, false, |file| file.read(buf))
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> VfsResult<ReadAt> {
        self.with_file(Op::ReadAt, false, |file| {
            let saved = file.stream_position()?;
            file.seek(SeekFrom::Start(offset))?;
            let mut len = 0;
            while len < buf.len() {
                match file.read(&mut buf[len..]) {
                    Ok(0) => break,
                    Ok(n) => len += n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(e),
                }
            }
            file.seek(SeekFrom::Start(saved))?;
            Ok(ReadAt {
                len,
                eof: len < buf.len(),
            })
        })
    }

    fn seek(&self, pos: SeekFrom) -> VfsResult<u64> {
        self.with_file(Op::Seek, false, |file| file.seek(pos))
    }

    fn read_dir(&self, n: isize) -> VfsResult<DirPage> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.fail(Op::ReadDir, VfsError::Closed));
        }
        if state.file.is_some() {
            return Err(self.fail(Op::ReadDir, VfsError::not_a_directory(self.path.as_str())));
        }
        if state.dir_iter.is_none() {
            let iter = fs::read_dir(&self.full).map_err(|e| self.fail(Op::ReadDir, e))?;
            state.dir_iter = Some(iter);
        }
        let Some(iter) = state.dir_iter.as_mut() else {
            return Ok(DirPage::default());
        };

        let limit = if n > 0 { n.unsigned_abs() } else { usize::MAX };
        let mut entries = Vec::new();
        while entries.len() < limit {
            let Some(item) = iter.next() else {
                break;
            };
            let item = item.map_err(|e| self.fail(Op::ReadDir, e))?;
            let meta = item.metadata().map_err(|e| self.fail(Op::ReadDir, e))?;
            let name = item.file_name().to_string_lossy().into_owned();
            let entry = entry_from_metadata(&path::join(&self.path, &name), &meta)
                .map_err(|e| self.fail(Op::ReadDir, e))?;
            entries.push(entry);
        }
        if n > 0 && entries.is_empty() {
            return Err(self.fail(Op::ReadDir, VfsError::EndOfDirectory));
        }
        let eof = entries.len() < limit;
        Ok(DirPage { entries, eof })
    }

    fn stat(&self) -> VfsResult<Entry> {
        if self.state.lock().closed {
            return Err(self.fail(Op::Stat, VfsError::Closed));
        }
        let meta = fs::metadata(&self.full).map_err(|e| self.fail(Op::Stat, e))?;
        entry_from_metadata(&self.path, &meta).map_err(|e| self.fail(Op::Stat, e))
    }

    fn write(&self, buf: &[u8]) -> VfsResult<usize> {
        self.with_file(Op::Write, true, |file| file.write_all(buf).map(|()| buf.len()))
    }

    fn close(&self) -> VfsResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.fail(Op::Close, VfsError::Closed));
        }
        state.closed = true;
        state.file = None;
        state.dir_iter = None;
        Ok(())
    }
}

impl std::fmt::Debug for OsFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsFile")
            .field("path", &self.path)
            .field("full", &self.full)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl ReadableFs for OsFs {
    fn open(&self, path: &str) -> VfsResult<Box<dyn VfsFile>> {
        self.call(Op::Open, path, || {
            let file = self.open_handle(path, OpenFlags::RDONLY, FileMode::default())?;
            Ok(Box::new(file) as Box<dyn VfsFile>)
        })
    }

    fn stat(&self, path: &str) -> VfsResult<Entry> {
        self.call(Op::Stat, path, || {
            let meta = fs::metadata(self.resolve(path)?)?;
            entry_from_metadata(path, &meta)
        })
    }

    fn read_dir(&self, path: &str) -> VfsResult<Vec<Entry>> {
        let dir = self.call(Op::ReadDir, path, || {
            self.open_handle(path, OpenFlags::RDONLY, FileMode::default())
        })?;
        // the handle tags its own errors
        let mut entries = dir.read_dir(-1)?.entries;
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(entries)
    }

    fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        self.call(Op::ReadFile, path, || Ok(fs::read(self.resolve(path)?)?))
    }

    fn glob(&self, pattern: &str) -> VfsResult<Vec<String>> {
        self.call(Op::Glob, pattern, || {
            let full_pattern = match &self.base {
                Some(base) => format!(
                    "{}{}{}",
                    glob::Pattern::escape(&base.to_string_lossy()),
                    std::path::MAIN_SEPARATOR,
                    pattern
                ),
                None => pattern.to_string(),
            };
            let paths = glob::glob(&full_pattern)
                .map_err(|e| VfsError::invalid_input(e.to_string()))?;
            let mut matches = Vec::new();
            for found in paths {
                let found = found.map_err(|e| VfsError::Io(e.into()))?;
                let relative = match &self.base {
                    Some(base) => found.strip_prefix(base).unwrap_or(&found),
                    None => &found,
                };
                matches.push(relative.to_string_lossy().into_owned());
            }
            Ok(matches)
        })
    }

    fn sub(&self, dir: &str) -> VfsResult<Box<dyn FileSystem>> {
        self.call(Op::Sub, dir, || {
            let full = self.resolve(dir)?;
            if !fs::metadata(&full)?.is_dir() {
                return Err(VfsError::not_a_directory(dir));
            }
            Ok(Box::new(OsFs::rooted(full)) as Box<dyn FileSystem>)
        })
    }
}

impl WritableFs for OsFs {
    fn create(&self, path: &str) -> VfsResult<Box<dyn VfsFile>> {
        self.call(Op::Create, path, || {
            let flags = OpenFlags::RDWR | OpenFlags::CREATE | OpenFlags::TRUNC;
            let file = self.open_handle(path, flags, FileMode::file(CREATE_MODE))?;
            Ok(Box::new(file) as Box<dyn VfsFile>)
        })
    }

    fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        mode: FileMode,
    ) -> VfsResult<Box<dyn VfsFile>> {
        self.call(Op::OpenFile, path, || {
            let file = self.open_handle(path, flags, mode)?;
            Ok(Box::new(file) as Box<dyn VfsFile>)
        })
    }

    fn mkdir(&self, path: &str, mode: FileMode) -> VfsResult<()> {
        self.call(Op::Mkdir, path, || {
            Ok(dir_builder(mode, false).create(self.resolve(path)?)?)
        })
    }

    fn mkdir_all(&self, path: &str, mode: FileMode) -> VfsResult<()> {
        self.call(Op::MkdirAll, path, || {
            Ok(dir_builder(mode, true).create(self.resolve(path)?)?)
        })
    }

    fn write_file(&self, path: &str, data: &[u8], mode: FileMode) -> VfsResult<()> {
        self.call(Op::WriteFile, path, || {
            let mut options = fs::OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(mode.perm());
            }
            #[cfg(not(unix))]
            let _ = mode;
            let mut file = options.open(self.resolve(path)?)?;
            file.write_all(data)?;
            Ok(())
        })
    }

    fn remove(&self, path: &str) -> VfsResult<()> {
        self.call(Op::Remove, path, || {
            let full = self.resolve(path)?;
            if fs::symlink_metadata(&full)?.is_dir() {
                fs::remove_dir(&full)?;
            } else {
                fs::remove_file(&full)?;
            }
            Ok(())
        })
    }

    fn remove_all(&self, path: &str) -> VfsResult<()> {
        self.call(Op::RemoveAll, path, || {
            let full = self.resolve(path)?;
            match fs::symlink_metadata(&full) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
                Ok(meta) if meta.is_dir() => Ok(fs::remove_dir_all(&full)?),
                Ok(_) => Ok(fs::remove_file(&full)?),
            }
        })
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        self.call(Op::Rename, from, || {
            Ok(fs::rename(self.resolve(from)?, self.resolve(to)?)?)
        })
    }
}

impl FileSystem for OsFs {
    fn path_separator(&self) -> &str {
        std::path::MAIN_SEPARATOR_STR
    }

    fn provider(&self) -> &str {
        std::env::consts::OS
    }

    fn root(&self) -> VfsResult<String> {
        Ok(match &self.base {
            Some(base) => base.to_string_lossy().into_owned(),
            None => std::path::MAIN_SEPARATOR_STR.to_string(),
        })
    }

    fn close(&self) -> VfsResult<()> {
        Ok(())
    }
}
