//! Process-wide default filesystem.
//!
//! The free functions here dispatch to whichever backend was last passed to
//! [`set_default`]. Until one is set, the host filesystem is used.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::backends::OsFs;
use crate::error::VfsResult;
use crate::ops::{FileSystem, VfsFile};
use crate::types::{Entry, FileMode, OpenFlags};

static DEFAULT_FS: RwLock<Option<Arc<dyn FileSystem>>> = RwLock::new(None);

/// Install `fs` as the process-wide default, replacing any previous one.
pub fn set_default(fs: Arc<dyn FileSystem>) {
    let mut slot = DEFAULT_FS.write();
    if let Some(previous) = slot.as_ref() {
        tracing::info!(
            previous = previous.provider(),
            provider = fs.provider(),
            "Replacing default filesystem"
        );
    }
    *slot = Some(fs);
}

/// The current default filesystem.
pub fn default_fs() -> Arc<dyn FileSystem> {
    if let Some(fs) = DEFAULT_FS.read().as_ref() {
        return Arc::clone(fs);
    }
    let mut slot = DEFAULT_FS.write();
    Arc::clone(slot.get_or_insert_with(|| Arc::new(OsFs::new())))
}

pub fn create(path: &str) -> VfsResult<Box<dyn VfsFile>> {
    default_fs().create(path)
}

pub fn open(path: &str) -> VfsResult<Box<dyn VfsFile>> {
    default_fs().open(path)
}

pub fn open_file(path: &str, flags: OpenFlags, mode: FileMode) -> VfsResult<Box<dyn VfsFile>> {
    default_fs().open_file(path, flags, mode)
}

pub fn mkdir(path: &str, mode: FileMode) -> VfsResult<()> {
    default_fs().mkdir(path, mode)
}

pub fn mkdir_all(path: &str, mode: FileMode) -> VfsResult<()> {
    default_fs().mkdir_all(path, mode)
}

pub fn stat(path: &str) -> VfsResult<Entry> {
    default_fs().stat(path)
}

pub fn read_dir(path: &str) -> VfsResult<Vec<Entry>> {
    default_fs().read_dir(path)
}

pub fn read_file(path: &str) -> VfsResult<Vec<u8>> {
    default_fs().read_file(path)
}

pub fn write_file(path: &str, data: &[u8], mode: FileMode) -> VfsResult<()> {
    default_fs().write_file(path, data, mode)
}

pub fn sub(dir: &str) -> VfsResult<Box<dyn FileSystem>> {
    default_fs().sub(dir)
}

pub fn glob(pattern: &str) -> VfsResult<Vec<String>> {
    default_fs().glob(pattern)
}

pub fn remove(path: &str) -> VfsResult<()> {
    default_fs().remove(path)
}

pub fn remove_all(path: &str) -> VfsResult<()> {
    default_fs().remove_all(path)
}

pub fn rename(from: &str, to: &str) -> VfsResult<()> {
    default_fs().rename(from, to)
}
