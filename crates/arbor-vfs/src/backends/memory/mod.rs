//! In-memory filesystem.
//!
//! The tree lives entirely in process memory. Directories are [`DirNode`]s
//! holding an ordered map of children; regular files are [`ContentCell`]s
//! shared by every handle opened on them. There is no global lock: each
//! handle, cell and directory carries its own.
//!
//! Lock order, outermost first: handle, cell, directory.

mod cell;
mod dir;
mod file;
mod iter;

pub use file::MemFile;
pub use iter::DirIterator;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

use self::cell::ContentCell;
use self::dir::{DirNode, DirTable, Node};
use crate::config::VfsConfig;
use crate::error::{ErrorKind, Op, VfsError, VfsResult};
use crate::ops::{FileSystem, ReadableFs, VfsFile, WritableFs};
use crate::path::{self, PathRules};
use crate::types::{Attributes, Entry, FileMode, OpenFlags};

/// State shared by every view and handle of one tree.
pub(crate) struct Shared {
    pub(crate) config: VfsConfig,
    pub(crate) rules: PathRules,
    pub(crate) dirs: DirTable,
    next_inode: AtomicU64,
    closed: AtomicBool,
}

impl Shared {
    pub(crate) fn new(config: VfsConfig, rules: PathRules) -> Self {
        Self {
            config,
            rules,
            dirs: DirTable::default(),
            next_inode: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn next_inode(&self) -> u64 {
        self.next_inode.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn new_root(&self) -> Arc<DirNode> {
        let attrs =
            Attributes::new(FileMode::dir(self.config.dir_mode)).with_inode(self.next_inode());
        DirNode::new(self, Entry::root(attrs))
    }
}

/// In-memory filesystem.
///
/// Cloning is cheap and yields another handle on the same tree. [`MemFs::sub`]
/// returns a view rooted at a subdirectory that shares the tree.
#[derive(Clone)]
pub struct MemFs {
    root: Arc<DirNode>,
    shared: Arc<Shared>,
    is_root_view: bool,
}

impl MemFs {
    /// Empty filesystem with the default configuration.
    pub fn new() -> Self {
        Self::build(VfsConfig::default(), PathRules::permissive())
    }

    /// Empty filesystem with a validated configuration.
    pub fn with_config(config: VfsConfig) -> VfsResult<Self> {
        config.validate()?;
        let rules = PathRules::from(config.path_policy);
        Ok(Self::build(config, rules))
    }

    /// Empty filesystem with a custom path predicate.
    pub fn with_rules(config: VfsConfig, rules: PathRules) -> VfsResult<Self> {
        config.validate()?;
        Ok(Self::build(config, rules))
    }

    fn build(config: VfsConfig, rules: PathRules) -> Self {
        let shared = Shared::new(config, rules);
        let root = shared.new_root();
        Self {
            root,
            shared: Arc::new(shared),
            is_root_view: true,
        }
    }

    pub fn config(&self) -> &VfsConfig {
        &self.shared.config
    }

    pub fn path_rules(&self) -> &PathRules {
        &self.shared.rules
    }

    // ========================================================================
    // Opening
    // ========================================================================

    /// Open a file or directory read-only.
    pub fn open(&self, path: &str) -> VfsResult<MemFile> {
        debug!(path, "Opening file");
        self.open_node(path, OpenFlags::RDONLY, FileMode::default())
            .map_err(|e| e.with_op(Op::Open, path))
    }

    /// Open with explicit flags. `mode` applies to newly created nodes; a
    /// directory mode with [`OpenFlags::CREATE`] creates a directory.
    pub fn open_file(&self, path: &str, flags: OpenFlags, mode: FileMode) -> VfsResult<MemFile> {
        debug!(path, flags = flags.bits(), mode = %mode, "Opening file with flags");
        self.open_node(path, flags, mode)
            .map_err(|e| e.with_op(Op::OpenFile, path))
    }

    /// Create or truncate a file for reading and writing.
    pub fn create(&self, path: &str) -> VfsResult<MemFile> {
        debug!(path, "Creating file");
        let flags = OpenFlags::RDWR | OpenFlags::CREATE | OpenFlags::TRUNC;
        self.open_node(path, flags, FileMode::file(self.shared.config.file_mode))
            .map_err(|e| e.with_op(Op::Create, path))
    }

    fn open_node(&self, path: &str, flags: OpenFlags, mode: FileMode) -> VfsResult<MemFile> {
        let cleaned = self.shared.rules.clean(path)?;
        match dir::resolve(&self.shared, &self.root, cleaned) {
            Ok(Node::File(cell)) => Ok(self.handle(cell, flags, cleaned)),
            Ok(Node::Dir(dir)) => Ok(self.handle(dir.dot()?, OpenFlags::RDONLY, cleaned)),
            Err(e) if e.kind() == ErrorKind::NotFound && flags.has(OpenFlags::CREATE) => {
                self.create_node(cleaned, flags, mode)
            }
            Err(e) => Err(e),
        }
    }

    fn create_node(&self, path: &str, flags: OpenFlags, mode: FileMode) -> VfsResult<MemFile> {
        if mode.is_dir() {
            let dir = dir::mkdir_all(&self.shared, &self.root, path, mode)?;
            return Ok(self.handle(dir.dot()?, OpenFlags::RDONLY, path));
        }
        let segments = self.shared.rules.split(path)?;
        let Some((name, parents)) = segments.split_last() else {
            return Err(VfsError::invalid_path(path));
        };
        let parent = if parents.is_empty() {
            Arc::clone(&self.root)
        } else {
            dir::mkdir_all(&self.shared, &self.root, &parents.join("/"), mode)?
        };
        let cell = self.open_or_create(&parent, name, mode)?;
        Ok(self.handle(cell, flags, path))
    }

    /// The cell for `name` in `parent`, created if missing. A directory
    /// yields its `.` cell.
    fn open_or_create(
        &self,
        parent: &DirNode,
        name: &str,
        mode: FileMode,
    ) -> VfsResult<Arc<ContentCell>> {
        let node = parent.get_or_insert_with(name, || {
            let attrs = Attributes::new(mode.as_file()).with_inode(self.shared.next_inode());
            let entry = Entry::new(path::join(&parent.path(), name), attrs, &self.shared.rules)?;
            let cell = ContentCell::new(parent.id(), entry, self.shared.config.initial_capacity);
            Ok(Node::File(Arc::new(cell)))
        })?;
        match node {
            Node::File(cell) => Ok(cell),
            Node::Dir(dir) => dir.dot(),
        }
    }

    fn handle(&self, cell: Arc<ContentCell>, flags: OpenFlags, path: &str) -> MemFile {
        MemFile::new(Arc::clone(&self.shared), cell, flags, path, self.root.path())
    }

    // ========================================================================
    // Directories
    // ========================================================================

    /// Create one directory. The parent must exist.
    pub fn mkdir(&self, path: &str, mode: FileMode) -> VfsResult<()> {
        debug!(path, mode = %mode, "Creating directory");
        dir::mkdir(&self.shared, &self.root, path, mode)
            .map(|_| ())
            .map_err(|e| e.with_op(Op::Mkdir, path))
    }

    /// Create a directory and every missing parent.
    pub fn mkdir_all(&self, path: &str, mode: FileMode) -> VfsResult<()> {
        debug!(path, mode = %mode, "Creating directory tree");
        dir::mkdir_all(&self.shared, &self.root, path, mode)
            .map(|_| ())
            .map_err(|e| e.with_op(Op::MkdirAll, path))
    }

    /// Entries of a directory, sorted by name.
    pub fn read_dir(&self, path: &str) -> VfsResult<Vec<Entry>> {
        debug!(path, "Reading directory");
        self.dir_iter(path)
            .and_then(|mut iter| iter.next_n(-1))
            .map(|page| page.entries)
            .map_err(|e| e.with_op(Op::ReadDir, path))
    }

    /// Iterator over a directory's children as they are right now.
    pub fn dir_iter(&self, path: &str) -> VfsResult<DirIterator> {
        let dir = dir::resolve_dir(&self.shared, &self.root, path)?;
        Ok(DirIterator::new(dir, self.root.path()))
    }

    /// View rooted at `dir` sharing this tree.
    pub fn sub(&self, dir: &str) -> VfsResult<MemFs> {
        debug!(path = dir, "Creating sub filesystem");
        let node = dir::resolve_dir(&self.shared, &self.root, dir)
            .map_err(|e| e.with_op(Op::Sub, dir))?;
        Ok(MemFs {
            root: node,
            shared: Arc::clone(&self.shared),
            is_root_view: false,
        })
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Metadata for `path`.
    pub fn stat(&self, path: &str) -> VfsResult<Entry> {
        debug!(path, "Stat");
        dir::resolve(&self.shared, &self.root, path)
            .map(|node| node.entry().rebased(&self.root.path()))
            .map_err(|e| e.with_op(Op::Stat, path))
    }

    /// Visit this view's root and everything below it, depth-first in name
    /// order. Paths are relative to the view, the root being `"."`.
    pub fn walk(&self, mut visit: impl FnMut(&str, &Entry) -> VfsResult<()>) -> VfsResult<()> {
        let base = self.root.path();
        visit(".", &self.root.entry().rebased(&base))?;
        walk_dir(&self.root, &base, ".", &mut visit)
    }

    /// Paths matching a shell pattern, in walk order.
    ///
    /// `*` and `?` do not cross a separator.
    pub fn glob(&self, pattern: &str) -> VfsResult<Vec<String>> {
        debug!(pattern, "Glob");
        let matcher = glob::Pattern::new(pattern).map_err(|e| {
            VfsError::invalid_input(e.to_string()).with_op(Op::Glob, pattern)
        })?;
        let options = glob::MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        let mut matches = Vec::new();
        self.walk(|path, _| {
            if matcher.matches_with(path, options) {
                matches.push(path.to_string());
            }
            Ok(())
        })?;
        Ok(matches)
    }

    /// One `path: size, mode` line per node, in walk order.
    pub fn listing(&self) -> VfsResult<Vec<String>> {
        let mut lines = Vec::new();
        self.walk(|path, entry| {
            lines.push(format!("{path}: {}, {}", entry.size(), entry.mode()));
            Ok(())
        })?;
        Ok(lines)
    }

    // ========================================================================
    // Whole-file helpers
    // ========================================================================

    /// Whole content of a regular file.
    pub fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        debug!(path, "Reading file");
        let file = self
            .open_node(path, OpenFlags::RDONLY, FileMode::default())
            .map_err(|e| e.with_op(Op::ReadFile, path))?;
        let mut data = Vec::new();
        let result = file.read_to_end(&mut data);
        if let Err(e) = file.close() {
            tracing::error!(path, error = %e, "Failed to close file after read");
        }
        result.map_err(|e| e.with_op(Op::ReadFile, path))?;
        Ok(data)
    }

    /// Replace a file's content, creating it and its parents if needed.
    pub fn write_file(&self, path: &str, data: &[u8], mode: FileMode) -> VfsResult<()> {
        debug!(path, content_length = data.len(), mode = %mode, "Writing file");
        let flags = OpenFlags::RDWR | OpenFlags::CREATE | OpenFlags::TRUNC;
        let file = self
            .open_node(path, flags, mode)
            .map_err(|e| e.with_op(Op::WriteFile, path))?;
        let result = file.write(data);
        if let Err(e) = file.close() {
            tracing::error!(path, error = %e, "Failed to close file after write");
        }
        result.map_err(|e| e.with_op(Op::WriteFile, path))?;
        Ok(())
    }

    // ========================================================================
    // Unsupported
    // ========================================================================

    /// Always fails: removal is not supported.
    pub fn remove(&self, path: &str) -> VfsResult<()> {
        debug!(path, "Remove");
        Err(VfsError::NotImplemented.with_op(Op::Remove, path))
    }

    /// Always fails: removal is not supported.
    pub fn remove_all(&self, path: &str) -> VfsResult<()> {
        debug!(path, "Remove all");
        Err(VfsError::NotImplemented.with_op(Op::RemoveAll, path))
    }

    /// Always fails: renaming is not supported.
    pub fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        debug!(from, to, "Rename");
        Err(VfsError::NotImplemented.with_op(Op::Rename, from))
    }

    // ========================================================================
    // Filesystem info
    // ========================================================================

    pub fn path_separator(&self) -> &'static str {
        "/"
    }

    pub fn provider(&self) -> &'static str {
        "memfs"
    }

    /// `"/"` for the whole tree, `"/<dir>"` for a view made by [`MemFs::sub`].
    pub fn root(&self) -> VfsResult<String> {
        Ok(path::join("/", &self.root.path()))
    }

    /// Close the tree. Only the first close of a root view succeeds;
    /// closing a sub view does nothing.
    pub fn close(&self) -> VfsResult<()> {
        if !self.is_root_view {
            return Ok(());
        }
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Err(VfsError::Closed.with_op(Op::Close, "/"));
        }
        Ok(())
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemFs")
            .field("root", &self.root.path())
            .field("is_root_view", &self.is_root_view)
            .finish_non_exhaustive()
    }
}

fn walk_dir(
    dir: &DirNode,
    base: &str,
    prefix: &str,
    visit: &mut dyn FnMut(&str, &Entry) -> VfsResult<()>,
) -> VfsResult<()> {
    for name in dir.child_names() {
        let Some(child) = dir.child(&name) else {
            continue;
        };
        let child_path = path::join(prefix, &name);
        visit(&child_path, &child.entry().rebased(base))?;
        if let Node::Dir(sub) = child {
            walk_dir(&sub, base, &child_path, visit)?;
        }
    }
    Ok(())
}

impl ReadableFs for MemFs {
    fn open(&self, path: &str) -> VfsResult<Box<dyn VfsFile>> {
        Ok(Box::new(MemFs::open(self, path)?))
    }

    fn stat(&self, path: &str) -> VfsResult<Entry> {
        MemFs::stat(self, path)
    }

    fn read_dir(&self, path: &str) -> VfsResult<Vec<Entry>> {
        MemFs::read_dir(self, path)
    }

    fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        MemFs::read_file(self, path)
    }

    fn glob(&self, pattern: &str) -> VfsResult<Vec<String>> {
        MemFs::glob(self, pattern)
    }

    fn sub(&self, dir: &str) -> VfsResult<Box<dyn FileSystem>> {
        Ok(Box::new(MemFs::sub(self, dir)?))
    }
}

impl WritableFs for MemFs {
    fn create(&self, path: &str) -> VfsResult<Box<dyn VfsFile>> {
        Ok(Box::new(MemFs::create(self, path)?))
    }

    fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        mode: FileMode,
    ) -> VfsResult<Box<dyn VfsFile>> {
        Ok(Box::new(MemFs::open_file(self, path, flags, mode)?))
    }

    fn mkdir(&self, path: &str, mode: FileMode) -> VfsResult<()> {
        MemFs::mkdir(self, path, mode)
    }

    fn mkdir_all(&self, path: &str, mode: FileMode) -> VfsResult<()> {
        MemFs::mkdir_all(self, path, mode)
    }

    fn write_file(&self, path: &str, data: &[u8], mode: FileMode) -> VfsResult<()> {
        MemFs::write_file(self, path, data, mode)
    }

    fn remove(&self, path: &str) -> VfsResult<()> {
        MemFs::remove(self, path)
    }

    fn remove_all(&self, path: &str) -> VfsResult<()> {
        MemFs::remove_all(self, path)
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        MemFs::rename(self, from, to)
    }
}

impl FileSystem for MemFs {
    fn path_separator(&self) -> &str {
        MemFs::path_separator(self)
    }

    fn provider(&self) -> &str {
        MemFs::provider(self)
    }

    fn root(&self) -> VfsResult<String> {
        MemFs::root(self)
    }

    fn close(&self) -> VfsResult<()> {
        MemFs::close(self)
    }
}
