//! Core VFS types.
//!
//! Metadata records are path-based values. They are cloned out of the tree
//! on every stat, so holding one never pins a lock.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::SystemTime;

use crate::error::{VfsError, VfsResult};
use crate::path::{self, PathRules};

/// File mode: unix-style type bits plus permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileMode(u32);

impl FileMode {
    /// Mask selecting the type bits.
    pub const TYPE_MASK: u32 = 0o170000;
    /// Directory type bit (`S_IFDIR`).
    pub const DIR: u32 = 0o040000;
    /// Regular file type bit (`S_IFREG`).
    pub const REGULAR: u32 = 0o100000;
    /// Mask selecting the permission bits.
    pub const PERM_MASK: u32 = 0o777;

    /// Wrap raw mode bits.
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Regular file mode with the given permissions.
    pub const fn file(perm: u32) -> Self {
        Self(Self::REGULAR | (perm & Self::PERM_MASK))
    }

    /// Directory mode with the given permissions.
    pub const fn dir(perm: u32) -> Self {
        Self(Self::DIR | (perm & Self::PERM_MASK))
    }

    /// Raw mode bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Permission bits only.
    pub const fn perm(self) -> u32 {
        self.0 & Self::PERM_MASK
    }

    /// Type bits only.
    pub const fn file_type(self) -> FileMode {
        Self(self.0 & Self::TYPE_MASK)
    }

    /// Returns true if the directory type bit is set.
    pub const fn is_dir(self) -> bool {
        self.0 & Self::TYPE_MASK == Self::DIR
    }

    /// Returns true if this is not a directory mode.
    pub const fn is_regular(self) -> bool {
        !self.is_dir()
    }

    /// Same permissions, directory type.
    pub const fn as_dir(self) -> Self {
        Self::dir(self.0)
    }

    /// Same permissions, regular file type.
    pub const fn as_file(self) -> Self {
        Self::file(self.0)
    }
}

impl From<u32> for FileMode {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_dir() { "d" } else { "-" })?;
        const RWX: [char; 3] = ['r', 'w', 'x'];
        for shift in (0..9).rev() {
            let c = if self.0 & (1 << shift) != 0 {
                RWX[2 - (shift % 3)]
            } else {
                '-'
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// Access mode encoded in the low bits of [`OpenFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Flags for opening files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpenFlags(u32);

impl OpenFlags {
    /// Open for reading only.
    pub const RDONLY: Self = Self(0o0);
    /// Open for writing only.
    pub const WRONLY: Self = Self(0o1);
    /// Open for reading and writing.
    pub const RDWR: Self = Self(0o2);
    /// Create if missing.
    pub const CREATE: Self = Self(0o100);
    /// Truncate to zero length on open.
    pub const TRUNC: Self = Self(0o1000);
    /// Writes start at the end of the file.
    pub const APPEND: Self = Self(0o2000);

    const ACCESS_MASK: u32 = 0o3;

    /// Raw flag bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every non-access bit of `other` is set.
    pub const fn has(self, other: OpenFlags) -> bool {
        let bits = other.0 & !Self::ACCESS_MASK;
        self.0 & bits == bits
    }

    /// The access mode.
    pub const fn access(self) -> Access {
        match self.0 & Self::ACCESS_MASK {
            0 => Access::ReadOnly,
            1 => Access::WriteOnly,
            _ => Access::ReadWrite,
        }
    }

    /// Returns true unless the handle is write-only.
    pub const fn is_readable(self) -> bool {
        !matches!(self.access(), Access::WriteOnly)
    }

    /// Returns true unless the handle is read-only.
    pub const fn is_writable(self) -> bool {
        !matches!(self.access(), Access::ReadOnly)
    }
}

impl BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Result of a positional read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadAt {
    /// Bytes copied into the buffer.
    pub len: usize,
    /// Set when fewer bytes than requested were available.
    pub eof: bool,
}

/// One batch of directory entries from a paged read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirPage {
    /// Entries in directory order.
    pub entries: Vec<Entry>,
    /// Set when fewer entries than requested were available, or when the
    /// read drained the directory.
    pub eof: bool,
}

impl DirPage {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }
}

impl IntoIterator for DirPage {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Attributes of one namespace node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attributes {
    /// Creation time.
    ctime: SystemTime,
    /// Last modification time, never earlier than `ctime`.
    mtime: SystemTime,
    /// Size in bytes (regular files only).
    size: u64,
    /// Type and permission bits.
    mode: FileMode,
    /// Numeric owner id.
    uid: u32,
    /// Numeric group id.
    gid: u32,
    /// Owner name.
    owner: String,
    /// Group name.
    group: String,
    /// Inode number.
    inode: u64,
    /// MIME type, if known.
    mime_type: String,
}

impl Attributes {
    /// Attributes with the given mode, created now.
    pub fn new(mode: FileMode) -> Self {
        let now = SystemTime::now();
        Self {
            ctime: now,
            mtime: now,
            size: 0,
            mode,
            uid: 0,
            gid: 0,
            owner: String::new(),
            group: String::new(),
            inode: 0,
            mime_type: String::new(),
        }
    }

    /// Start building attributes.
    pub fn builder() -> AttributesBuilder {
        AttributesBuilder::default()
    }

    pub fn ctime(&self) -> SystemTime {
        self.ctime
    }

    pub fn mtime(&self) -> SystemTime {
        self.mtime
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn inode(&self) -> u64 {
        self.inode
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Move the modification time forward.
    ///
    /// Setting the current value again is a no-op. Earlier values are
    /// rejected, never clamped.
    pub fn set_mtime(&mut self, mtime: SystemTime) -> VfsResult<()> {
        if mtime < self.ctime {
            return Err(VfsError::MtimeBeforeCtime);
        }
        if mtime < self.mtime {
            return Err(VfsError::MtimeRegression);
        }
        self.mtime = mtime;
        Ok(())
    }

    pub(crate) fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    pub(crate) fn with_inode(mut self, inode: u64) -> Self {
        self.inode = inode;
        self
    }
}

/// Builder for [`Attributes`].
#[derive(Debug, Clone, Default)]
pub struct AttributesBuilder {
    ctime: Option<SystemTime>,
    mtime: Option<SystemTime>,
    size: u64,
    mode: FileMode,
    uid: u32,
    gid: u32,
    owner: String,
    group: String,
    inode: u64,
    mime_type: String,
}

impl AttributesBuilder {
    pub fn ctime(mut self, ctime: SystemTime) -> Self {
        self.ctime = Some(ctime);
        self
    }

    pub fn mtime(mut self, mtime: SystemTime) -> Self {
        self.mtime = Some(mtime);
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn mode(mut self, mode: FileMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn uid(mut self, uid: u32) -> Self {
        self.uid = uid;
        self
    }

    pub fn gid(mut self, gid: u32) -> Self {
        self.gid = gid;
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn inode(mut self, inode: u64) -> Self {
        self.inode = inode;
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Build the attributes. `ctime` defaults to now and `mtime` to `ctime`.
    pub fn build(self) -> VfsResult<Attributes> {
        let ctime = self.ctime.unwrap_or_else(SystemTime::now);
        let mtime = self.mtime.unwrap_or(ctime);
        if mtime < ctime {
            return Err(VfsError::MtimeBeforeCtime);
        }
        Ok(Attributes {
            ctime,
            mtime,
            size: self.size,
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            owner: self.owner,
            group: self.group,
            inode: self.inode,
            mime_type: self.mime_type,
        })
    }
}

/// Metadata record for one namespace node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    path: String,
    #[serde(flatten)]
    attrs: Attributes,
}

/// Flattened view used for JSON rendering.
#[derive(Serialize)]
struct EntryView<'a> {
    name: &'a str,
    dir: &'a str,
    is_dir: bool,
    mode_string: String,
    #[serde(flatten)]
    entry: &'a Entry,
}

impl Entry {
    /// Create an entry, validating its path against `rules`.
    pub fn new(path: impl Into<String>, attrs: Attributes, rules: &PathRules) -> VfsResult<Self> {
        let path = path.into();
        let cleaned = rules.clean(&path)?;
        let path = if cleaned.is_empty() { "." } else { cleaned }.to_string();
        Ok(Self { path, attrs })
    }

    /// Entry named `"."`, the root of a tree.
    pub(crate) fn root(attrs: Attributes) -> Self {
        Self {
            path: ".".to_string(),
            attrs,
        }
    }

    /// Same entry with its path made relative to `base`. Paths outside
    /// `base` are kept as they are.
    pub(crate) fn rebased(mut self, base: &str) -> Self {
        if let Some(relative) = path::strip_base(base, &self.path) {
            self.path = relative.to_string();
        }
        self
    }

    /// Path of this entry, relative to the filesystem it came from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Final path segment.
    pub fn name(&self) -> &str {
        path::base(&self.path)
    }

    /// Parent path, `"."` at the top level.
    pub fn dir(&self) -> &str {
        path::dir(&self.path)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attrs
    }

    pub fn is_dir(&self) -> bool {
        self.attrs.mode.is_dir()
    }

    pub fn mode(&self) -> FileMode {
        self.attrs.mode
    }

    /// Type bits of the mode.
    pub fn file_type(&self) -> FileMode {
        self.attrs.mode.file_type()
    }

    pub fn mod_time(&self) -> SystemTime {
        self.attrs.mtime
    }

    pub fn size(&self) -> u64 {
        self.attrs.size
    }

    /// See [`Attributes::set_mtime`].
    pub fn set_mod_time(&mut self, mtime: SystemTime) -> VfsResult<()> {
        self.attrs.set_mtime(mtime)
    }

    /// Size is only tracked for regular files; directories ignore it.
    pub(crate) fn set_size(&mut self, size: u64) {
        if !self.is_dir() {
            self.attrs.set_size(size);
        }
    }

    /// Render as pretty JSON.
    pub fn to_json(&self) -> VfsResult<String> {
        serde_json::to_string_pretty(&self.view()).map_err(|e| VfsError::other(e.to_string()))
    }

    /// Render as a JSON object map.
    pub fn to_map(&self) -> VfsResult<serde_json::Map<String, serde_json::Value>> {
        match serde_json::to_value(self.view()) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(_) => Err(VfsError::other("entry did not serialize to an object")),
            Err(e) => Err(VfsError::other(e.to_string())),
        }
    }

    fn view(&self) -> EntryView<'_> {
        EntryView {
            name: self.name(),
            dir: self.dir(),
            is_dir: self.is_dir(),
            mode_string: self.attrs.mode.to_string(),
            entry: self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_file_mode() {
        let dir = FileMode::dir(0o755);
        assert!(dir.is_dir());
        assert_eq!(dir.perm(), 0o755);
        assert_eq!(dir.to_string(), "drwxr-xr-x");
        assert_eq!(dir.file_type().bits(), FileMode::DIR);

        let file = FileMode::new(0o664);
        assert!(file.is_regular());
        assert_eq!(file.to_string(), "-rw-rw-r--");
        assert_eq!(file.as_dir(), FileMode::dir(0o664));
    }

    #[test]
    fn test_open_flags() {
        assert_eq!(OpenFlags::RDONLY.access(), Access::ReadOnly);
        assert!(!OpenFlags::RDONLY.is_writable());

        let flags = OpenFlags::WRONLY | OpenFlags::APPEND;
        assert_eq!(flags.access(), Access::WriteOnly);
        assert!(flags.has(OpenFlags::APPEND));
        assert!(!flags.has(OpenFlags::CREATE));
        assert!(!flags.is_readable());

        let mut flags = OpenFlags::RDWR;
        flags |= OpenFlags::CREATE | OpenFlags::TRUNC;
        assert!(flags.is_readable() && flags.is_writable());
        assert!(flags.has(OpenFlags::CREATE | OpenFlags::TRUNC));
    }

    #[test]
    fn test_builder_defaults_mtime_to_ctime() {
        let ctime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let attrs = Attributes::builder()
            .ctime(ctime)
            .mode(FileMode::file(0o644))
            .owner("alice")
            .inode(7)
            .build()
            .unwrap();
        assert_eq!(attrs.mtime(), ctime);
        assert_eq!(attrs.owner(), "alice");
        assert_eq!(attrs.inode(), 7);
    }

    #[test]
    fn test_builder_rejects_mtime_before_ctime() {
        let ctime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let err = Attributes::builder()
            .ctime(ctime)
            .mtime(ctime - Duration::from_secs(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, VfsError::MtimeBeforeCtime));
    }

    #[test]
    fn test_set_mtime_ordering() {
        let ctime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let mut attrs = Attributes::builder()
            .ctime(ctime)
            .mtime(ctime + Duration::from_secs(10))
            .build()
            .unwrap();

        // same value again is fine
        attrs.set_mtime(ctime + Duration::from_secs(10)).unwrap();
        attrs.set_mtime(ctime + Duration::from_secs(20)).unwrap();

        let err = attrs.set_mtime(ctime + Duration::from_secs(15)).unwrap_err();
        assert!(matches!(err, VfsError::MtimeRegression));
        let err = attrs.set_mtime(ctime - Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, VfsError::MtimeBeforeCtime));
        assert_eq!(attrs.mtime(), ctime + Duration::from_secs(20));
    }

    #[test]
    fn test_entry_accessors() {
        let rules = PathRules::permissive();
        let entry = Entry::new("a/b/file.txt", Attributes::new(FileMode::file(0o644)), &rules).unwrap();
        assert_eq!(entry.name(), "file.txt");
        assert_eq!(entry.dir(), "a/b");
        assert!(!entry.is_dir());

        let top = Entry::new("top/", Attributes::new(FileMode::dir(0o755)), &rules).unwrap();
        assert_eq!(top.path(), "top");
        assert_eq!(top.dir(), ".");
    }

    #[test]
    fn test_entry_rejects_invalid_path_under_strict_rules() {
        let err = Entry::new("../escape", Attributes::new(FileMode::file(0o644)), &PathRules::strict())
            .unwrap_err();
        assert!(matches!(err, VfsError::InvalidPath(_)));
    }

    #[test]
    fn test_directory_ignores_size() {
        let rules = PathRules::permissive();
        let mut entry = Entry::new("d", Attributes::new(FileMode::dir(0o755)), &rules).unwrap();
        entry.set_size(42);
        assert_eq!(entry.size(), 0);
    }

    #[test]
    fn test_entry_to_map() {
        let rules = PathRules::permissive();
        let entry = Entry::new("docs/readme.md", Attributes::new(FileMode::file(0o644)), &rules).unwrap();
        let map = entry.to_map().unwrap();
        assert_eq!(map["name"], "readme.md");
        assert_eq!(map["dir"], "docs");
        assert_eq!(map["is_dir"], false);
        assert_eq!(map["mode_string"], "-rw-r--r--");
        assert_eq!(map["path"], "docs/readme.md");

        let json = entry.to_json().unwrap();
        assert!(json.contains("\"readme.md\""));
    }
}
