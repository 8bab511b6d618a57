//! # arbor-vfs
//!
//! Pluggable hierarchical filesystem with two backends behind one set of
//! traits:
//!
//! - [`MemFs`] - concurrent in-memory tree, nothing touches disk
//! - [`OsFs`] - thin passthrough to the host filesystem
//!
//! Key components:
//!
//! - [`ReadableFs`], [`WritableFs`], [`FileSystem`] - filesystem capabilities
//! - [`VfsFile`] - open handle with its own read and write cursors
//! - [`Entry`] - metadata record for one node
//! - [`PathRules`] - pluggable path validity
//! - [`default`] - process-wide default backend and free functions
//!
//! ## Design Decisions
//!
//! - **No global lock**: handles, file contents and directories each carry
//!   their own lock, taken in that order.
//! - **Append-only namespace**: the in-memory tree supports create and
//!   mkdir; remove and rename fail with [`ErrorKind::NotImplemented`].
//! - **Monotonic timestamps**: a modification time that would move
//!   backwards is an error, not a clamp.

pub mod backends;
pub mod config;
pub mod default;
mod error;
mod ops;
pub mod path;
pub mod record;
mod types;

pub use backends::{DirIterator, MemFile, MemFs, OsFile, OsFs};
pub use config::{PathPolicy, VfsConfig};
pub use error::{ErrorKind, Op, VfsError, VfsResult};
pub use ops::{FileSystem, ReadableFs, VfsFile, WritableFs};
pub use path::PathRules;
pub use record::{FileRecord, file_record};
pub use types::{
    Access, Attributes, AttributesBuilder, DirPage, Entry, FileMode, OpenFlags, ReadAt,
};
