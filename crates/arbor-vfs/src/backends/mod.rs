//! Filesystem backends.
//!
//! Backends implement [`FileSystem`](crate::FileSystem) for different storage types.

pub mod memory;
mod os;

pub use memory::{DirIterator, MemFile, MemFs};
pub use os::{OsFile, OsFs};
