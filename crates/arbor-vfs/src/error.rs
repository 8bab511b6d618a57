//! VFS error types.

use std::io;
use thiserror::Error;

/// Filesystem operation names, used to tag errors with the call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub enum Op {
    Open,
    OpenFile,
    Create,
    Mkdir,
    MkdirAll,
    Stat,
    ReadDir,
    ReadFile,
    WriteFile,
    Sub,
    Glob,
    Remove,
    RemoveAll,
    Rename,
    Close,
    Read,
    ReadAt,
    Write,
    ReadFrom,
    Seek,
}

/// Classification of a [`VfsError`] that looks through [`VfsError::Op`] wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    NotADirectory,
    NotAFile,
    IsADirectory,
    InvalidEntryType,
    InvalidPath,
    Closed,
    ReadOnly,
    WriteOnly,
    TooLarge,
    TimeOrdering,
    NotImplemented,
    EndOfDirectory,
    InvalidInput,
    Io,
    Other,
}

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// File or directory not found.
    #[error("does not exist: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a regular file.
    #[error("not a file: {0}")]
    NotAFile(String),

    /// Operation needs a regular file but got a directory.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// A namespace record has a kind the operation cannot handle.
    #[error("entry type is invalid: {0}")]
    InvalidEntryType(String),

    /// Path rejected by the active path rules.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Handle or filesystem was already closed.
    #[error("file already closed")]
    Closed,

    /// Write attempted through a read-only handle.
    #[error("file is read-only")]
    ReadOnly,

    /// Read attempted through a write-only handle.
    #[error("file is write-only")]
    WriteOnly,

    /// Content would exceed the maximum content length.
    #[error("too large")]
    TooLarge,

    /// New modification time is earlier than the current one.
    #[error("modification time is invalid")]
    MtimeRegression,

    /// Modification time is earlier than the creation time.
    #[error("modification time occurs before creation time")]
    MtimeBeforeCtime,

    /// Operation is not supported by this backend.
    #[error("not implemented")]
    NotImplemented,

    /// Directory iteration has no entries left.
    #[error("no more directory entries")]
    EndOfDirectory,

    /// Invalid argument (negative seek, bad pattern, bad config).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error raised by a named operation on a path.
    #[error("{op} {path}: {source}")]
    Op {
        op: Op,
        path: String,
        #[source]
        source: Box<VfsError>,
    },

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create a NotAFile error.
    pub fn not_a_file(path: impl Into<String>) -> Self {
        Self::NotAFile(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create an InvalidInput error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Wrap this error with the operation and path that produced it.
    pub fn with_op(self, op: Op, path: impl Into<String>) -> Self {
        Self::Op {
            op,
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any operation wrappers.
    pub fn root_cause(&self) -> &VfsError {
        let mut current = self;
        while let VfsError::Op { source, .. } = current {
            current = source;
        }
        current
    }

    /// The operation this error was tagged with, if any.
    pub fn op(&self) -> Option<Op> {
        match self {
            VfsError::Op { op, .. } => Some(*op),
            _ => None,
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self.root_cause() {
            VfsError::NotFound(_) => ErrorKind::NotFound,
            VfsError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            VfsError::NotADirectory(_) => ErrorKind::NotADirectory,
            VfsError::NotAFile(_) => ErrorKind::NotAFile,
            VfsError::IsADirectory(_) => ErrorKind::IsADirectory,
            VfsError::InvalidEntryType(_) => ErrorKind::InvalidEntryType,
            VfsError::InvalidPath(_) => ErrorKind::InvalidPath,
            VfsError::Closed => ErrorKind::Closed,
            VfsError::ReadOnly => ErrorKind::ReadOnly,
            VfsError::WriteOnly => ErrorKind::WriteOnly,
            VfsError::TooLarge => ErrorKind::TooLarge,
            VfsError::MtimeRegression | VfsError::MtimeBeforeCtime => ErrorKind::TimeOrdering,
            VfsError::NotImplemented => ErrorKind::NotImplemented,
            VfsError::EndOfDirectory => ErrorKind::EndOfDirectory,
            VfsError::InvalidInput(_) => ErrorKind::InvalidInput,
            VfsError::Io(e) => match e.kind() {
                io::ErrorKind::NotFound => ErrorKind::NotFound,
                io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
                io::ErrorKind::NotADirectory => ErrorKind::NotADirectory,
                io::ErrorKind::IsADirectory => ErrorKind::IsADirectory,
                io::ErrorKind::InvalidInput => ErrorKind::InvalidInput,
                _ => ErrorKind::Io,
            },
            VfsError::Op { .. } | VfsError::Other(_) => ErrorKind::Other,
        }
    }

    /// Shorthand for `self.kind() == kind`.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }
}

/// Convert VfsError to std::io::Error for compatibility with `std::io` traits.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        let kind = match e.kind() {
            ErrorKind::NotFound => io::ErrorKind::NotFound,
            ErrorKind::AlreadyExists => io::ErrorKind::AlreadyExists,
            ErrorKind::NotADirectory => io::ErrorKind::NotADirectory,
            ErrorKind::IsADirectory => io::ErrorKind::IsADirectory,
            ErrorKind::InvalidPath | ErrorKind::InvalidInput => io::ErrorKind::InvalidInput,
            ErrorKind::ReadOnly | ErrorKind::WriteOnly => io::ErrorKind::PermissionDenied,
            ErrorKind::TooLarge => io::ErrorKind::OutOfMemory,
            ErrorKind::NotImplemented => io::ErrorKind::Unsupported,
            ErrorKind::EndOfDirectory => io::ErrorKind::UnexpectedEof,
            _ => io::ErrorKind::Other,
        };
        match e {
            VfsError::Io(inner) => inner,
            other => io::Error::new(kind, other),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_names() {
        assert_eq!(Op::MkdirAll.to_string(), "mkdirAll");
        assert_eq!(Op::ReadFile.to_string(), "readFile");
        let name: &'static str = Op::RemoveAll.into();
        assert_eq!(name, "removeAll");
    }

    #[test]
    fn test_kind_sees_through_wrapping() {
        let err = VfsError::not_found("a/b").with_op(Op::Stat, "a/b");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.op(), Some(Op::Stat));
        assert_eq!(err.to_string(), "stat a/b: does not exist: a/b");

        let nested = VfsError::Closed
            .with_op(Op::Close, "x")
            .with_op(Op::ReadFile, "x");
        assert!(nested.is(ErrorKind::Closed));
        assert!(matches!(nested.root_cause(), VfsError::Closed));
    }

    #[test]
    fn test_io_kind_mapping() {
        let err = VfsError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = VfsError::from(io::Error::other("boom"));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_into_io_error() {
        let err: io::Error = VfsError::NotImplemented.with_op(Op::Remove, "f").into();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);

        let err: io::Error = VfsError::ReadOnly.into();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }
}
