//! Internal error kinds for the file system engine.
//!
//! Top-level operations exposed through [`crate::fs::FileSystem`] collapse
//! these into a boolean/integer/sentinel ABI; this enum exists so internal
//! plumbing can propagate a specific reason with `?`.

/// Recoverable error kinds produced internally by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    /// A named entry does not exist.
    #[error("no such entry")]
    NotFound,
    /// A named entry already exists where a fresh one was requested.
    #[error("entry already exists")]
    Exists,
    /// A path component that must be a directory is not one.
    #[error("not a directory")]
    NotDirectory,
    /// A path component that must not be a directory is one.
    #[error("is a directory")]
    IsDirectory,
    /// The allocator could not satisfy a sector request, or the file would
    /// exceed the maximum representable length.
    #[error("no space left")]
    NoSpace,
    /// The inode is currently write-denied.
    #[error("file is read-only")]
    ReadOnly,
    /// The path was empty or otherwise malformed.
    #[error("malformed path")]
    BadPath,
    /// The file descriptor does not name an open file.
    #[error("bad file descriptor")]
    BadFd,
    /// The directory is non-empty and cannot be removed.
    #[error("directory not empty")]
    DirectoryNotEmpty,
    /// The target is in use (e.g. is a live working directory) and cannot
    /// be removed.
    #[error("resource busy")]
    Busy,
}

pub type FsResult<T> = Result<T, FsError>;
