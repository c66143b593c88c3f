//! Backend error types.

use std::io;
use thiserror::Error;

/// Error raised by a storage backend.
///
/// The driver passes these through opaquely as `FsError::Backend`.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Entry not present in the backing store.
    #[error("not found: {0}")]
    NotFound(String),

    /// Target name already taken in the backing store.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Expected a folder.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Folder still has children.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Operation the backend cannot express.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Backend is mounted read-only.
    #[error("backend is read-only")]
    ReadOnly,

    /// Path escapes the backend root (security violation).
    #[error("path escapes root: {0}")]
    PathEscapesRoot(String),

    /// Hash computation failed.
    #[error("hash failed: {0}")]
    Hash(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(what: impl Into<String>) -> Self {
        Self::NotADirectory(what.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(what: impl Into<String>) -> Self {
        Self::IsADirectory(what.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(what: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(what.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported(what.into())
    }

    /// Create a PathEscapesRoot error.
    pub fn path_escapes_root(what: impl Into<String>) -> Self {
        Self::PathEscapesRoot(what.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Convert BackendError to std::io::Error for compatibility.
impl From<BackendError> for io::Error {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            BackendError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            BackendError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            BackendError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            BackendError::DirectoryNotEmpty(msg) => {
                io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg)
            }
            BackendError::Unsupported(msg) => io::Error::new(io::ErrorKind::Unsupported, msg),
            BackendError::ReadOnly => {
                io::Error::new(io::ErrorKind::PermissionDenied, "backend is read-only")
            }
            BackendError::PathEscapesRoot(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            BackendError::Hash(msg) => io::Error::other(msg),
            BackendError::Io(e) => e,
            BackendError::Other(msg) => io::Error::other(msg),
        }
    }
}

/// Backend result type.
pub type BackendResult<T> = Result<T, BackendError>;
