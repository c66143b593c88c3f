//! Driver error types.

use std::fmt;
use std::io;

use tansu_types::{EntryId, NameError};
use thiserror::Error;

use crate::backend::BackendError;

/// Error raised by driver and entry operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// Parent linkage or path segment missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// A sibling already uses the name.
    #[error("name conflict: '{name}' already exists in folder {folder}")]
    NameConflict { folder: EntryId, name: String },

    /// Non-recursive delete of a folder with children.
    #[error("folder not empty: {0}")]
    NotEmpty(EntryId),

    /// Name rejected by the naming rules.
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameError),

    /// Move or link would create a cycle, or targets the root.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// Structural change collided with one already in progress.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Entry left the index (or the driver closed) mid-flight.
    #[error("entry gone: {0}")]
    Gone(EntryId),

    /// Read offset beyond the file size.
    #[error("offset {offset} out of range for size {size}")]
    OutOfRange { offset: u64, size: u64 },

    /// Recursive delete left some children behind.
    #[error("partial delete of {folder}: {} children failed", .failed.len())]
    PartialDelete {
        folder: EntryId,
        failed: Vec<(EntryId, FsError)>,
    },

    /// Opaque failure from the storage layer.
    #[error("backend failure: {0}")]
    Backend(#[from] BackendError),
}

/// Flat discriminant of [`FsError`], handy for matching in callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    NameConflict,
    NotEmpty,
    InvalidName,
    InvalidTarget,
    Conflict,
    Gone,
    OutOfRange,
    PartialDelete,
    BackendFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::NameConflict => "name_conflict",
            ErrorKind::NotEmpty => "not_empty",
            ErrorKind::InvalidName => "invalid_name",
            ErrorKind::InvalidTarget => "invalid_target",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Gone => "gone",
            ErrorKind::OutOfRange => "out_of_range",
            ErrorKind::PartialDelete => "partial_delete",
            ErrorKind::BackendFailure => "backend_failure",
        };
        f.write_str(s)
    }
}

impl FsError {
    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a NameConflict error.
    pub fn name_conflict(folder: &EntryId, name: impl Into<String>) -> Self {
        Self::NameConflict {
            folder: folder.clone(),
            name: name.into(),
        }
    }

    /// Create an InvalidTarget error.
    pub fn invalid_target(what: impl Into<String>) -> Self {
        Self::InvalidTarget(what.into())
    }

    /// Create a Conflict error.
    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    /// Create a Gone error.
    pub fn gone(id: &EntryId) -> Self {
        Self::Gone(id.clone())
    }

    /// The flat kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FsError::NotFound(_) => ErrorKind::NotFound,
            FsError::NameConflict { .. } => ErrorKind::NameConflict,
            FsError::NotEmpty(_) => ErrorKind::NotEmpty,
            FsError::InvalidName(_) => ErrorKind::InvalidName,
            FsError::InvalidTarget(_) => ErrorKind::InvalidTarget,
            FsError::Conflict(_) => ErrorKind::Conflict,
            FsError::Gone(_) => ErrorKind::Gone,
            FsError::OutOfRange { .. } => ErrorKind::OutOfRange,
            FsError::PartialDelete { .. } => ErrorKind::PartialDelete,
            FsError::Backend(_) => ErrorKind::BackendFailure,
        }
    }

    /// Ids of children a recursive delete could not remove.
    pub fn failed_children(&self) -> Vec<&EntryId> {
        match self {
            FsError::PartialDelete { failed, .. } => failed.iter().map(|(id, _)| id).collect(),
            _ => Vec::new(),
        }
    }
}

/// Convert FsError to std::io::Error for compatibility.
impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        match e {
            FsError::Backend(inner) => inner.into(),
            FsError::NotFound(_) | FsError::Gone(_) => {
                io::Error::new(io::ErrorKind::NotFound, e.to_string())
            }
            FsError::NameConflict { .. } => {
                io::Error::new(io::ErrorKind::AlreadyExists, e.to_string())
            }
            FsError::NotEmpty(_) => io::Error::new(io::ErrorKind::DirectoryNotEmpty, e.to_string()),
            FsError::InvalidName(_) | FsError::InvalidTarget(_) | FsError::OutOfRange { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
            }
            FsError::Conflict(_) => io::Error::new(io::ErrorKind::ResourceBusy, e.to_string()),
            FsError::PartialDelete { .. } => io::Error::other(e.to_string()),
        }
    }
}

/// Result type for driver operations.
pub type FsResult<T> = Result<T, FsError>;
