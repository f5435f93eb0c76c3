//! Error types for the storage layer.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Storage operation result type.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// File could not be opened, inspected or read.
    #[error("Cannot read {}: {source}", .path.display())]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Attachment identifier is not a hyphenated UUID.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A path component that must be a directory exists as something else.
    #[error("Path component exists and is not a directory: {}", .0.display())]
    DirectoryConflict(PathBuf),

    /// Directory creation or blob write failed.
    #[error("Cannot write {}: {source}", .path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Fewer (or more) bytes are available than the caller asked for.
    #[error("Corrupted content at {}: requested {requested} bytes, found {actual}", .path.display())]
    CorruptedContent {
        path: PathBuf,
        requested: u64,
        actual: u64,
    },

    /// The store root is unusable.
    #[error("Invalid storage root: {0}")]
    InvalidRoot(String),
}

impl StorageError {
    pub fn read_failure(path: &Path, source: io::Error) -> Self {
        Self::ReadFailure {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn write_failure(path: &Path, source: io::Error) -> Self {
        Self::WriteFailure {
            path: path.to_path_buf(),
            source,
        }
    }
}
