//! Error types for the indexer.

use super::dicom::DicomError;
use super::host::HostError;
use dicomsync_db::DbError;
use dicomsync_ids::IdParseError;
use dicomsync_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for indexer operations.
pub type Result<T> = std::result::Result<T, IndexerError>;

/// Errors that can occur in the indexer.
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Index error: {0}")]
    Index(#[from] DbError),

    #[error("Identity error: {0}")]
    Identity(#[from] DicomError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] IdParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl IndexerError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}
