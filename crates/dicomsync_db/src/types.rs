//! Records held by the index.

use dicomsync_ids::InstanceId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What the index knows about one path on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    /// Modification time in milliseconds since the Unix epoch
    pub mtime_ms: i64,
    pub size: u64,
    pub is_dicom: bool,
    /// Canonical identity; `None` for opaque (unrecognized) files
    pub instance: Option<InstanceId>,
}

impl FileRecord {
    pub fn dicom(path: impl Into<PathBuf>, mtime_ms: i64, size: u64, instance: InstanceId) -> Self {
        Self {
            path: path.into(),
            mtime_ms,
            size,
            is_dicom: true,
            instance: Some(instance),
        }
    }

    pub fn opaque(path: impl Into<PathBuf>, mtime_ms: i64, size: u64) -> Self {
        Self {
            path: path.into(),
            mtime_ms,
            size,
            is_dicom: false,
            instance: None,
        }
    }
}

/// Result of comparing an observation against the stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// No record for this path
    New,
    /// Record exists with a different (mtime, size)
    Modified { previous: Option<InstanceId> },
    /// Record matches the observation
    Unchanged,
}

/// Result of linking an attachment to an identity that may already be stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// A file with this identity exists; the link was recorded
    Attached,
    /// No file carries this identity; nothing was recorded
    Unclaimed,
}

/// Result of the atomic compare-and-register step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The caller's record and link were committed
    Registered,
    /// Another path already carries the identity; only the link was committed
    AlreadyPresent,
}

/// A resolved attachment link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedFile {
    pub instance: InstanceId,
    /// Path of a file carrying the identity, if one is still recorded
    pub path: Option<PathBuf>,
}

/// Row counts, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub files: u64,
    pub dicom_files: u64,
    pub attachments: u64,
}
