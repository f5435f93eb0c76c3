//! Persistent index for dicomsync.
//!
//! Two relations:
//! - files: one row per path (mtime, size, identity)
//! - attachments: host attachment UUID -> identity, many-to-one
//!
//! The [`Index`] trait is what the indexer depends on; [`SqliteIndex`] is the
//! production implementation.

pub mod error;
pub mod sqlite;
pub mod types;

pub use error::{DbError, Result};
pub use sqlite::SqliteIndex;
pub use types::{AttachOutcome, AttachedFile, FileRecord, FileStatus, IndexStats, Registration};

use dicomsync_ids::{AttachmentId, InstanceId};
use std::path::Path;

/// Index operations used by the scan and push paths.
///
/// Implementations must be safe to call from the scanner thread and host
/// callback threads at the same time.
pub trait Index: Send + Sync {
    /// Compare an observation with the stored record for `path`.
    fn lookup_file(&self, path: &Path, mtime_ms: i64, size: u64) -> Result<FileStatus>;

    fn get_file(&self, path: &Path) -> Result<Option<FileRecord>>;

    /// Insert or replace the record for a recognized file.
    fn add_dicom_file(&self, path: &Path, mtime_ms: i64, size: u64, instance: &InstanceId) -> Result<()>;

    /// Insert or replace the record for an unrecognized file.
    fn add_opaque_file(&self, path: &Path, mtime_ms: i64, size: u64) -> Result<()>;

    /// Remove the record for `path`. Returns whether a row existed.
    fn remove_file(&self, path: &Path) -> Result<bool>;

    /// Every record carrying an identity, for the deletion sweep.
    fn tracked_instances(&self) -> Result<Vec<FileRecord>>;

    fn files_with_instance(&self, instance: &InstanceId) -> Result<Vec<FileRecord>>;

    /// Link `attachment` to `instance` if some file already carries it.
    fn attach(&self, attachment: &AttachmentId, instance: &InstanceId) -> Result<AttachOutcome>;

    /// Atomically: if a file at a different path carries the record's
    /// identity, record only the link and report `AlreadyPresent`; otherwise
    /// insert the record and the link and report `Registered`.
    fn register_instance(&self, attachment: &AttachmentId, record: &FileRecord) -> Result<Registration>;

    fn lookup_attachment(&self, attachment: &AttachmentId) -> Result<Option<AttachedFile>>;

    /// Drop one link. Returns the identity it pointed to.
    fn detach(&self, attachment: &AttachmentId) -> Result<Option<InstanceId>>;

    fn count_attachments(&self, instance: &InstanceId) -> Result<u64>;

    /// Drop every link to `instance`. Returns how many were dropped.
    fn detach_all(&self, instance: &InstanceId) -> Result<u64>;

    fn stats(&self) -> Result<IndexStats>;
}
