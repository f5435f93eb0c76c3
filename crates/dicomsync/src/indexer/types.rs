//! Core types for the indexer.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// ============================================================================
// Scan path
// ============================================================================

/// One regular file seen during a scan pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub path: PathBuf,
    pub mtime_ms: i64,
    pub size: u64,
}

impl Observation {
    pub fn from_metadata(path: PathBuf, metadata: &std::fs::Metadata) -> Self {
        let mtime_ms = metadata.modified().map(system_time_to_millis).unwrap_or(0);
        Self {
            path,
            mtime_ms,
            size: metadata.len(),
        }
    }
}

/// Milliseconds since the Unix epoch; negative for earlier times.
pub fn system_time_to_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_millis() as i64,
        Err(before) => -(before.duration().as_millis() as i64),
    }
}

/// What the coordinator did with an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOutcome {
    Unchanged,
    /// First sighting; `recognized` tells whether an identity was derived
    Added { recognized: bool },
    /// Content changed since last sighting
    Replaced { recognized: bool },
}

// ============================================================================
// Push path
// ============================================================================

/// Kind of content the host hands to the storage callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Dicom,
    DicomAsJson,
    Other,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Dicom => "dicom",
            ContentKind::DicomAsJson => "dicom_as_json",
            ContentKind::Other => "other",
        }
    }
}

/// What the coordinator did with pushed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Stored in the content store; the index was not touched
    Cached,
    /// Identity already stored elsewhere; only a link was recorded
    Deduplicated,
    /// Written under the storage root and registered
    Materialized(PathBuf),
    /// Written, but a concurrent push registered the identity first; the
    /// write was removed and a link recorded
    RaceLost,
}

// ============================================================================
// Host-facing surface
// ============================================================================

/// Status code returned to the host from every storage callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStatus {
    Success,
    InternalError,
}

/// Host lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    Started,
    Stopped,
}

// ============================================================================
// Scanner
// ============================================================================

/// Cooperative stop signal for the scanner loop.
#[derive(Debug, Clone, Default)]
pub struct ScanCancelToken(Arc<AtomicBool>);

impl ScanCancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters for one scan pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub dirs_scanned: u64,
    pub dirs_skipped: u64,
    pub files_seen: u64,
    pub files_new: u64,
    pub files_changed: u64,
    pub files_unchanged: u64,
    pub errors: u64,
    pub deletions_pending: u64,
    pub deletions_confirmed: u64,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}
