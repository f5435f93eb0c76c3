//! Folder scanner.
//!
//! Walks every watched root depth-first with an explicit stack, hands each
//! regular file to the coordinator, then sweeps the index for recognized
//! files whose path has gone. A path must be missing on two consecutive
//! sweeps before its deletion is confirmed, so a file briefly absent during
//! an atomic replace is not reported.
//!
//! Errors never end a pass: an unreadable directory is skipped, a failing
//! file is counted and the walk continues.

use super::coordinator::Coordinator;
use super::types::{ObserveOutcome, Observation, ScanCancelToken, ScanStats};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Granularity of the idle wait between passes.
const IDLE_SLICE: Duration = Duration::from_millis(100);

/// Scanner configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub roots: Vec<PathBuf>,
    /// Pause between the end of one pass and the start of the next
    pub interval: Duration,
}

pub struct Scanner {
    coordinator: Arc<Coordinator>,
    config: ScanConfig,
    /// Paths missing on the previous sweep
    pending_deletions: HashSet<PathBuf>,
}

impl Scanner {
    pub fn new(coordinator: Arc<Coordinator>, config: ScanConfig) -> Self {
        Self {
            coordinator,
            config,
            pending_deletions: HashSet::new(),
        }
    }

    /// Loop passes until `token` is cancelled.
    pub fn run(&mut self, token: &ScanCancelToken) {
        info!(roots = self.config.roots.len(), interval_secs = self.config.interval.as_secs(), "Scanner started");
        while !token.is_cancelled() {
            let stats = self.run_pass(token);
            info!(
                dirs = stats.dirs_scanned,
                files = stats.files_seen,
                new = stats.files_new,
                changed = stats.files_changed,
                errors = stats.errors,
                deleted = stats.deletions_confirmed,
                duration_ms = stats.duration.as_millis() as u64,
                "Scan pass complete"
            );
            if !idle(self.config.interval, token) {
                break;
            }
        }
        info!("Scanner stopped");
    }

    /// One traversal of every root followed by the deletion sweep. A
    /// cancelled pass returns early and skips the sweep.
    pub fn run_pass(&mut self, token: &ScanCancelToken) -> ScanStats {
        let start = Instant::now();
        let mut stats = ScanStats::default();

        let mut stack: Vec<PathBuf> = self.config.roots.iter().rev().cloned().collect();
        while let Some(dir) = stack.pop() {
            if token.is_cancelled() {
                stats.duration = start.elapsed();
                return stats;
            }
            self.scan_directory(&dir, &mut stack, &mut stats);
        }

        self.sweep_deletions(&mut stats);
        stats.duration = start.elapsed();
        stats
    }

    fn scan_directory(&self, dir: &Path, stack: &mut Vec<PathBuf>, stats: &mut ScanStats) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "Cannot read directory");
                stats.dirs_skipped += 1;
                return;
            }
        };
        stats.dirs_scanned += 1;

        let mut subdirs = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(path = %dir.display(), error = %err, "Cannot read directory entry");
                    stats.errors += 1;
                    continue;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Cannot stat entry");
                    stats.errors += 1;
                    continue;
                }
            };

            if file_type.is_dir() {
                subdirs.push(path);
                continue;
            }
            // Symlinks to files are followed; symlinked directories are not,
            // so a link cycle cannot trap the walk.
            let metadata = match fs::metadata(&path) {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "Entry vanished or dangling link");
                    continue;
                }
            };
            self.process_file(Observation::from_metadata(path, &metadata), stats);
        }

        // Reverse so the stack pops subdirectories in listing order.
        stack.extend(subdirs.into_iter().rev());
    }

    fn process_file(&self, observation: Observation, stats: &mut ScanStats) {
        stats.files_seen += 1;
        match self.coordinator.observe(&observation) {
            Ok(ObserveOutcome::Unchanged) => stats.files_unchanged += 1,
            Ok(ObserveOutcome::Added { .. }) => stats.files_new += 1,
            Ok(ObserveOutcome::Replaced { .. }) => stats.files_changed += 1,
            Err(err) => {
                warn!(path = %observation.path.display(), error = %err, "Failed to process file");
                stats.errors += 1;
            }
        }
    }

    fn sweep_deletions(&mut self, stats: &mut ScanStats) {
        let tracked = match self.coordinator.index().tracked_instances() {
            Ok(tracked) => tracked,
            Err(err) => {
                warn!(error = %err, "Deletion sweep skipped");
                stats.errors += 1;
                return;
            }
        };

        let mut still_missing = HashSet::new();
        for record in tracked {
            if record.path.is_file() {
                continue;
            }
            if !self.pending_deletions.contains(&record.path) {
                debug!(path = %record.path.display(), "File missing, awaiting confirmation");
                stats.deletions_pending += 1;
                still_missing.insert(record.path);
                continue;
            }
            match self.coordinator.confirm_deleted(&record) {
                Ok(_) => stats.deletions_confirmed += 1,
                Err(err) => {
                    warn!(path = %record.path.display(), error = %err, "Failed to settle deleted file");
                    stats.errors += 1;
                    still_missing.insert(record.path);
                }
            }
        }
        self.pending_deletions = still_missing;
    }
}

/// Wait `interval` in short slices. Returns false if cancelled meanwhile.
fn idle(interval: Duration, token: &ScanCancelToken) -> bool {
    let slices = (interval.as_millis() / IDLE_SLICE.as_millis()).max(1);
    for _ in 0..slices {
        if token.is_cancelled() {
            return false;
        }
        std::thread::sleep(IDLE_SLICE);
    }
    !token.is_cancelled()
}
