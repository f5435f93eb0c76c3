//! Ingestion coordinator.
//!
//! Owns the decisions for both entry points:
//! - scan path: classify an observation, derive identity, update the index,
//!   forward recognized content to the host
//! - push path: deduplicate against the index, otherwise materialize under
//!   the storage root and settle any race through `register_instance`
//!
//! Host and notifier failures are logged and never undo index changes.

use super::error::Result;
use super::identity::ResolvedIdentity;
use super::types::{ContentKind, ObserveOutcome, Observation, PushOutcome};
use super::IndexerContext;
use dicomsync_db::{AttachOutcome, FileRecord, FileStatus, Index, Registration};
use dicomsync_ids::{AttachmentId, InstanceId};
use dicomsync_storage::{ContentStore, MappedFileReader};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const MATERIALIZED_EXTENSION: &str = "dcm";

pub struct Coordinator {
    ctx: IndexerContext,
}

impl Coordinator {
    pub fn new(ctx: IndexerContext) -> Self {
        Self { ctx }
    }

    pub fn index(&self) -> &Arc<dyn Index> {
        &self.ctx.index
    }

    pub fn storage_root(&self) -> &Path {
        &self.ctx.storage_root
    }

    // ========================================================================
    // Scan path
    // ========================================================================

    /// Process one file seen by the scanner.
    pub fn observe(&self, observation: &Observation) -> Result<ObserveOutcome> {
        let index = &self.ctx.index;
        let path = observation.path.as_path();

        let previous = match index.lookup_file(path, observation.mtime_ms, observation.size)? {
            FileStatus::Unchanged => return Ok(ObserveOutcome::Unchanged),
            FileStatus::New => None,
            // The record is replaced in place below, so the identity never
            // has zero live records in between.
            FileStatus::Modified { previous } => Some(previous),
        };

        let reader = MappedFileReader::open(path)?;
        let content = reader.data();

        let recognized = match self.ctx.resolver.resolve(content) {
            Ok(identity) => {
                index.add_dicom_file(path, observation.mtime_ms, observation.size, &identity.instance)?;
                if let Some(Some(old)) = &previous {
                    self.retire_replaced(old, &identity.instance);
                }
                if let Err(err) = self.ctx.host.upload_instance(content) {
                    warn!(path = %path.display(), error = %err, "Upload to host failed");
                }
                true
            }
            Err(reason) => {
                debug!(path = %path.display(), reason = %reason, "Indexing as opaque file");
                index.add_opaque_file(path, observation.mtime_ms, observation.size)?;
                if let Some(Some(old)) = &previous {
                    self.retire_lost(old);
                }
                false
            }
        };

        Ok(match previous {
            None => ObserveOutcome::Added { recognized },
            Some(_) => ObserveOutcome::Replaced { recognized },
        })
    }

    /// The old identity of a modified file has been superseded.
    fn retire_replaced(&self, old: &InstanceId, new: &InstanceId) {
        if old == new {
            // Same instance, new bytes: drop the host copy so the upload
            // that follows replaces it.
            self.delete_on_host(old);
        } else {
            self.retire_lost(old);
        }
    }

    /// The old identity is gone from this path; forget it on the host unless
    /// another path still carries it.
    fn retire_lost(&self, old: &InstanceId) {
        match self.ctx.index.files_with_instance(old) {
            Ok(others) if others.is_empty() => self.delete_on_host(old),
            Ok(_) => debug!(instance = %old, "Identity still present elsewhere, keeping host copy"),
            Err(err) => warn!(instance = %old, error = %err, "Cannot check remaining copies"),
        }
    }

    fn delete_on_host(&self, instance: &InstanceId) {
        if let Err(err) = self.ctx.host.delete_instance(instance) {
            warn!(instance = %instance, error = %err, "Delete on host failed");
        }
    }

    /// Settle a record whose path has been missing for two passes. Returns
    /// true when the identity disappeared with it.
    pub fn confirm_deleted(&self, record: &FileRecord) -> Result<bool> {
        let index = &self.ctx.index;
        if !index.remove_file(&record.path)? {
            return Ok(false);
        }
        let Some(instance) = &record.instance else {
            return Ok(false);
        };
        if !index.files_with_instance(instance)?.is_empty() {
            debug!(path = %record.path.display(), "Deleted copy, identity survives elsewhere");
            return Ok(false);
        }

        index.detach_all(instance)?;
        self.delete_on_host(instance);
        self.ctx.notifier.file_deleted(&self.relative_path(&record.path));
        info!(path = %record.path.display(), instance = %instance, "File deleted");
        Ok(true)
    }

    // ========================================================================
    // Push path
    // ========================================================================

    /// Accept content pushed by the host under attachment `id`.
    pub fn accept_push(&self, id: &str, content: &[u8], kind: ContentKind) -> Result<PushOutcome> {
        let attachment = AttachmentId::parse(id)?;

        if kind != ContentKind::Dicom {
            self.ctx.store.create(id, content)?;
            return Ok(PushOutcome::Cached);
        }
        let identity = match self.ctx.resolver.resolve(content) {
            Ok(identity) => identity,
            Err(reason) => {
                debug!(attachment = %attachment, reason = %reason, "Pushed content not recognized, caching");
                self.ctx.store.create(id, content)?;
                return Ok(PushOutcome::Cached);
            }
        };

        if self.ctx.index.attach(&attachment, &identity.instance)? == AttachOutcome::Attached {
            debug!(attachment = %attachment, instance = %identity.instance, "Deduplicated push");
            return Ok(PushOutcome::Deduplicated);
        }

        let target = self.materialized_path(&attachment, &identity);
        ContentStore::create_at(&target, content)?;

        match self.register_written(&attachment, &identity.instance, &target) {
            Ok(Registration::Registered) => {
                self.ctx.notifier.file_added(&self.relative_path(&target));
                info!(path = %target.display(), instance = %identity.instance, "Materialized pushed instance");
                Ok(PushOutcome::Materialized(target))
            }
            Ok(Registration::AlreadyPresent) => {
                self.discard(&target);
                debug!(attachment = %attachment, "Concurrent push registered first");
                Ok(PushOutcome::RaceLost)
            }
            Err(err) => {
                self.discard(&target);
                Err(err)
            }
        }
    }

    fn register_written(&self, attachment: &AttachmentId, instance: &InstanceId, target: &Path) -> Result<Registration> {
        let observation = Observation::from_metadata(target.to_path_buf(), &fs::metadata(target)?);
        let record = FileRecord::dicom(target, observation.mtime_ms, observation.size, instance.clone());
        Ok(self.ctx.index.register_instance(attachment, &record)?)
    }

    fn discard(&self, path: &Path) {
        if let Err(err) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %err, "Cannot remove discarded write");
        }
    }

    fn materialized_path(&self, attachment: &AttachmentId, identity: &ResolvedIdentity) -> PathBuf {
        let file_name = format!("{}.{}", attachment, MATERIALIZED_EXTENSION);
        match &identity.grouping_key {
            Some(key) => self.ctx.storage_root.join(key).join(file_name),
            None => self.ctx.storage_root.join(file_name),
        }
    }

    /// Notification path: relative to the storage root with `/` separators,
    /// or the full path for files outside it.
    fn relative_path(&self, path: &Path) -> String {
        match path.strip_prefix(&self.ctx.storage_root) {
            Ok(relative) => relative
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => path.to_string_lossy().into_owned(),
        }
    }

    // ========================================================================
    // Read and remove delegation
    // ========================================================================

    /// Path of the indexed file backing a DICOM attachment, if any.
    fn attached_path(&self, id: &str, kind: ContentKind) -> Result<Option<(AttachmentId, InstanceId, PathBuf)>> {
        if kind != ContentKind::Dicom {
            return Ok(None);
        }
        let Ok(attachment) = AttachmentId::parse(id) else {
            return Ok(None);
        };
        Ok(self
            .ctx
            .index
            .lookup_attachment(&attachment)?
            .and_then(|attached| attached.path.map(|path| (attachment, attached.instance, path))))
    }

    pub fn read_whole(&self, id: &str, kind: ContentKind) -> Result<Vec<u8>> {
        match self.attached_path(id, kind)? {
            Some((_, _, path)) => Ok(ContentStore::read_whole_from_path(&path)?),
            None => Ok(self.ctx.store.read_whole(id)?),
        }
    }

    pub fn read_range(&self, id: &str, kind: ContentKind, start: u64, length: u64) -> Result<Vec<u8>> {
        match self.attached_path(id, kind)? {
            Some((_, _, path)) => Ok(ContentStore::read_range_from_path(&path, start, length)?),
            None => Ok(self.ctx.store.read_range(id, start, length)?),
        }
    }

    /// Host dropped attachment `id`. The backing file goes only when no other
    /// attachment still references its identity.
    pub fn remove(&self, id: &str, kind: ContentKind) -> Result<()> {
        let index = &self.ctx.index;
        if let Some((attachment, instance, path)) = self.attached_path(id, kind)? {
            index.detach(&attachment)?;
            if index.count_attachments(&instance)? == 0 {
                if let Err(err) = fs::remove_file(&path) {
                    debug!(path = %path.display(), error = %err, "Backing file removal failed");
                }
                index.remove_file(&path)?;
                self.ctx.notifier.file_deleted(&self.relative_path(&path));
                info!(path = %path.display(), instance = %instance, "Removed last reference");
            }
            return Ok(());
        }

        if let Ok(attachment) = AttachmentId::parse(id) {
            index.detach(&attachment)?;
        }
        self.ctx.store.remove(id)?;
        Ok(())
    }
}
