//! Blob store addressed by attachment UUID.
//!
//! Layout: `root/ab/cd/abcd....` where `ab` and `cd` are the first two
//! character pairs of the identifier.

use crate::error::{Result, StorageError};
use crate::mapped::MappedFileReader;
use dicomsync_ids::AttachmentId;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if root.as_os_str().is_empty() {
            return Err(StorageError::InvalidRoot("storage root is empty".to_string()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the blob for `id`. Does not touch the filesystem.
    pub fn path_for(&self, id: &str) -> Result<PathBuf> {
        let id = AttachmentId::parse(id).map_err(|e| StorageError::InvalidIdentifier(e.to_string()))?;
        let text = id.as_str();
        Ok(self.root.join(&text[0..2]).join(&text[2..4]).join(text))
    }

    /// Write a blob, creating its shard directories. An existing blob with
    /// the same identifier is overwritten.
    pub fn create(&self, id: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(id)?;
        Self::create_at(&path, content)?;
        Ok(path)
    }

    /// Write `content` to an explicit path with the same directory handling
    /// as [`create`](Self::create).
    pub fn create_at(path: &Path, content: &[u8]) -> Result<()> {
        prepare_parent(path)?;
        if path.is_dir() {
            return Err(StorageError::DirectoryConflict(path.to_path_buf()));
        }
        fs::write(path, content).map_err(|e| StorageError::write_failure(path, e))?;
        debug!(path = %path.display(), bytes = content.len(), "Wrote blob");
        Ok(())
    }

    pub fn read_whole(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.path_for(id)?;
        Self::read_whole_from_path(&path)
    }

    pub fn read_range(&self, id: &str, start: u64, length: u64) -> Result<Vec<u8>> {
        let path = self.path_for(id)?;
        Self::read_range_from_path(&path, start, length)
    }

    pub fn read_whole_from_path(path: &Path) -> Result<Vec<u8>> {
        Ok(MappedFileReader::open(path)?.to_vec())
    }

    /// Exactly `length` bytes starting at `start`, or `CorruptedContent`.
    pub fn read_range_from_path(path: &Path, start: u64, length: u64) -> Result<Vec<u8>> {
        if length == 0 {
            // A zero length means "to the end" for the reader, so only check
            // that the blob is there.
            fs::metadata(path).map_err(|e| StorageError::read_failure(path, e))?;
            return Ok(Vec::new());
        }
        let reader = MappedFileReader::open_range(path, start, length)?;
        if reader.len() as u64 != length {
            return Err(StorageError::CorruptedContent {
                path: path.to_path_buf(),
                requested: length,
                actual: reader.len() as u64,
            });
        }
        Ok(reader.to_vec())
    }

    /// Best-effort removal of the blob and its now-empty shard directories.
    /// Only an invalid identifier is reported.
    pub fn remove(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        if let Err(err) = fs::remove_file(&path) {
            debug!(path = %path.display(), error = %err, "Blob removal failed");
        }
        let mut dir = path.parent();
        for _ in 0..2 {
            let Some(current) = dir else { break };
            // Fails harmlessly when other blobs share the shard.
            let _ = fs::remove_dir(current);
            dir = current.parent();
        }
        Ok(())
    }
}

fn prepare_parent(path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    for ancestor in parent.ancestors() {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        match fs::metadata(ancestor) {
            Ok(meta) if meta.is_dir() => break,
            Ok(_) => return Err(StorageError::DirectoryConflict(ancestor.to_path_buf())),
            Err(_) => continue,
        }
    }
    fs::create_dir_all(parent).map_err(|e| StorageError::write_failure(parent, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ID: &str = "0a1b2c3d-0000-4000-8000-000000000001";
    const OTHER: &str = "0a1b9999-0000-4000-8000-000000000002";

    fn store() -> (TempDir, ContentStore) {
        let dir = TempDir::new().unwrap();
        let store = ContentStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_sharded_path() {
        let (dir, store) = store();
        let path = store.path_for(ID).unwrap();
        assert_eq!(path, dir.path().join("0a").join("1b").join(ID));
    }

    #[test]
    fn test_invalid_identifier() {
        let (_dir, store) = store();
        assert!(matches!(
            store.create("nope", b"x"),
            Err(StorageError::InvalidIdentifier(_))
        ));
        assert!(matches!(store.remove("nope"), Err(StorageError::InvalidIdentifier(_))));
    }

    #[test]
    fn test_empty_root_rejected() {
        assert!(matches!(ContentStore::new(""), Err(StorageError::InvalidRoot(_))));
    }

    #[test]
    fn test_create_read_remove() {
        let (dir, store) = store();
        store.create(ID, b"hello blob").unwrap();

        assert_eq!(store.read_whole(ID).unwrap(), b"hello blob");
        assert_eq!(store.read_range(ID, 6, 4).unwrap(), b"blob");

        store.remove(ID).unwrap();
        assert!(!store.path_for(ID).unwrap().exists());
        assert!(!dir.path().join("0a").exists());
    }

    #[test]
    fn test_overwrite_same_identifier() {
        let (_dir, store) = store();
        store.create(ID, b"first").unwrap();
        store.create(ID, b"second").unwrap();
        assert_eq!(store.read_whole(ID).unwrap(), b"second");
    }

    #[test]
    fn test_remove_keeps_shared_shard() {
        let (dir, store) = store();
        store.create(ID, b"a").unwrap();
        store.create(OTHER, b"b").unwrap();

        store.remove(ID).unwrap();
        assert!(dir.path().join("0a").is_dir());
        assert_eq!(store.read_whole(OTHER).unwrap(), b"b");
    }

    #[test]
    fn test_remove_missing_is_silent() {
        let (_dir, store) = store();
        store.remove(ID).unwrap();
    }

    #[test]
    fn test_directory_conflict() {
        let (dir, store) = store();
        fs::write(dir.path().join("0a"), b"in the way").unwrap();
        assert!(matches!(
            store.create(ID, b"x"),
            Err(StorageError::DirectoryConflict(_))
        ));
    }

    #[test]
    fn test_read_range_short_is_corrupted() {
        let (_dir, store) = store();
        store.create(ID, &[7u8; 100]).unwrap();
        assert!(matches!(
            store.read_range(ID, 90, 20),
            Err(StorageError::CorruptedContent {
                requested: 20,
                actual: 10,
                ..
            })
        ));
    }

    #[test]
    fn test_read_missing_blob_fails() {
        let (_dir, store) = store();
        assert!(matches!(store.read_whole(ID), Err(StorageError::ReadFailure { .. })));
    }

    #[test]
    fn test_empty_range_of_missing_blob_fails() {
        let (_dir, store) = store();
        assert!(matches!(store.read_range(ID, 0, 0), Err(StorageError::ReadFailure { .. })));

        store.create(ID, b"abc").unwrap();
        assert!(store.read_range(ID, 1, 0).unwrap().is_empty());
    }

    #[test]
    fn test_create_at_explicit_path() {
        let (dir, _store) = store();
        let target = dir.path().join("abcdef0123").join("x.dcm");
        ContentStore::create_at(&target, b"dicom").unwrap();
        assert_eq!(ContentStore::read_whole_from_path(&target).unwrap(), b"dicom");
    }
}
