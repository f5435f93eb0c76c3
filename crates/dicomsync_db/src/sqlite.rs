//! SQLite-backed index.
//!
//! One connection guarded by a mutex. Every method takes the lock for its
//! whole duration, and `register_instance` additionally runs inside an
//! IMMEDIATE transaction so its check and its inserts cannot interleave with
//! another writer on the same database file.

use crate::error::{DbError, Result};
use crate::types::{AttachOutcome, AttachedFile, FileRecord, FileStatus, IndexStats, Registration};
use crate::Index;
use dicomsync_ids::{AttachmentId, InstanceId};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Database schema
/// Note: mtime is stored as INTEGER (milliseconds since Unix epoch)
const SCHEMA_SQL: &str = r#"
-- Files: one row per observed or materialized path
CREATE TABLE IF NOT EXISTS files (
    path TEXT PRIMARY KEY,
    mtime_ms INTEGER NOT NULL,
    size INTEGER NOT NULL,
    is_dicom INTEGER NOT NULL,
    instance_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_files_instance ON files(instance_id);

-- Attachments: host storage UUID -> canonical identity
CREATE TABLE IF NOT EXISTS attachments (
    attachment_id TEXT PRIMARY KEY,
    instance_id TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_attachments_instance ON attachments(instance_id);
"#;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type RawRecord = (String, i64, i64, bool, Option<String>);

pub struct SqliteIndex {
    conn: Mutex<Connection>,
}

impl SqliteIndex {
    /// Open (or create) the index at `path`, creating its directory.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// In-memory index, for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DbError::invalid_state("index connection lock poisoned"))
    }
}

fn path_text(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| DbError::invalid_record(format!("path is not valid UTF-8: {}", path.display())))
}

fn size_value(size: u64) -> Result<i64> {
    i64::try_from(size).map_err(|_| DbError::invalid_record(format!("size out of range: {}", size)))
}

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_record(raw: RawRecord) -> Result<FileRecord> {
    let (path, mtime_ms, size, is_dicom, instance) = raw;
    let instance = instance
        .map(|text| InstanceId::parse(&text).map_err(|e| DbError::invalid_record(e.to_string())))
        .transpose()?;
    Ok(FileRecord {
        path: PathBuf::from(path),
        mtime_ms,
        size: u64::try_from(size).map_err(|_| DbError::invalid_record(format!("negative size: {}", size)))?,
        is_dicom,
        instance,
    })
}

fn query_records(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> Result<Vec<FileRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let raws = stmt
        .query_map(args, read_raw)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(into_record).collect()
}

fn upsert_file(conn: &Connection, record: &FileRecord) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO files (path, mtime_ms, size, is_dicom, instance_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            path_text(&record.path)?,
            record.mtime_ms,
            size_value(record.size)?,
            record.is_dicom,
            record.instance.as_ref().map(|i| i.as_str()),
        ],
    )?;
    Ok(())
}

fn insert_link(conn: &Connection, attachment: &AttachmentId, instance: &InstanceId) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO attachments (attachment_id, instance_id) VALUES (?1, ?2)",
        params![attachment.as_str(), instance.as_str()],
    )?;
    Ok(())
}

impl Index for SqliteIndex {
    fn lookup_file(&self, path: &Path, mtime_ms: i64, size: u64) -> Result<FileStatus> {
        let conn = self.lock()?;
        let row: Option<(i64, i64, Option<String>)> = conn
            .query_row(
                "SELECT mtime_ms, size, instance_id FROM files WHERE path = ?1",
                [path_text(path)?],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((stored_mtime, stored_size, instance)) = row else {
            return Ok(FileStatus::New);
        };
        if stored_mtime == mtime_ms && stored_size == size_value(size)? {
            return Ok(FileStatus::Unchanged);
        }
        let previous = instance
            .map(|text| InstanceId::parse(&text).map_err(|e| DbError::invalid_record(e.to_string())))
            .transpose()?;
        Ok(FileStatus::Modified { previous })
    }

    fn get_file(&self, path: &Path) -> Result<Option<FileRecord>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT path, mtime_ms, size, is_dicom, instance_id FROM files WHERE path = ?1",
                [path_text(path)?],
                read_raw,
            )
            .optional()?;
        raw.map(into_record).transpose()
    }

    fn add_dicom_file(&self, path: &Path, mtime_ms: i64, size: u64, instance: &InstanceId) -> Result<()> {
        let conn = self.lock()?;
        upsert_file(&conn, &FileRecord::dicom(path, mtime_ms, size, instance.clone()))
    }

    fn add_opaque_file(&self, path: &Path, mtime_ms: i64, size: u64) -> Result<()> {
        let conn = self.lock()?;
        upsert_file(&conn, &FileRecord::opaque(path, mtime_ms, size))
    }

    fn remove_file(&self, path: &Path) -> Result<bool> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM files WHERE path = ?1", [path_text(path)?])?;
        Ok(removed > 0)
    }

    fn tracked_instances(&self) -> Result<Vec<FileRecord>> {
        let conn = self.lock()?;
        query_records(
            &conn,
            "SELECT path, mtime_ms, size, is_dicom, instance_id FROM files
             WHERE instance_id IS NOT NULL ORDER BY path",
            [],
        )
    }

    fn files_with_instance(&self, instance: &InstanceId) -> Result<Vec<FileRecord>> {
        let conn = self.lock()?;
        query_records(
            &conn,
            "SELECT path, mtime_ms, size, is_dicom, instance_id FROM files
             WHERE instance_id = ?1 ORDER BY path",
            [instance.as_str()],
        )
    }

    fn attach(&self, attachment: &AttachmentId, instance: &InstanceId) -> Result<AttachOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let claimed: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM files WHERE instance_id = ?1)",
            [instance.as_str()],
            |row| row.get(0),
        )?;
        if !claimed {
            return Ok(AttachOutcome::Unclaimed);
        }
        insert_link(&tx, attachment, instance)?;
        tx.commit()?;
        debug!(attachment = %attachment, instance = %instance, "Attached to existing instance");
        Ok(AttachOutcome::Attached)
    }

    fn register_instance(&self, attachment: &AttachmentId, record: &FileRecord) -> Result<Registration> {
        let instance = record
            .instance
            .as_ref()
            .ok_or_else(|| DbError::invalid_record("cannot register a record without identity"))?;
        let own_path = path_text(&record.path)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let elsewhere: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM files WHERE instance_id = ?1 AND path <> ?2)",
            params![instance.as_str(), own_path],
            |row| row.get(0),
        )?;

        let outcome = if elsewhere {
            insert_link(&tx, attachment, instance)?;
            Registration::AlreadyPresent
        } else {
            upsert_file(&tx, record)?;
            insert_link(&tx, attachment, instance)?;
            Registration::Registered
        };
        tx.commit()?;
        debug!(attachment = %attachment, instance = %instance, ?outcome, "Registration settled");
        Ok(outcome)
    }

    fn lookup_attachment(&self, attachment: &AttachmentId) -> Result<Option<AttachedFile>> {
        let conn = self.lock()?;
        let row: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT a.instance_id,
                        (SELECT f.path FROM files f WHERE f.instance_id = a.instance_id
                         ORDER BY f.path LIMIT 1)
                 FROM attachments a WHERE a.attachment_id = ?1",
                [attachment.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(instance, path)| {
            Ok(AttachedFile {
                instance: InstanceId::parse(&instance).map_err(|e| DbError::invalid_record(e.to_string()))?,
                path: path.map(PathBuf::from),
            })
        })
        .transpose()
    }

    fn detach(&self, attachment: &AttachmentId) -> Result<Option<InstanceId>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let instance: Option<String> = tx
            .query_row(
                "SELECT instance_id FROM attachments WHERE attachment_id = ?1",
                [attachment.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        tx.execute(
            "DELETE FROM attachments WHERE attachment_id = ?1",
            [attachment.as_str()],
        )?;
        tx.commit()?;
        instance
            .map(|text| InstanceId::parse(&text).map_err(|e| DbError::invalid_record(e.to_string())))
            .transpose()
    }

    fn count_attachments(&self, instance: &InstanceId) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM attachments WHERE instance_id = ?1",
            [instance.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn detach_all(&self, instance: &InstanceId) -> Result<u64> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM attachments WHERE instance_id = ?1",
            [instance.as_str()],
        )?;
        Ok(removed as u64)
    }

    fn stats(&self) -> Result<IndexStats> {
        let conn = self.lock()?;
        let (files, dicom_files): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(is_dicom), 0) FROM files",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let attachments: i64 = conn.query_row("SELECT COUNT(*) FROM attachments", [], |row| row.get(0))?;
        Ok(IndexStats {
            files: files as u64,
            dicom_files: dicom_files as u64,
            attachments: attachments as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(sop: &str) -> InstanceId {
        InstanceId::from_hierarchy("P", "1.2", "1.2.3", sop)
    }

    fn attachment(n: u32) -> AttachmentId {
        AttachmentId::parse(&format!("00000000-0000-4000-8000-{:012}", n)).unwrap()
    }

    #[test]
    fn test_lookup_new_unchanged_modified() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let path = Path::new("/data/a.dcm");
        let id = instance("1");

        assert_eq!(index.lookup_file(path, 10, 100).unwrap(), FileStatus::New);
        index.add_dicom_file(path, 10, 100, &id).unwrap();
        assert_eq!(index.lookup_file(path, 10, 100).unwrap(), FileStatus::Unchanged);
        assert_eq!(
            index.lookup_file(path, 11, 100).unwrap(),
            FileStatus::Modified { previous: Some(id.clone()) }
        );
        assert_eq!(
            index.lookup_file(path, 10, 101).unwrap(),
            FileStatus::Modified { previous: Some(id) }
        );
    }

    #[test]
    fn test_opaque_modified_has_no_previous() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let path = Path::new("/data/notes.txt");
        index.add_opaque_file(path, 1, 5).unwrap();
        assert_eq!(
            index.lookup_file(path, 2, 5).unwrap(),
            FileStatus::Modified { previous: None }
        );
        assert!(index.tracked_instances().unwrap().is_empty());
    }

    #[test]
    fn test_one_record_per_path() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let path = Path::new("/data/a.dcm");
        index.add_opaque_file(path, 1, 5).unwrap();
        index.add_dicom_file(path, 2, 6, &instance("1")).unwrap();

        let record = index.get_file(path).unwrap().unwrap();
        assert!(record.is_dicom);
        assert_eq!(record.size, 6);
        assert_eq!(index.stats().unwrap().files, 1);
    }

    #[test]
    fn test_remove_file_reports_existence() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let path = Path::new("/data/a.dcm");
        assert!(!index.remove_file(path).unwrap());
        index.add_dicom_file(path, 1, 1, &instance("1")).unwrap();
        assert!(index.remove_file(path).unwrap());
        assert!(index.get_file(path).unwrap().is_none());
    }

    #[test]
    fn test_attach_requires_existing_instance() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let id = instance("1");
        assert_eq!(index.attach(&attachment(1), &id).unwrap(), AttachOutcome::Unclaimed);
        assert_eq!(index.count_attachments(&id).unwrap(), 0);

        index.add_dicom_file(Path::new("/data/a.dcm"), 1, 1, &id).unwrap();
        assert_eq!(index.attach(&attachment(1), &id).unwrap(), AttachOutcome::Attached);
        assert_eq!(index.count_attachments(&id).unwrap(), 1);

        let attached = index.lookup_attachment(&attachment(1)).unwrap().unwrap();
        assert_eq!(attached.instance, id);
        assert_eq!(attached.path, Some(PathBuf::from("/data/a.dcm")));
    }

    #[test]
    fn test_register_instance_first_wins() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let id = instance("1");
        let first = FileRecord::dicom("/store/g/a.dcm", 1, 10, id.clone());
        let second = FileRecord::dicom("/store/g/b.dcm", 1, 10, id.clone());

        assert_eq!(
            index.register_instance(&attachment(1), &first).unwrap(),
            Registration::Registered
        );
        assert_eq!(
            index.register_instance(&attachment(2), &second).unwrap(),
            Registration::AlreadyPresent
        );

        assert_eq!(index.files_with_instance(&id).unwrap(), vec![first]);
        assert_eq!(index.count_attachments(&id).unwrap(), 2);
    }

    #[test]
    fn test_register_instance_same_path_replaces() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let id = instance("1");
        index.add_dicom_file(Path::new("/store/a.dcm"), 1, 10, &id).unwrap();
        let record = FileRecord::dicom("/store/a.dcm", 2, 12, id.clone());
        assert_eq!(
            index.register_instance(&attachment(1), &record).unwrap(),
            Registration::Registered
        );
        assert_eq!(index.get_file(Path::new("/store/a.dcm")).unwrap(), Some(record));
    }

    #[test]
    fn test_register_requires_identity() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let record = FileRecord::opaque("/store/x", 1, 1);
        assert!(matches!(
            index.register_instance(&attachment(1), &record),
            Err(DbError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_detach_and_detach_all() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let id = instance("1");
        index.add_dicom_file(Path::new("/data/a.dcm"), 1, 1, &id).unwrap();
        index.attach(&attachment(1), &id).unwrap();
        index.attach(&attachment(2), &id).unwrap();
        index.attach(&attachment(3), &id).unwrap();

        assert_eq!(index.detach(&attachment(1)).unwrap(), Some(id.clone()));
        assert_eq!(index.detach(&attachment(1)).unwrap(), None);
        assert_eq!(index.detach_all(&id).unwrap(), 2);
        assert_eq!(index.count_attachments(&id).unwrap(), 0);
    }

    #[test]
    fn test_lookup_attachment_without_file() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let id = instance("1");
        index.add_dicom_file(Path::new("/data/a.dcm"), 1, 1, &id).unwrap();
        index.attach(&attachment(1), &id).unwrap();
        index.remove_file(Path::new("/data/a.dcm")).unwrap();

        let attached = index.lookup_attachment(&attachment(1)).unwrap().unwrap();
        assert_eq!(attached.path, None);
        assert!(index.lookup_attachment(&attachment(9)).unwrap().is_none());
    }

    #[test]
    fn test_stats() {
        let index = SqliteIndex::open_in_memory().unwrap();
        assert_eq!(index.stats().unwrap(), IndexStats::default());
        index.add_dicom_file(Path::new("/a"), 1, 1, &instance("1")).unwrap();
        index.add_opaque_file(Path::new("/b"), 1, 1).unwrap();
        index.attach(&attachment(1), &instance("1")).unwrap();
        assert_eq!(
            index.stats().unwrap(),
            IndexStats {
                files: 2,
                dicom_files: 1,
                attachments: 1
            }
        );
    }
}
