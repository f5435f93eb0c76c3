//! The indexer engine.
//!
//! Two paths feed the same index:
//! - scan path: [`Scanner`] walks the watched folders and hands each file
//!   to [`Coordinator::observe`]
//! - push path: the host calls the storage callbacks on [`Plugin`], which
//!   route DICOM content through [`Coordinator::accept_push`]
//!
//! Both may run at once. Duplicate registration of one identity is settled
//! by the index's atomic compare-and-register step, not by a lock here.

pub mod config;
pub mod coordinator;
pub mod dicom;
pub mod error;
pub mod host;
pub mod identity;
pub mod notifier;
pub mod plugin;
pub mod scanner;
pub mod types;

pub use config::IndexerConfig;
pub use coordinator::Coordinator;
pub use error::{IndexerError, Result};
pub use host::{DetachedHost, HostApi, HostError, RestHost};
pub use identity::{DicomIdentityResolver, IdentityResolver, ResolvedIdentity};
pub use notifier::{EventNotifier, HttpNotifier, NoopNotifier};
pub use plugin::Plugin;
pub use scanner::{ScanConfig, Scanner};
pub use types::{
    ContentKind, HostEvent, ObserveOutcome, Observation, PushOutcome, ScanCancelToken, ScanStats,
    StorageStatus,
};

use dicomsync_db::Index;
use dicomsync_storage::ContentStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything the coordinator talks to, built once at activation.
pub struct IndexerContext {
    pub index: Arc<dyn Index>,
    /// Store for non-DICOM and unrecognized pushed content
    pub store: ContentStore,
    /// Root under which pushed DICOM is materialized
    pub storage_root: PathBuf,
    pub resolver: Arc<dyn IdentityResolver>,
    pub host: Arc<dyn HostApi>,
    pub notifier: Arc<dyn EventNotifier>,
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording fakes shared by the indexer tests.

    use super::*;
    use dicomsync_db::SqliteIndex;
    use dicomsync_ids::InstanceId;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    pub struct RecordingHost {
        pub uploads: Mutex<Vec<Vec<u8>>>,
        pub deletes: Mutex<Vec<InstanceId>>,
    }

    impl HostApi for RecordingHost {
        fn upload_instance(&self, content: &[u8]) -> std::result::Result<(), HostError> {
            self.uploads.lock().unwrap().push(content.to_vec());
            Ok(())
        }

        fn delete_instance(&self, instance: &InstanceId) -> std::result::Result<(), HostError> {
            self.deletes.lock().unwrap().push(instance.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct RecordingNotifier {
        pub added: Mutex<Vec<String>>,
        pub deleted: Mutex<Vec<String>>,
    }

    impl EventNotifier for RecordingNotifier {
        fn file_added(&self, relative_path: &str) {
            self.added.lock().unwrap().push(relative_path.to_string());
        }

        fn file_deleted(&self, relative_path: &str) {
            self.deleted.lock().unwrap().push(relative_path.to_string());
        }
    }

    /// A coordinator over temp directories with recording collaborators.
    pub struct TestEnv {
        pub dir: TempDir,
        pub index: Arc<SqliteIndex>,
        pub host: Arc<RecordingHost>,
        pub notifier: Arc<RecordingNotifier>,
        pub coordinator: Arc<Coordinator>,
    }

    impl TestEnv {
        pub fn new() -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::create_dir_all(dir.path().join("storage")).unwrap();
            std::fs::create_dir_all(dir.path().join("watched")).unwrap();
            let index = Arc::new(SqliteIndex::open(&dir.path().join("index.db")).unwrap());
            let host = Arc::new(RecordingHost::default());
            let notifier = Arc::new(RecordingNotifier::default());
            let coordinator = Arc::new(Coordinator::new(IndexerContext {
                index: index.clone(),
                store: ContentStore::new(dir.path().join("cache")).unwrap(),
                storage_root: dir.path().join("storage"),
                resolver: Arc::new(DicomIdentityResolver),
                host: host.clone(),
                notifier: notifier.clone(),
            }));
            Self {
                dir,
                index,
                host,
                notifier,
                coordinator,
            }
        }

        pub fn storage_root(&self) -> PathBuf {
            self.dir.path().join("storage")
        }

        pub fn watched(&self) -> PathBuf {
            self.dir.path().join("watched")
        }
    }
}
