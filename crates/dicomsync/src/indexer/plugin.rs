//! Host-facing surface: storage callbacks and lifecycle.
//!
//! Every callback catches errors and panics, logs them, and answers with a
//! [`StorageStatus`]; nothing propagates into the host.

use super::config::IndexerConfig;
use super::coordinator::Coordinator;
use super::error::{IndexerError, Result};
use super::host::{DetachedHost, HostApi, RestHost};
use super::identity::DicomIdentityResolver;
use super::notifier::{EventNotifier, HttpNotifier, NoopNotifier};
use super::scanner::{ScanConfig, Scanner};
use super::types::{ContentKind, HostEvent, ScanCancelToken, StorageStatus};
use super::IndexerContext;
use dicomsync_db::SqliteIndex;
use dicomsync_storage::ContentStore;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{error, info, warn};

struct ScannerHandle {
    token: ScanCancelToken,
    thread: JoinHandle<()>,
}

pub struct Plugin {
    coordinator: Arc<Coordinator>,
    scan_config: Option<ScanConfig>,
    scanner: Mutex<Option<ScannerHandle>>,
}

impl Plugin {
    /// Validate `config` and build every collaborator. Only failures here
    /// prevent activation.
    pub fn initialize(config: &IndexerConfig) -> Result<Self> {
        config.validate()?;

        let index_root = config.index_root();
        std::fs::create_dir_all(index_root)?;
        let database = config.database_path();
        let index = Arc::new(SqliteIndex::open(&database)?);

        let host: Arc<dyn HostApi> = match &config.host.url {
            Some(url) => {
                let rest = RestHost::new(url.as_str());
                match (&config.host.username, &config.host.password) {
                    (Some(user), Some(password)) => Arc::new(rest.with_basic_auth(user, password)),
                    _ => Arc::new(rest),
                }
            }
            None => {
                warn!("No host URL configured, scanned instances will not be uploaded");
                Arc::new(DetachedHost)
            }
        };
        let notifier: Arc<dyn EventNotifier> = match config.notifier_host() {
            Some(host) => Arc::new(HttpNotifier::new(host)),
            None => Arc::new(NoopNotifier),
        };

        let coordinator = Coordinator::new(IndexerContext {
            index,
            store: ContentStore::new(index_root)?,
            storage_root: config.storage_directory.clone(),
            resolver: Arc::new(DicomIdentityResolver),
            host,
            notifier,
        });

        let scan_config = config.indexer.enable.then(|| ScanConfig {
            roots: config.indexer.folders.clone(),
            interval: config.scan_interval(),
        });

        info!(
            database = %database.display(),
            storage = %config.storage_directory.display(),
            folders = config.indexer.folders.len(),
            scanning = scan_config.is_some(),
            "Indexer initialized"
        );
        Ok(Self::from_parts(Arc::new(coordinator), scan_config))
    }

    /// Assemble a plugin from prebuilt parts. `scan_config = None` disables
    /// folder scanning.
    pub fn from_parts(coordinator: Arc<Coordinator>, scan_config: Option<ScanConfig>) -> Self {
        Self {
            coordinator,
            scan_config,
            scanner: Mutex::new(None),
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    // ========================================================================
    // Storage callbacks
    // ========================================================================

    pub fn create(&self, id: &str, content: &[u8], kind: ContentKind) -> StorageStatus {
        status_of(
            "create",
            id,
            guarded(|| self.coordinator.accept_push(id, content, kind).map(|_| ())),
        )
    }

    pub fn read_whole(&self, id: &str, kind: ContentKind) -> std::result::Result<Vec<u8>, StorageStatus> {
        guarded(|| self.coordinator.read_whole(id, kind)).map_err(|err| {
            error!(operation = "read", attachment = id, kind = kind.as_str(), error = %err, "Storage callback failed");
            StorageStatus::InternalError
        })
    }

    /// Fill `target` with the bytes starting at `start`.
    pub fn read_range(&self, id: &str, kind: ContentKind, start: u64, target: &mut [u8]) -> StorageStatus {
        let result = guarded(|| {
            let bytes = self.coordinator.read_range(id, kind, start, target.len() as u64)?;
            target.copy_from_slice(&bytes);
            Ok(())
        });
        status_of("read_range", id, result)
    }

    pub fn remove(&self, id: &str, kind: ContentKind) -> StorageStatus {
        status_of("remove", id, guarded(|| self.coordinator.remove(id, kind)))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn on_host_state_change(&self, event: HostEvent) -> Result<()> {
        match event {
            HostEvent::Started => self.start_scanner(),
            HostEvent::Stopped => self.stop_scanner(),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanner.lock().map(|guard| guard.is_some()).unwrap_or(false)
    }

    fn start_scanner(&self) -> Result<()> {
        let Some(scan_config) = self.scan_config.clone() else {
            info!("Folder scanning disabled");
            return Ok(());
        };
        let mut slot = self
            .scanner
            .lock()
            .map_err(|_| IndexerError::invalid_state("scanner lock poisoned"))?;
        if slot.is_some() {
            return Ok(());
        }

        let token = ScanCancelToken::new();
        let mut scanner = Scanner::new(Arc::clone(&self.coordinator), scan_config);
        let thread_token = token.clone();
        let thread = std::thread::Builder::new()
            .name("dicomsync-scanner".to_string())
            .spawn(move || scanner.run(&thread_token))?;
        *slot = Some(ScannerHandle { token, thread });
        Ok(())
    }

    fn stop_scanner(&self) -> Result<()> {
        let handle = self
            .scanner
            .lock()
            .map_err(|_| IndexerError::invalid_state("scanner lock poisoned"))?
            .take();
        if let Some(handle) = handle {
            handle.token.cancel();
            handle
                .thread
                .join()
                .map_err(|_| IndexerError::invalid_state("scanner thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for Plugin {
    fn drop(&mut self) {
        if let Err(err) = self.stop_scanner() {
            warn!(error = %err, "Scanner did not stop cleanly");
        }
    }
}

/// Run `f`, turning a panic into an error.
fn guarded<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(IndexerError::invalid_state(format!("panic: {}", message)))
        }
    }
}

fn status_of(operation: &str, id: &str, result: Result<()>) -> StorageStatus {
    match result {
        Ok(()) => StorageStatus::Success,
        Err(err) => {
            error!(operation, attachment = id, error = %err, "Storage callback failed");
            StorageStatus::InternalError
        }
    }
}
