//! Configuration for the indexer.

use super::error::{IndexerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides `[notifier] host` when set.
pub const NOTIFY_HOST_ENV: &str = "DICOMSYNC_NOTIFY_HOST";

const DATABASE_FILE_NAME: &str = "indexer-plugin.db";

/// Main configuration, read from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Root under which pushed DICOM files are materialized. Must exist.
    #[serde(default = "default_storage_directory")]
    pub storage_directory: PathBuf,

    /// Root of the content store and default home of the index database.
    /// Defaults to `storage_directory`.
    #[serde(default)]
    pub index_directory: Option<PathBuf>,

    /// Must stay `true`; storing DICOM outside the archive is unsupported.
    #[serde(default = "default_true")]
    pub store_dicom: bool,

    /// Must stay `false`; compressed storage is unsupported.
    #[serde(default)]
    pub storage_compression: bool,

    #[serde(default)]
    pub indexer: IndexerSection,

    #[serde(default)]
    pub notifier: NotifierSection,

    #[serde(default)]
    pub host: HostSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerSection {
    /// When false the storage callbacks still work but no folder is scanned
    #[serde(default = "default_true")]
    pub enable: bool,

    /// Folders to watch
    #[serde(default)]
    pub folders: Vec<PathBuf>,

    /// Seconds between scan passes
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Index database path; defaults to `<index_directory>/indexer-plugin.db`
    #[serde(default)]
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifierSection {
    /// `name[:port]` of the viewer backend; no notifications when unset
    #[serde(default)]
    pub host: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostSection {
    /// Base URL of the archive REST API; uploads are dropped when unset
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_storage_directory() -> PathBuf {
    dicomsync_logging::dicomsync_home()
        .map(|home| home.join("storage"))
        .unwrap_or_else(|_| PathBuf::from("DicomsyncStorage"))
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    10
}

impl Default for IndexerSection {
    fn default() -> Self {
        Self {
            enable: true,
            folders: Vec::new(),
            interval: default_interval(),
            database: None,
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            storage_directory: default_storage_directory(),
            index_directory: None,
            store_dicom: true,
            storage_compression: false,
            indexer: IndexerSection::default(),
            notifier: NotifierSection::default(),
            host: HostSection::default(),
        }
    }
}

impl IndexerConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| IndexerError::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| IndexerError::config(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| IndexerError::config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject configurations the indexer cannot honour.
    pub fn validate(&self) -> Result<()> {
        if !self.store_dicom {
            return Err(IndexerError::config(
                "store_dicom = false is not supported: DICOM content must be stored",
            ));
        }
        if self.storage_compression {
            return Err(IndexerError::config(
                "storage_compression = true is not supported",
            ));
        }
        if self.indexer.enable && self.indexer.folders.is_empty() {
            return Err(IndexerError::config(
                "[indexer] folders must list at least one folder",
            ));
        }
        if !self.storage_directory.is_dir() {
            return Err(IndexerError::config(format!(
                "storage_directory does not exist: {}",
                self.storage_directory.display()
            )));
        }
        Ok(())
    }

    /// Root of the content store.
    pub fn index_root(&self) -> &Path {
        self.index_directory
            .as_deref()
            .unwrap_or(&self.storage_directory)
    }

    pub fn database_path(&self) -> PathBuf {
        self.indexer
            .database
            .clone()
            .unwrap_or_else(|| self.index_root().join(DATABASE_FILE_NAME))
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.indexer.interval)
    }

    /// Notification host, with the environment override applied.
    pub fn notifier_host(&self) -> Option<String> {
        match std::env::var(NOTIFY_HOST_ENV) {
            Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
            _ => self.notifier.host.clone().filter(|h| !h.trim().is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn minimal(storage: &Path) -> IndexerConfig {
        IndexerConfig::parse(&format!(
            "storage_directory = {:?}\n[indexer]\nfolders = [\"/data/incoming\"]\n",
            storage.display().to_string()
        ))
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let dir = TempDir::new().unwrap();
        let config = minimal(dir.path());

        assert!(config.indexer.enable);
        assert_eq!(config.indexer.interval, 10);
        assert_eq!(config.scan_interval(), Duration::from_secs(10));
        assert_eq!(config.index_root(), dir.path());
        assert_eq!(config.database_path(), dir.path().join("indexer-plugin.db"));
        assert!(config.store_dicom);
        assert!(!config.storage_compression);
        config.validate().unwrap();
    }

    #[test]
    fn test_index_directory_and_database_override() {
        let dir = TempDir::new().unwrap();
        let mut config = minimal(dir.path());
        config.index_directory = Some(dir.path().join("idx"));
        assert_eq!(config.database_path(), dir.path().join("idx").join("indexer-plugin.db"));

        config.indexer.database = Some(PathBuf::from("/elsewhere/index.db"));
        assert_eq!(config.database_path(), PathBuf::from("/elsewhere/index.db"));
    }

    #[test]
    fn test_rejects_unsupported_modes() {
        let dir = TempDir::new().unwrap();
        let mut config = minimal(dir.path());
        config.store_dicom = false;
        assert!(matches!(config.validate(), Err(IndexerError::Config(_))));

        let mut config = minimal(dir.path());
        config.storage_compression = true;
        assert!(matches!(config.validate(), Err(IndexerError::Config(_))));
    }

    #[test]
    fn test_requires_folders_when_enabled() {
        let dir = TempDir::new().unwrap();
        let mut config = minimal(dir.path());
        config.indexer.folders.clear();
        assert!(config.validate().is_err());

        config.indexer.enable = false;
        config.validate().unwrap();
    }

    #[test]
    fn test_requires_existing_storage_directory() {
        let dir = TempDir::new().unwrap();
        let config = minimal(&dir.path().join("missing"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let mut config = minimal(dir.path());
        config.host.url = Some("http://localhost:8042".into());
        config.notifier.host = Some("viewer:1441".into());

        let path = dir.path().join("dicomsync.toml");
        config.save(&path).unwrap();
        let loaded = IndexerConfig::load(&path).unwrap();
        assert_eq!(loaded.host.url.as_deref(), Some("http://localhost:8042"));
        assert_eq!(loaded.notifier.host.as_deref(), Some("viewer:1441"));
        assert_eq!(loaded.indexer.folders, vec![PathBuf::from("/data/incoming")]);
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            IndexerConfig::parse("indexer = 3"),
            Err(IndexerError::Config(_))
        ));
    }
}
