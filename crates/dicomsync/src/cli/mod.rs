//! Command-line interface for dicomsync.

pub mod config;
pub mod error;
pub mod run;
pub mod scan;
pub mod stats;

use anyhow::Result;
use dicomsync::indexer::IndexerConfig;
use error::HelpfulError;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "dicomsync.toml";

/// `<home>/dicomsync.toml`
pub fn default_config_path() -> PathBuf {
    dicomsync_logging::dicomsync_home()
        .map(|home| home.join(CONFIG_FILE_NAME))
        .unwrap_or_else(|_| PathBuf::from(CONFIG_FILE_NAME))
}

/// Read the configuration, turning the common failures into advice.
pub fn load_config(path: &Path) -> Result<IndexerConfig> {
    if !path.exists() {
        return Err(HelpfulError::config_not_found(path).into());
    }
    IndexerConfig::load(path).map_err(|e| HelpfulError::invalid_config(path, e).into())
}
