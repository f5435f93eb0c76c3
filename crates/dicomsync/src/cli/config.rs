//! `dicomsync config`: show the resolved configuration.

use anyhow::{Context, Result};
use dicomsync::indexer::IndexerConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub struct ConfigArgs {
    pub config_path: PathBuf,
    pub init: bool,
    pub json: bool,
}

#[derive(Serialize)]
struct ResolvedConfig<'a> {
    config_file: &'a Path,
    storage_directory: &'a Path,
    content_store: &'a Path,
    database: PathBuf,
    folders: &'a [PathBuf],
    scanning: bool,
    interval_secs: u64,
    notifier_host: Option<String>,
    host_url: Option<&'a str>,
}

pub fn run(args: ConfigArgs) -> Result<()> {
    if args.init {
        let starter = IndexerConfig::default();
        let text = toml::to_string_pretty(&starter).context("Failed to render starter configuration")?;
        print!("{}", text);
        return Ok(());
    }

    let config = super::load_config(&args.config_path)?;
    let resolved = ResolvedConfig {
        config_file: &args.config_path,
        storage_directory: &config.storage_directory,
        content_store: config.index_root(),
        database: config.database_path(),
        folders: &config.indexer.folders,
        scanning: config.indexer.enable,
        interval_secs: config.indexer.interval,
        notifier_host: config.notifier_host(),
        host_url: config.host.url.as_deref(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
        return Ok(());
    }

    println!("Config file:       {}", resolved.config_file.display());
    println!("Storage directory: {}", resolved.storage_directory.display());
    println!("Content store:     {}", resolved.content_store.display());
    println!("Index database:    {}", resolved.database.display());
    println!(
        "Scanning:          {}",
        if resolved.scanning {
            format!("every {}s", resolved.interval_secs)
        } else {
            "disabled".to_string()
        }
    );
    for folder in resolved.folders {
        println!("  watch {}", folder.display());
    }
    println!(
        "Notifier host:     {}",
        resolved.notifier_host.as_deref().unwrap_or("(none)")
    );
    println!("Host URL:          {}", resolved.host_url.unwrap_or("(none)"));
    if let Err(err) = config.validate() {
        println!();
        println!("WARNING: {}", err);
    }
    Ok(())
}
