//! `dicomsync scan`: one pass over the watched folders.

use anyhow::{Context, Result};
use dicomsync::indexer::{Plugin, ScanCancelToken, ScanConfig, Scanner};
use std::path::PathBuf;

pub struct ScanArgs {
    pub config_path: PathBuf,
    pub json: bool,
}

pub fn run(args: ScanArgs) -> Result<()> {
    let config = super::load_config(&args.config_path)?;
    if config.indexer.folders.is_empty() {
        anyhow::bail!("No folders to scan: set [indexer] folders in {}", args.config_path.display());
    }
    let plugin = Plugin::initialize(&config).context("Failed to initialize indexer")?;

    let mut scanner = Scanner::new(
        plugin.coordinator().clone(),
        ScanConfig {
            roots: config.indexer.folders.clone(),
            interval: config.scan_interval(),
        },
    );
    let stats = scanner.run_pass(&ScanCancelToken::new());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Scanned {} directories in {:.2}s", stats.dirs_scanned, stats.duration.as_secs_f64());
    println!("  files:     {}", stats.files_seen);
    println!("  new:       {}", stats.files_new);
    println!("  changed:   {}", stats.files_changed);
    println!("  unchanged: {}", stats.files_unchanged);
    if stats.dirs_skipped > 0 {
        println!("  unreadable directories: {}", stats.dirs_skipped);
    }
    if stats.deletions_pending > 0 {
        println!(
            "  missing:   {} (confirmed on the next pass)",
            stats.deletions_pending
        );
    }
    if stats.deletions_confirmed > 0 {
        println!("  deleted:   {}", stats.deletions_confirmed);
    }
    if stats.errors > 0 {
        println!("  errors:    {} (see log)", stats.errors);
    }
    Ok(())
}
