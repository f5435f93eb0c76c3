//! `dicomsync stats`: row counts of the index.

use anyhow::{Context, Result};
use dicomsync_db::{Index, SqliteIndex};
use std::path::PathBuf;

pub struct StatsArgs {
    pub config_path: PathBuf,
    pub json: bool,
}

pub fn run(args: StatsArgs) -> Result<()> {
    let config = super::load_config(&args.config_path)?;
    let database = config.database_path();
    if !database.exists() {
        anyhow::bail!(
            "No index at {} yet. Run `dicomsync scan` or `dicomsync run` first.",
            database.display()
        );
    }
    let index = SqliteIndex::open(&database)
        .with_context(|| format!("Failed to open index: {}", database.display()))?;
    let stats = index.stats().context("Failed to read index statistics")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Index:        {}", database.display());
        println!("Files:        {}", stats.files);
        println!("DICOM files:  {}", stats.dicom_files);
        println!("Attachments:  {}", stats.attachments);
    }
    Ok(())
}
