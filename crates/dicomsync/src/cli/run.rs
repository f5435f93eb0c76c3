//! `dicomsync run`: activate the indexer and scan until signalled.

use anyhow::{Context, Result};
use dicomsync::indexer::{HostEvent, Plugin};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

pub struct RunArgs {
    pub config_path: PathBuf,
}

pub fn run(args: RunArgs) -> Result<()> {
    let config = super::load_config(&args.config_path)?;
    let plugin = Plugin::initialize(&config).context("Failed to initialize indexer")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    install_shutdown_handler(Arc::clone(&shutdown))?;

    plugin
        .on_host_state_change(HostEvent::Started)
        .context("Failed to start scanner")?;
    info!(config = %args.config_path.display(), "dicomsync running, press Ctrl+C to stop");

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(SHUTDOWN_POLL);
    }

    plugin
        .on_host_state_change(HostEvent::Stopped)
        .context("Failed to stop scanner")?;
    info!("dicomsync stopped");
    Ok(())
}

#[cfg(unix)]
fn install_shutdown_handler(flag: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("Received signal {}, shutting down...", sig);
            flag.store(true, Ordering::SeqCst);
        }
    });
    Ok(())
}

#[cfg(windows)]
fn install_shutdown_handler(flag: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down...");
        flag.store(true, Ordering::SeqCst);
    })?;
    Ok(())
}
