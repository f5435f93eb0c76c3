//! Logging setup for dicomsync binaries.
//!
//! Events go to a size-rotated file under `<home>/logs` and to stderr.
//! `RUST_LOG` overrides the default filter for both.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "dicomsync=info,dicomsync_db=info,dicomsync_storage=info";
const HOME_ENV: &str = "DICOMSYNC_HOME";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Mirror the file filter on stderr (otherwise stderr shows `info` and up)
    pub verbose: bool,
    /// Only warnings on stderr, for machine-readable command output
    pub quiet: bool,
    /// Override for the log directory; defaults to `<home>/logs`
    pub log_dir: Option<PathBuf>,
}

/// Install the global tracing subscriber.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = match config.log_dir {
        Some(dir) => dir,
        None => logs_dir()?,
    };
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create logs directory: {}", log_dir.display()))?;
    let file_writer = SharedRollingWriter::open(&log_dir, config.app_name)?;

    let file_filter = default_filter();
    let console_filter = if config.quiet {
        EnvFilter::new("warn")
    } else if config.verbose {
        default_filter()
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// dicomsync home: `$DICOMSYNC_HOME`, else `~/.dicomsync`.
pub fn dicomsync_home() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var(HOME_ENV) {
        return Ok(PathBuf::from(override_path));
    }
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".dicomsync"))
}

pub fn logs_dir() -> Result<PathBuf> {
    Ok(dicomsync_home()?.join("logs"))
}

// ============================================================================
// Rolling file writer
// ============================================================================

/// Appends to `<name>.log`; when a write would exceed the size cap the
/// current file becomes `<name>.log.1`, older ones shift up, and the oldest
/// beyond `max_files` is dropped.
struct RollingFile {
    dir: PathBuf,
    stem: String,
    max_files: usize,
    max_size: u64,
    file: Option<File>,
    written: u64,
}

impl RollingFile {
    fn open(dir: &Path, name: &str, max_files: usize, max_size: u64) -> io::Result<Self> {
        let mut rolling = Self {
            dir: dir.to_path_buf(),
            stem: sanitize_name(name),
            max_files: max_files.max(1),
            max_size,
            file: None,
            written: 0,
        };
        rolling.reopen()?;
        if rolling.written > rolling.max_size {
            rolling.roll()?;
        }
        Ok(rolling)
    }

    fn path(&self, generation: usize) -> PathBuf {
        if generation == 0 {
            self.dir.join(format!("{}.log", self.stem))
        } else {
            self.dir.join(format!("{}.log.{}", self.stem, generation))
        }
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(0))?;
        self.written = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    fn roll(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }
        let last = self.max_files - 1;
        if last == 0 {
            fs::remove_file(self.path(0)).or_else(ignore_missing)?;
            return self.reopen();
        }
        fs::remove_file(self.path(last)).or_else(ignore_missing)?;
        for generation in (0..last).rev() {
            let from = self.path(generation);
            if from.exists() {
                fs::rename(&from, self.path(generation + 1))?;
            }
        }
        self.reopen()
    }
}

fn ignore_missing(err: io::Error) -> io::Result<()> {
    if err.kind() == io::ErrorKind::NotFound {
        Ok(())
    } else {
        Err(err)
    }
}

impl Write for RollingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_size {
            self.roll()?;
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
struct SharedRollingWriter(Arc<Mutex<RollingFile>>);

impl SharedRollingWriter {
    fn open(dir: &Path, name: &str) -> Result<Self> {
        let rolling = RollingFile::open(dir, name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
            .with_context(|| format!("Failed to open log file for {}", name))?;
        Ok(Self(Arc::new(Mutex::new(rolling))))
    }

    fn with<R>(&self, f: impl FnOnce(&mut RollingFile) -> io::Result<R>) -> io::Result<R> {
        let mut guard = self
            .0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        f(&mut guard)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedRollingWriter {
    type Writer = SharedRollingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for SharedRollingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with(|file| file.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with(|file| file.flush())
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}
