//! dicomsync launcher
//!
//! - `run`: activate the indexer and keep scanning until SIGINT/SIGTERM
//! - `scan`: a single pass over the watched folders
//! - `config`: show the resolved configuration
//! - `stats`: index row counts

use clap::{Parser, Subcommand};
use dicomsync_logging::LogConfig;
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "dicomsync", about = "Folder indexer and storage area for a DICOM archive")]
struct Cli {
    /// Enable verbose logging (debug to stderr when RUST_LOG allows it)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Configuration file
    #[arg(long, global = true, env = "DICOMSYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Activate the indexer and scan until interrupted
    Run,

    /// Run one scan pass and report what changed
    Scan {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the resolved configuration
    Config {
        /// Print a starter configuration instead
        #[arg(long)]
        init: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn command_wants_json(command: &Commands) -> bool {
    match command {
        Commands::Scan { json } => *json,
        Commands::Config { json, init } => *json || *init,
        Commands::Stats { json } => *json,
        Commands::Run => false,
    }
}

fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.unwrap_or_else(cli::default_config_path);
    match cli.command {
        Commands::Run => cli::run::run(cli::run::RunArgs { config_path }),
        Commands::Scan { json } => cli::scan::run(cli::scan::ScanArgs { config_path, json }),
        Commands::Config { init, json } => cli::config::run(cli::config::ConfigArgs {
            config_path,
            init,
            json,
        }),
        Commands::Stats { json } => cli::stats::run(cli::stats::StatsArgs { config_path, json }),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = dicomsync_logging::init_logging(LogConfig {
        app_name: "dicomsync",
        verbose: cli.verbose,
        quiet: command_wants_json(&cli.command),
        log_dir: None,
    }) {
        eprintln!("Warning: logging unavailable: {:#}", err);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
