//! Equalizer: directory-tree reconciliation CLI.
//!
//! # Usage
//!
//! ```text
//! equalizer scan <root> -o <snapshot.json>
//! equalizer diff <target.json> <current.json> -o <plan.json> [--list]
//! equalizer pack <plan.json> <target-root> -o <payload.zip>
//! equalizer equalize <plan.json> <current-root> [--archive <payload.zip>] [--dry-run] [--strict]
//! equalizer verify <target.json> <current-root> [--json]
//! equalizer config show|path
//! ```

mod commands;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand, diff::DiffArgs, equalize::EqualizeArgs, pack::PackArgs,
    scan::ScanArgs, verify::VerifyArgs,
};
use equalizer_core::{config, EqualizerConfig};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "equalizer",
    version,
    about = "Bring a directory tree in line with a target tree",
    long_about = None,
)]
struct Cli {
    /// Config file to use instead of ~/.equalizer/config.yaml.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Suppress the progress bar and per-file listings.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Hash every file under a directory into a snapshot.
    Scan(ScanArgs),

    /// Compare a target and a current snapshot and write the plan.
    Diff(DiffArgs),

    /// Package the files a plan adds or updates into a zip archive.
    Pack(PackArgs),

    /// Apply a plan to the current tree.
    Equalize(EqualizeArgs),

    /// Check a live tree against a target snapshot.
    Verify(VerifyArgs),

    /// Inspect the effective configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Settings shared by every subcommand.
#[derive(Debug)]
pub struct Global {
    pub config: EqualizerConfig,
    /// Where `config` came from, whether or not the file exists.
    pub config_path: PathBuf,
    pub quiet: bool,
}

impl Global {
    fn load(explicit: Option<PathBuf>, quiet: bool) -> Result<Self> {
        let (config, config_path) = match explicit {
            Some(path) => {
                let config = config::load_from(&path)
                    .with_context(|| format!("failed to load config {}", path.display()))?;
                (config, path)
            }
            None => {
                let path = config::config_path().context("could not determine home directory")?;
                let config = config::load().context("failed to load config")?;
                (config, path)
            }
        };
        Ok(Self {
            config,
            config_path,
            quiet,
        })
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let global = Global::load(cli.config, cli.quiet)?;

    match cli.command {
        Commands::Scan(args) => args.run(&global).map(|()| ExitCode::SUCCESS),
        Commands::Diff(args) => args.run(&global).map(|()| ExitCode::SUCCESS),
        Commands::Pack(args) => args.run(&global).map(|()| ExitCode::SUCCESS),
        Commands::Equalize(args) => args.run(&global).map(|()| ExitCode::SUCCESS),
        Commands::Verify(args) => args.run(&global),
        Commands::Config { command } => {
            commands::config::run(command, &global).map(|()| ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
