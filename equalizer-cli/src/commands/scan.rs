//! `equalizer scan`: hash a directory tree into a snapshot file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use equalizer_core::{files, Operation, SyncSession};
use equalizer_sync::Output;

use super::{print_skipped, unexpected};
use crate::{runner, Global};

/// Arguments for `equalizer scan`.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Directory to snapshot.
    pub root: PathBuf,

    /// Where to write the snapshot JSON.
    #[arg(short, long, value_name = "SNAPSHOT")]
    pub output: PathBuf,
}

impl ScanArgs {
    pub fn run(self, global: &Global) -> Result<()> {
        let session = SyncSession {
            scan_root: Some(self.root.clone()),
            ..SyncSession::default()
        };
        let request = session.request(Operation::Scan)?;
        let output = runner::execute(request, &global.config, global.quiet)
            .with_context(|| format!("scan failed for {}", self.root.display()))?;
        let Output::Scanned(report) = output else {
            return Err(unexpected(&output));
        };

        files::save_snapshot(&self.output, &report.snapshot)
            .with_context(|| format!("failed to write {}", self.output.display()))?;

        println!(
            "{} {} files recorded → {}",
            "✓".green().bold(),
            report.snapshot.len(),
            self.output.display()
        );
        if !report.skipped.is_empty() {
            println!(
                "{} {} entries skipped",
                "!".yellow().bold(),
                report.skipped.len()
            );
            if !global.quiet {
                print_skipped(&report.skipped);
            }
        }
        Ok(())
    }
}
