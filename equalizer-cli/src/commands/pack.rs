//! `equalizer pack`: package the plan's additions from the target tree.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use equalizer_core::{files, Operation, SyncSession};
use equalizer_sync::{Output, PackOutcome};

use super::{print_skipped, unexpected};
use crate::{runner, Global};

/// Arguments for `equalizer pack`.
#[derive(Args, Debug)]
pub struct PackArgs {
    /// Plan produced by `equalizer diff`.
    pub plan: PathBuf,

    /// Root of the target tree the files are read from.
    pub target_root: PathBuf,

    /// Where to write the zip archive.
    #[arg(short, long, value_name = "ARCHIVE")]
    pub output: PathBuf,
}

impl PackArgs {
    pub fn run(self, global: &Global) -> Result<()> {
        let session = SyncSession {
            plan: Some(
                files::load_plan(&self.plan)
                    .with_context(|| format!("failed to load {}", self.plan.display()))?,
            ),
            target_root: Some(self.target_root.clone()),
            archive: Some(self.output.clone()),
            ..SyncSession::default()
        };
        let request = session.request(Operation::Pack)?;
        let output = runner::execute(request, &global.config, global.quiet)
            .with_context(|| format!("packaging failed for {}", self.output.display()))?;
        let Output::Packed(outcome) = output else {
            return Err(unexpected(&output));
        };

        match outcome {
            PackOutcome::NothingToPackage => {
                println!("{} nothing to package; no archive written", "✓".green().bold());
            }
            PackOutcome::Packed(report) => {
                println!(
                    "{} {} files ({} bytes) → {}",
                    "✓".green().bold(),
                    report.packed.len(),
                    report.bytes,
                    report.archive.display()
                );
                if !report.is_complete() {
                    println!(
                        "{} archive is incomplete: {} files could not be packaged",
                        "!".yellow().bold(),
                        report.skipped.len()
                    );
                    print_skipped(&report.skipped);
                }
            }
        }
        Ok(())
    }
}
