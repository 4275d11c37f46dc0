//! `equalizer verify`: check a live tree against a target snapshot.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use equalizer_core::{files, Operation, SyncSession};
use equalizer_sync::{Output, VerifyReport};

use super::{diff::print_plan, print_skipped, unexpected};
use crate::{runner, Global};

/// Arguments for `equalizer verify`.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Snapshot of the tree the current tree should match.
    pub target: PathBuf,

    /// Root of the live tree.
    pub current_root: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct VerifyJson<'a> {
    equal: bool,
    #[serde(flatten)]
    report: &'a VerifyReport,
}

impl VerifyArgs {
    /// Exit status 1 when the trees differ.
    pub fn run(self, global: &Global) -> Result<ExitCode> {
        let session = SyncSession {
            target_snapshot: Some(
                files::load_snapshot(&self.target)
                    .with_context(|| format!("failed to load {}", self.target.display()))?,
            ),
            current_root: Some(self.current_root.clone()),
            ..SyncSession::default()
        };
        let request = session.request(Operation::Verify)?;
        let quiet = global.quiet || self.json;
        let output = runner::execute(request, &global.config, quiet)
            .with_context(|| format!("verify failed for {}", self.current_root.display()))?;
        let Output::Verified(report) = output else {
            return Err(unexpected(&output));
        };

        let equal = report.is_equal();
        if self.json {
            let payload = VerifyJson {
                equal,
                report: &report,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize verify JSON")?
            );
        } else if equal {
            println!(
                "{} {} matches {}",
                "✓".green().bold(),
                self.current_root.display(),
                self.target.display()
            );
        } else {
            println!(
                "{} {} differs: {} to copy, {} to move, {} unreadable",
                "✗".red().bold(),
                self.current_root.display(),
                report.plan.additions().count(),
                report.plan.removals().count(),
                report.skipped.len()
            );
            if !global.quiet {
                if !report.plan.is_empty() {
                    print_plan(&report.plan);
                }
                print_skipped(&report.skipped);
            }
        }

        Ok(if equal {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}
