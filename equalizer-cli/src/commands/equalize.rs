//! `equalizer equalize`: apply a plan to the current tree.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use equalizer_core::{files, Operation, SyncSession, QUARANTINE_DIR};
use equalizer_sync::{AdditionResult, EqualizeReport, Output, RemovalResult, SyncError};

use super::unexpected;
use crate::{runner, Global};

/// Arguments for `equalizer equalize`.
#[derive(Args, Debug)]
pub struct EqualizeArgs {
    /// Plan produced by `equalizer diff`.
    pub plan: PathBuf,

    /// Root of the tree to bring in line with the target.
    pub current_root: PathBuf,

    /// Archive produced by `equalizer pack`. Required when the plan copies files.
    #[arg(long, value_name = "ARCHIVE")]
    pub archive: Option<PathBuf>,

    /// Report what would change without touching the tree.
    #[arg(long)]
    pub dry_run: bool,

    /// Fail when a planned addition is missing from the archive.
    #[arg(long)]
    pub strict: bool,
}

impl EqualizeArgs {
    pub fn run(self, global: &Global) -> Result<()> {
        let session = SyncSession {
            plan: Some(
                files::load_plan(&self.plan)
                    .with_context(|| format!("failed to load {}", self.plan.display()))?,
            ),
            current_root: Some(self.current_root.clone()),
            archive: self.archive.clone(),
            dry_run: self.dry_run,
            ..SyncSession::default()
        };
        let request = session.request(Operation::Equalize)?;

        let report = match runner::execute(request, &global.config, global.quiet) {
            Ok(Output::Equalized(report)) => report,
            Ok(other) => return Err(unexpected(&other)),
            Err(SyncError::Equalize { failures, report }) => {
                print_report(&report, global.quiet);
                for failure in &failures {
                    eprintln!("{} {failure}", "✗".red().bold());
                }
                bail!(
                    "equalize of {} incomplete: {} step(s) failed",
                    self.current_root.display(),
                    failures.len()
                );
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("equalize failed for {}", self.current_root.display())
                })
            }
        };

        print_report(&report, global.quiet);
        if self.strict && !report.is_synchronized() {
            bail!(
                "{} planned files were missing from the archive",
                report.missing_from_archive.len()
            );
        }
        Ok(())
    }
}

fn print_report(report: &EqualizeReport, quiet: bool) {
    let mark = if report.is_synchronized() {
        "✓".green().bold()
    } else {
        "!".yellow().bold()
    };
    println!("{mark} {}", report.summary());

    if !quiet {
        for addition in &report.additions {
            match addition {
                AdditionResult::Written { path } => println!("  ✎  {path}"),
                AdditionResult::WouldWrite { path } => println!("  ~  {path}"),
                AdditionResult::Unchanged { path } => println!("  ·  {path}"),
            }
        }
        for removal in &report.removals {
            match removal {
                RemovalResult::Quarantined { path, destination }
                | RemovalResult::WouldQuarantine { path, destination } => {
                    println!("  →  {path} ⇒ {destination}")
                }
                RemovalResult::AlreadyAbsent { path } => println!("  ·  {path} (absent)"),
            }
        }
    }
    for path in &report.missing_from_archive {
        println!("  {}  {path} (missing from archive)", "!".yellow().bold());
    }
    for path in &report.not_applied {
        println!("  {}  {path} (not applied)", "✗".red().bold());
    }
    for name in &report.ignored_entries {
        println!("  {}  {name} (not in plan, ignored)", "?".bright_black());
    }
    if report.moved() > 0 && !report.dry_run {
        println!("Removed files were moved to {QUARANTINE_DIR}/.");
    }
}
