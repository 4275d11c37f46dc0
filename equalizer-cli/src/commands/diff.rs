//! `equalizer diff`: compare two snapshots and write the plan.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use equalizer_core::{files, Action, Operation, Plan, SyncSession};
use equalizer_sync::Output;

use super::unexpected;
use crate::{runner, Global};

/// Arguments for `equalizer diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Snapshot of the tree to converge to.
    pub target: PathBuf,

    /// Snapshot of the tree to be changed.
    pub current: PathBuf,

    /// Where to write the plan JSON.
    #[arg(short, long, value_name = "PLAN")]
    pub output: PathBuf,

    /// Print every plan entry.
    #[arg(long)]
    pub list: bool,
}

impl DiffArgs {
    pub fn run(self, global: &Global) -> Result<()> {
        let session = SyncSession {
            target_snapshot: Some(
                files::load_snapshot(&self.target)
                    .with_context(|| format!("failed to load {}", self.target.display()))?,
            ),
            current_snapshot: Some(
                files::load_snapshot(&self.current)
                    .with_context(|| format!("failed to load {}", self.current.display()))?,
            ),
            ..SyncSession::default()
        };
        let request = session.request(Operation::Diff)?;
        let output = runner::execute(request, &global.config, global.quiet).context("diff failed")?;
        let Output::Planned(plan) = output else {
            return Err(unexpected(&output));
        };

        files::save_plan(&self.output, &plan)
            .with_context(|| format!("failed to write {}", self.output.display()))?;

        if plan.is_empty() {
            println!("{} trees are identical; empty plan written", "✓".green().bold());
        } else {
            println!(
                "{} {} to copy, {} to move → {}",
                "✓".green().bold(),
                plan.additions().count(),
                plan.removals().count(),
                self.output.display()
            );
        }
        if self.list && !plan.is_empty() {
            print_plan(&plan);
        }
        Ok(())
    }
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "path")]
    path: String,
}

pub(crate) fn print_plan(plan: &Plan) {
    let rows: Vec<PlanRow> = plan
        .entries
        .iter()
        .map(|entry| PlanRow {
            status: match entry.action {
                Action::AddOrUpdate => "copy".green().to_string(),
                Action::Remove => "move".yellow().to_string(),
            },
            path: entry.path.clone(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
