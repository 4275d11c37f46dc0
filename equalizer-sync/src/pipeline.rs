//! Shared operation entrypoint used by front ends.
//!
//! [`run`] executes one [`Request`] on the calling thread; [`spawn`] runs it
//! on a worker thread so an interactive caller stays responsive. Either way
//! the observer receives exactly one terminal [`Event::Finished`].

use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::Serialize;

use equalizer_core::{EqualizerConfig, Operation, Plan, Request, SkippedItem, Snapshot};

use crate::diff::diff;
use crate::equalize::{equalize, EqualizeOptions, EqualizeReport};
use crate::error::SyncError;
use crate::pack::{pack, PackOptions, PackOutcome};
use crate::progress::{Event, Observer, Outcome};
use crate::scan::{scan, ScanOptions, ScanReport};

/// Comparison of a live tree against a target snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    /// What equalizing would still have to do; empty when the trees match.
    pub plan: Plan,
    /// Files in the live tree that could not be hashed.
    pub skipped: Vec<SkippedItem>,
}

impl VerifyReport {
    pub fn is_equal(&self) -> bool {
        self.plan.is_empty() && self.skipped.is_empty()
    }
}

/// Result of one pipeline operation.
#[derive(Debug, Clone)]
pub enum Output {
    Scanned(ScanReport),
    Planned(Plan),
    Packed(PackOutcome),
    Equalized(EqualizeReport),
    Verified(VerifyReport),
}

impl Output {
    /// One-line human summary, used for the terminal success event.
    pub fn summary(&self) -> String {
        match self {
            Output::Scanned(report) => format!(
                "{} files recorded, {} skipped",
                report.snapshot.len(),
                report.skipped.len()
            ),
            Output::Planned(plan) => plan_summary(plan),
            Output::Packed(PackOutcome::NothingToPackage) => "nothing to package".to_string(),
            Output::Packed(PackOutcome::Packed(report)) => format!(
                "{} files packaged, {} skipped",
                report.packed.len(),
                report.skipped.len()
            ),
            Output::Equalized(report) => report.summary(),
            Output::Verified(report) if report.is_equal() => "trees are identical".to_string(),
            Output::Verified(report) => format!(
                "trees differ: {}, {} unreadable",
                plan_summary(&report.plan),
                report.skipped.len()
            ),
        }
    }
}

fn plan_summary(plan: &Plan) -> String {
    format!(
        "{} to copy, {} to move",
        plan.additions().count(),
        plan.removals().count()
    )
}

/// Scan `current_root` with the target snapshot's algorithm and diff.
pub fn verify(
    target: &Snapshot,
    current_root: &Path,
    options: &ScanOptions,
    observer: &dyn Observer,
) -> Result<VerifyReport, SyncError> {
    let options = ScanOptions {
        algorithm: target.algorithm.unwrap_or(options.algorithm),
        ..options.clone()
    };
    let scanned = scan(current_root, &options, observer)?;
    let plan = diff(target, &scanned.snapshot)?;
    Ok(VerifyReport {
        plan,
        skipped: scanned.skipped,
    })
}

/// Run `request` to completion on the calling thread.
pub fn run(
    request: Request,
    config: &EqualizerConfig,
    observer: &dyn Observer,
) -> Result<Output, SyncError> {
    let operation = request.operation();
    tracing::debug!(%operation, "starting");
    let result = execute(request, config, observer);
    let outcome = match &result {
        Ok(output) => Outcome::Success(output.summary()),
        Err(err) => {
            tracing::error!(%operation, error = %err, "operation failed");
            Outcome::Failure(err.to_string())
        }
    };
    observer.notify(Event::Finished(outcome));
    result
}

fn execute(
    request: Request,
    config: &EqualizerConfig,
    observer: &dyn Observer,
) -> Result<Output, SyncError> {
    config.validate()?;
    match request {
        Request::Scan { root } => scan(&root, &ScanOptions::from(config), observer).map(Output::Scanned),
        Request::Diff { target, current } => diff(&target, &current).map(Output::Planned),
        Request::Pack {
            plan,
            target_root,
            archive,
        } => pack(
            &plan,
            &target_root,
            &archive,
            &PackOptions::from(config),
            observer,
        )
        .map(Output::Packed),
        Request::Equalize {
            plan,
            current_root,
            archive,
            dry_run,
        } => {
            let options = EqualizeOptions {
                dry_run,
                ..EqualizeOptions::from(config)
            };
            equalize(
                &plan,
                archive.as_deref(),
                &current_root,
                &options,
                observer,
            )
            .map(Output::Equalized)
        }
        Request::Verify {
            target,
            current_root,
        } => verify(&target, &current_root, &ScanOptions::from(config), observer)
            .map(Output::Verified),
    }
}

/// An operation running on its own thread.
pub struct Worker {
    operation: Operation,
    handle: JoinHandle<Result<Output, SyncError>>,
}

impl Worker {
    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the operation. A panic on the worker becomes
    /// [`SyncError::WorkerPanicked`].
    pub fn join(self) -> Result<Output, SyncError> {
        self.handle
            .join()
            .unwrap_or_else(|_| {
                Err(SyncError::WorkerPanicked {
                    operation: self.operation.to_string(),
                })
            })
    }
}

/// Run `request` on a new thread, reporting to `observer`.
pub fn spawn(request: Request, config: EqualizerConfig, observer: Arc<dyn Observer>) -> Worker {
    let operation = request.operation();
    let handle = thread::spawn(move || run(request, &config, observer.as_ref()));
    Worker { operation, handle }
}
