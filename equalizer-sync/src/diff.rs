//! Snapshot comparison.
//!
//! Produces the [`Plan`] that turns the current tree into the target tree.
//! Additions come first in target order, removals after in current order.

use std::collections::{HashMap, HashSet};

use equalizer_core::{Plan, PlanEntry, Snapshot};

use crate::error::{Side, SyncError};

/// Compute the plan that brings `current` in line with `target`.
///
/// Fails on malformed input: a duplicate or unsafe path in either snapshot,
/// or snapshots hashed with different algorithms.
pub fn diff(target: &Snapshot, current: &Snapshot) -> Result<Plan, SyncError> {
    target
        .validate()
        .map_err(|source| SyncError::InvalidSnapshot {
            side: Side::Target,
            source,
        })?;
    current
        .validate()
        .map_err(|source| SyncError::InvalidSnapshot {
            side: Side::Current,
            source,
        })?;
    if target.algorithm != current.algorithm {
        return Err(SyncError::AlgorithmMismatch {
            target: target.algorithm,
            current: current.algorithm,
        });
    }

    let current_digests: HashMap<&str, &str> = current
        .files
        .iter()
        .map(|f| (f.path.as_str(), f.digest.as_str()))
        .collect();

    let mut entries = Vec::new();
    for record in &target.files {
        match current_digests.get(record.path.as_str()) {
            Some(digest) if digest.eq_ignore_ascii_case(&record.digest) => {}
            _ => entries.push(PlanEntry::add_or_update(record.path.clone())),
        }
    }

    let target_paths: HashSet<&str> = target.files.iter().map(|f| f.path.as_str()).collect();
    for record in &current.files {
        if !target_paths.contains(record.path.as_str()) {
            entries.push(PlanEntry::remove(record.path.clone()));
        }
    }

    let plan = Plan::new(entries);
    tracing::info!(
        additions = plan.additions().count(),
        removals = plan.removals().count(),
        "diff complete"
    );
    Ok(plan)
}
