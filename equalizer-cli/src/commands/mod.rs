pub mod config;
pub mod diff;
pub mod equalize;
pub mod pack;
pub mod scan;
pub mod verify;

use anyhow::anyhow;
use colored::Colorize;

use equalizer_core::SkippedItem;
use equalizer_sync::Output;

/// Error for a pipeline result that does not match the request kind.
pub(crate) fn unexpected(output: &Output) -> anyhow::Error {
    anyhow!("pipeline returned an unexpected result: {}", output.summary())
}

pub(crate) fn print_skipped(skipped: &[SkippedItem]) {
    for item in skipped {
        println!("  {}  {} ({})", "!".yellow().bold(), item.path, item.reason);
    }
}
