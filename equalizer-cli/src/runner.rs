//! Runs one pipeline request on a worker thread while the main thread draws
//! progress.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use equalizer_core::{EqualizerConfig, Request};
use equalizer_sync::{pipeline, Event, Outcome, Output, SyncError};

pub fn execute(
    request: Request,
    config: &EqualizerConfig,
    quiet: bool,
) -> Result<Output, SyncError> {
    let operation = request.operation();
    let (tx, rx) = mpsc::channel();
    let worker = pipeline::spawn(request, config.clone(), Arc::new(tx));

    let bar = progress_bar(quiet);
    bar.set_prefix(operation.to_string());
    for event in rx {
        match event {
            Event::Progress { percent, item } => {
                bar.set_position(u64::from(percent));
                bar.set_message(item);
            }
            Event::Status(message) => {
                if !quiet {
                    bar.println(message);
                }
            }
            Event::Finished(Outcome::Success(_)) => bar.finish_and_clear(),
            Event::Finished(Outcome::Failure(_)) => bar.abandon(),
        }
    }
    let result = worker.join();
    tracing::debug!(%operation, ok = result.is_ok(), "worker joined");
    result
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} {prefix:>9} [{wide_bar:.cyan/blue}] {pos:>3}% {msg}")
    {
        bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
