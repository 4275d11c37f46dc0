//! One-way progress and status notifications.
//!
//! Operations report to an [`Observer`]. Reporting never fails and never
//! blocks the operation: a channel observer whose receiver is gone simply
//! drops events.

use std::sync::mpsc::Sender;

/// Terminal result of an operation as seen by an observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(String),
    Failure(String),
}

/// A notification emitted while an operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `percent` is in `0..=100`; `item` describes what is being processed.
    Progress { percent: u8, item: String },
    /// A noteworthy condition that does not fail the operation.
    Status(String),
    /// Emitted exactly once, last.
    Finished(Outcome),
}

pub trait Observer: Send + Sync {
    fn notify(&self, event: Event);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn notify(&self, _event: Event) {}
}

impl Observer for Sender<Event> {
    fn notify(&self, event: Event) {
        let _ = self.send(event);
    }
}

/// Adapts a closure into an observer.
pub struct FnObserver<F>(pub F);

impl<F> Observer for FnObserver<F>
where
    F: Fn(Event) + Send + Sync,
{
    fn notify(&self, event: Event) {
        (self.0)(event)
    }
}

/// `done / total` as a whole percentage. An empty batch is complete.
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}

pub(crate) fn progress(observer: &dyn Observer, done: usize, total: usize, item: &str) {
    observer.notify(Event::Progress {
        percent: percent(done, total),
        item: item.to_string(),
    });
}

pub(crate) fn status(observer: &dyn Observer, message: impl Into<String>) {
    observer.notify(Event::Status(message.into()));
}
