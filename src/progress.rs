//! Batch progress reporting.
//!
//! Implement [`BatchProgress`] to receive lifecycle events while a batch
//! runs. Every method has a no-op default, so implementors override only
//! what they surface. Callbacks are invoked from the batch driver's task;
//! keep them fast and never panic in them.

use std::path::Path;

use crate::batch::BatchSummary;
use crate::job::JobResult;

pub trait BatchProgress: Send + Sync {
    /// The batch is about to start over `total` files.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Work on one source file is starting.
    fn on_file_start(&self, source: &Path, index: usize, total: usize) {
        let _ = (source, index, total);
    }

    /// Free-form status line, e.g. the step currently running.
    fn on_status(&self, message: &str) {
        let _ = message;
    }

    /// One file finished, successfully or not.
    fn on_file_complete(&self, result: &JobResult) {
        let _ = result;
    }

    /// Fired after every file regardless of outcome.
    fn on_progress(&self, done: usize, total: usize) {
        let _ = (done, total);
    }

    fn on_batch_complete(&self, summary: &BatchSummary) {
        let _ = summary;
    }
}

/// Discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl BatchProgress for NoopProgress {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProgress {
        files: AtomicUsize,
    }

    impl BatchProgress for CountingProgress {
        fn on_file_complete(&self, _result: &JobResult) {
            self.files.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn default_methods_are_noops() {
        let progress = CountingProgress {
            files: AtomicUsize::new(0),
        };
        progress.on_batch_start(3);
        progress.on_status("working");
        progress.on_progress(1, 3);
        assert_eq!(progress.files.load(Ordering::SeqCst), 0);
    }
}
