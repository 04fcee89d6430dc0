//! Dispatch options and results shared by the driver thread and the caller.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::Opts;
use crate::pool::{QueueMode, RunnerOpts};
use crate::utils::config::{ERRORS_QUEUE_CAP, QUEUE_SLOTS_PER_WORKER, WorkerThreadLimits};

/// Options for [`dispatch_records`](crate::pipeline::dispatch_records).
#[derive(Clone, Debug)]
pub struct DispatchOpts {
    /// Pool size (max tasks executing at once).
    pub threads: usize,
    pub queue: QueueMode,
    /// Errors kept in the aggregate; the rest are counted in [`DispatchOutcome::dropped_errors`].
    pub error_capacity: usize,
    /// Stop starting tasks after the first failure.
    pub fail_fast: bool,
    /// When set, the driver and the workers stop starting new work once it is true.
    pub cancel_check: Option<Arc<AtomicBool>>,
}

impl DispatchOpts {
    pub fn with_threads(threads: usize) -> Self {
        let threads = threads.max(1);
        Self {
            threads,
            queue: QueueMode::Bounded(threads * QUEUE_SLOTS_PER_WORKER),
            error_capacity: ERRORS_QUEUE_CAP,
            fail_fast: false,
            cancel_check: None,
        }
    }

    pub(crate) fn runner_opts(&self) -> RunnerOpts {
        RunnerOpts {
            workers: self.threads.max(1),
            queue: self.queue,
            fail_fast: self.fail_fast,
        }
    }
}

impl Default for DispatchOpts {
    fn default() -> Self {
        Self::with_threads(WorkerThreadLimits::current().default_workers())
    }
}

impl From<&Opts> for DispatchOpts {
    fn from(o: &Opts) -> Self {
        let threads = o
            .threads
            .unwrap_or_else(|| WorkerThreadLimits::current().default_workers())
            .max(1);
        DispatchOpts {
            threads,
            queue: if o.unbounded_queue {
                QueueMode::Unbounded
            } else {
                QueueMode::Bounded(threads * QUEUE_SLOTS_PER_WORKER)
            },
            error_capacity: o.error_capacity,
            fail_fast: o.fail_fast,
            cancel_check: None,
        }
    }
}

/// Result of one dispatch run.
///
/// `success + failure` equals the number of records in the file when the stream was read
/// cleanly. When `error` is set because the stream itself failed, `failure` only covers records
/// that were read before the failure.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub success: usize,
    pub failure: usize,
    /// Aggregate of task, conversion and stream errors (see [`ErrorsQueue::take_error`](crate::pool::ErrorsQueue::take_error)).
    pub error: Option<anyhow::Error>,
    /// Errors discarded because the aggregate was full.
    pub dropped_errors: usize,
    /// Tasks dequeued after cancellation and never run (included in `failure`).
    pub skipped: usize,
    /// Records successfully attributed to each worker slot.
    pub per_worker: Vec<usize>,
}

impl DispatchOutcome {
    pub fn total(&self) -> usize {
        self.success + self.failure
    }

    /// Collapse into the `(success, failure, error)` triple.
    pub fn into_parts(self) -> (usize, usize, Option<anyhow::Error>) {
        (self.success, self.failure, self.error)
    }
}
