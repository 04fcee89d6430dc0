//! Fixed-size worker pool fed through a shared FIFO queue.

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use log::{debug, error, warn};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crate::errors::RunnerError;
use crate::utils::config::{PackagePaths, QUEUE_SLOTS_PER_WORKER, WorkerThreadLimits};

/// One unit of work. The argument is the worker identity (`0..workers`).
pub type Task = Box<dyn FnOnce(usize) -> anyhow::Result<()> + Send>;

type OnError = Box<dyn FnOnce(anyhow::Error) + Send>;

struct QueuedTask {
    task: Task,
    on_error: OnError,
}

/// How submission behaves once workers fall behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueMode {
    /// Producers block once this many tasks are queued and not yet picked up.
    Bounded(usize),
    /// Producers never block; queued tasks are limited only by memory.
    Unbounded,
}

#[derive(Clone, Copy, Debug)]
pub struct RunnerOpts {
    pub workers: usize,
    pub queue: QueueMode,
    /// Cancel the runner on the first task error; queued tasks are skipped.
    pub fail_fast: bool,
}

impl RunnerOpts {
    /// `workers` workers (min 1) with a bounded queue of [`QUEUE_SLOTS_PER_WORKER`] per worker.
    pub fn with_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            queue: QueueMode::Bounded(workers * QUEUE_SLOTS_PER_WORKER),
            fail_fast: false,
        }
    }
}

impl Default for RunnerOpts {
    fn default() -> Self {
        Self::with_workers(WorkerThreadLimits::current().default_workers())
    }
}

/// Counts for one [`BoundedRunner::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub submitted: usize,
    pub completed: usize,
    pub failed: usize,
    /// Dequeued after cancellation and never executed.
    pub skipped: usize,
    pub panicked_workers: usize,
}

/// Producer/consumer runner: any thread submits with [`add_task_with_error`](Self::add_task_with_error),
/// one thread blocks in [`run`](Self::run) while `workers` threads execute tasks, and
/// [`done`](Self::done) lets `run` return once the queue drains.
///
/// At most `workers` tasks execute at once. Errors go to the per-task callback and never stop
/// sibling tasks unless `fail_fast` is set. A panicking task is reported as a task error and its
/// worker keeps going.
pub struct BoundedRunner {
    workers: usize,
    fail_fast: bool,
    sender: Mutex<Option<Sender<QueuedTask>>>,
    receiver: Receiver<QueuedTask>,
    cancelled: Arc<AtomicBool>,
    submitted: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

impl BoundedRunner {
    pub fn new(opts: RunnerOpts) -> Self {
        let (tx, rx) = match opts.queue {
            QueueMode::Bounded(cap) => bounded(cap),
            QueueMode::Unbounded => unbounded(),
        };
        Self {
            workers: opts.workers.max(1),
            fail_fast: opts.fail_fast,
            sender: Mutex::new(Some(tx)),
            receiver: rx,
            cancelled: Arc::new(AtomicBool::new(false)),
            submitted: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        }
    }

    /// Share an external cancel flag (e.g. set from a Ctrl+C handler).
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = flag;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Enqueue `task`; `on_error` receives its error. Blocks while a bounded queue is full.
    pub fn add_task_with_error<F, E>(&self, task: F, on_error: E) -> Result<(), RunnerError>
    where
        F: FnOnce(usize) -> anyhow::Result<()> + Send + 'static,
        E: FnOnce(anyhow::Error) + Send + 'static,
    {
        if self.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }
        // Clone so a blocking send does not hold the lock `done` needs.
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(RunnerError::Closed)?;
        sender
            .send(QueuedTask {
                task: Box::new(task),
                on_error: Box::new(on_error),
            })
            .map_err(|_| RunnerError::Closed)?;
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Enqueue `task`; its error is logged.
    pub fn add_task<F>(&self, task: F) -> Result<(), RunnerError>
    where
        F: FnOnce(usize) -> anyhow::Result<()> + Send + 'static,
    {
        self.add_task_with_error(task, |err| warn!("task failed: {:#}", err))
    }

    /// No more tasks will be submitted. Idempotent.
    pub fn done(&self) {
        if self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            debug!("runner: submissions closed");
        }
    }

    /// Stop starting tasks. Queued tasks are drained as skipped and new submissions are rejected.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::Relaxed) {
            debug!("runner: cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Run the workers and block until [`done`](Self::done) was called and every submitted task
    /// has finished (or been skipped).
    pub fn run(&self) -> RunSummary {
        let panicked_workers = thread::scope(|s| {
            let handles: Vec<_> = (0..self.workers)
                .map(|worker_id| {
                    let work = move || self.worker_loop(worker_id);
                    thread::Builder::new()
                        .name(format!("{}-worker-{}", PackagePaths::get().pkg_name(), worker_id))
                        .spawn_scoped(s, work)
                        .unwrap_or_else(|e| {
                            warn!("[worker {}] named spawn failed: {}", worker_id, e);
                            s.spawn(work)
                        })
                })
                .collect();
            let mut panicked = 0_usize;
            for (worker_id, h) in handles.into_iter().enumerate() {
                if h.join().is_err() {
                    error!("[worker {}] panicked", worker_id);
                    panicked += 1;
                }
            }
            panicked
        });
        if panicked_workers > 0 {
            // Workers died in an error callback; keep producers from blocking on a full queue.
            for _ in self.receiver.iter() {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
        let summary = self.summary(panicked_workers);
        debug!("runner finished: {:?}", summary);
        summary
    }

    /// Snapshot of the counters.
    pub fn summary(&self, panicked_workers: usize) -> RunSummary {
        RunSummary {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            panicked_workers,
        }
    }

    /// Single worker: pull tasks until the queue is closed and empty.
    fn worker_loop(&self, worker_id: usize) {
        let mut executed = 0_usize;
        while let Ok(QueuedTask { task, on_error }) = self.receiver.recv() {
            if self.is_cancelled() {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            executed += 1;
            let result = panic::catch_unwind(AssertUnwindSafe(|| task(worker_id)))
                .unwrap_or_else(|payload| Err(panic_error(worker_id, payload.as_ref())));
            match result {
                Ok(()) => {
                    self.completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    if self.fail_fast && !self.cancelled.swap(true, Ordering::Relaxed) {
                        error!("[worker {}] fail-fast: {:#}", worker_id, err);
                    }
                    on_error(err);
                }
            }
        }
        debug!("[worker {}] exiting after {} tasks", worker_id, executed);
    }
}

/// Turn a task panic into an ordinary task error.
fn panic_error(worker_id: usize, payload: &(dyn Any + Send)) -> anyhow::Error {
    let msg = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    anyhow::anyhow!("task panicked on worker {}: {}", worker_id, msg)
}
