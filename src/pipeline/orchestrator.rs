use anyhow::{Context, Result};
use log::debug;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::thread;

use crate::content::ContentReader;
use crate::errors::ContentError;
use crate::pipeline::context::{DispatchOpts, DispatchOutcome};
use crate::pipeline::counters::SuccessCounters;
use crate::pool::{BoundedRunner, ErrorsQueue};

/// What the driver thread saw.
#[derive(Debug, Default)]
struct DriverReport {
    /// Records taken from the reader (including ones that failed conversion).
    read: usize,
    dispatched: usize,
    /// The pass ended on an I/O, syntax or missing-key error.
    stream_failed: bool,
}

/// Signals `done()` however the driver exits, so `run()` can never wait forever.
struct DoneOnDrop<'a>(&'a BoundedRunner);

impl Drop for DoneOnDrop<'_> {
    fn drop(&mut self) {
        self.0.done();
    }
}

/// Run `op` once per record of `reader` on a pool of `opts.threads` workers.
///
/// Reader → driver thread (one task per record) → pool → success counters + error aggregate.
/// `op` receives the worker identity and the record converted to `T`. The caller's thread runs
/// the pool and blocks until every task has finished.
///
/// `failure = total - success` where `total` is the reader's length. After a clean pass the
/// length is already cached; after cancellation it costs a counting pass, taken only once the
/// driver has been joined so dispatch and counting never share a pass. The reader is restarted
/// before returning.
pub fn dispatch_records<T, F>(
    reader: &mut ContentReader,
    opts: &DispatchOpts,
    op: F,
) -> Result<DispatchOutcome>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(usize, T) -> Result<()> + Send + Sync + 'static,
{
    let mut runner = BoundedRunner::new(opts.runner_opts());
    if let Some(flag) = &opts.cancel_check {
        runner = runner.with_cancel_flag(Arc::clone(flag));
    }
    let errors = Arc::new(ErrorsQueue::new(opts.error_capacity));
    let counters = SuccessCounters::new(runner.workers());
    let op = Arc::new(op);

    let (driver, summary) = thread::scope(|s| {
        let driver = s.spawn(|| drive_records(&mut *reader, &runner, &errors, &counters, &op));
        let summary = runner.run();
        (driver.join(), summary)
    });
    let report = driver.map_err(|_| anyhow::anyhow!("dispatch driver panicked"))?;
    debug!("dispatch driver: {:?}, pool: {:?}", report, summary);

    let total = if report.stream_failed {
        report.read
    } else {
        match reader.length() {
            Ok(n) => n,
            Err(err) => {
                errors.add_error(err);
                report.read
            }
        }
    };
    reader.restart();

    let success = counters.total();
    let dropped_errors = errors.dropped();
    Ok(DispatchOutcome {
        success,
        failure: total.saturating_sub(success),
        error: errors.take_error(),
        dropped_errors,
        skipped: summary.skipped,
        per_worker: counters.per_worker(),
    })
}

fn drive_records<T, F>(
    reader: &mut ContentReader,
    runner: &BoundedRunner,
    errors: &Arc<ErrorsQueue>,
    counters: &SuccessCounters,
    op: &Arc<F>,
) -> DriverReport
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(usize, T) -> Result<()> + Send + Sync + 'static,
{
    let _done = DoneOnDrop(runner);
    let mut report = DriverReport::default();
    loop {
        if runner.is_cancelled() {
            debug!("dispatch cancelled after {} records", report.read);
            break;
        }
        let record = match reader.next_record::<T>() {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(err) => {
                let fatal = err
                    .downcast_ref::<ContentError>()
                    .is_none_or(ContentError::is_fatal);
                errors.add_error(err);
                if fatal {
                    report.stream_failed = true;
                    break;
                }
                report.read += 1;
                continue;
            }
        };
        let index = report.read;
        report.read += 1;

        let op = Arc::clone(op);
        let counters = counters.clone();
        let task = move |worker_id: usize| -> Result<()> {
            op(worker_id, record).with_context(|| format!("record #{}", index))?;
            counters.record(worker_id);
            Ok(())
        };
        let sink = Arc::clone(errors);
        if let Err(e) = runner.add_task_with_error(task, move |err| sink.add_error(err)) {
            debug!("dispatch stopped at record #{}: {}", index, e);
            break;
        }
        report.dispatched += 1;
    }
    report
}
