use anyhow::anyhow;
use resultflow::pool::{BoundedRunner, ErrorsQueue, QueueMode, RunnerOpts};
use resultflow::{AggregateError, RunnerError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// --- ErrorsQueue ---

#[test]
fn test_errors_queue_empty_gives_none() {
    let q = ErrorsQueue::new(4);
    assert!(q.is_empty());
    assert!(q.take_error().is_none());
}

#[test]
fn test_errors_queue_single_error_is_returned_as_is() {
    let q = ErrorsQueue::new(4);
    q.add_error(anyhow!("boom"));
    let err = q.take_error().unwrap();
    assert_eq!(err.to_string(), "boom");
    assert!(err.downcast_ref::<AggregateError>().is_none());
    assert!(q.take_error().is_none());
}

#[test]
fn test_errors_queue_aggregates_several() {
    let q = ErrorsQueue::new(4);
    q.add_error(anyhow!("first"));
    q.add_error(anyhow!("second"));
    let err = q.take_error().unwrap();
    let agg = err.downcast_ref::<AggregateError>().unwrap();
    assert_eq!(agg.errors().len(), 2);
    assert!(!agg.is_overflow());
    let msg = err.to_string();
    assert!(msg.contains("first") && msg.contains("second"));
}

#[test]
fn test_errors_queue_overflow_is_counted() {
    let q = ErrorsQueue::new(2);
    for i in 0..5 {
        q.add_error(anyhow!("e{}", i));
    }
    assert_eq!(q.len(), 2);
    assert_eq!(q.dropped(), 3);
    let err = q.take_error().unwrap();
    let agg = err.downcast_ref::<AggregateError>().unwrap();
    assert_eq!(agg.errors().len(), 2);
    assert_eq!(agg.dropped(), 3);
    assert!(agg.is_overflow());
    assert_eq!(q.dropped(), 0);
}

#[test]
fn test_errors_queue_capacity_one_overflow_still_aggregates() {
    let q = ErrorsQueue::new(0);
    assert_eq!(q.capacity(), 1);
    q.add_error(anyhow!("kept"));
    q.add_error(anyhow!("dropped"));
    let err = q.take_error().unwrap();
    assert!(err.downcast_ref::<AggregateError>().unwrap().is_overflow());
}

#[test]
fn test_errors_queue_concurrent_adds() {
    let q = Arc::new(ErrorsQueue::new(10));
    thread::scope(|s| {
        for t in 0..8 {
            let q = Arc::clone(&q);
            s.spawn(move || {
                for i in 0..10 {
                    q.add_error(anyhow!("t{} e{}", t, i));
                }
            });
        }
    });
    assert_eq!(q.len() + q.dropped(), 80);
    assert_eq!(q.len(), 10);
}

// --- BoundedRunner ---

#[test]
fn test_runner_executes_every_task() {
    let runner = BoundedRunner::new(RunnerOpts::with_workers(3));
    let ran = Arc::new(AtomicUsize::new(0));
    let summary = thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..50 {
                let ran = Arc::clone(&ran);
                runner
                    .add_task(move |_| {
                        ran.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    })
                    .unwrap();
            }
            runner.done();
        });
        runner.run()
    });
    assert_eq!(ran.load(Ordering::Relaxed), 50);
    assert_eq!(summary.submitted, 50);
    assert_eq!(summary.completed, 50);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.panicked_workers, 0);
}

#[test]
fn test_runner_never_exceeds_worker_count() {
    const WORKERS: usize = 3;
    let runner = BoundedRunner::new(RunnerOpts::with_workers(WORKERS));
    let active = Arc::new(AtomicUsize::new(0));
    let high_water = Arc::new(AtomicUsize::new(0));
    let seen_ids = Arc::new(Mutex::new(Vec::new()));
    thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..30 {
                let active = Arc::clone(&active);
                let high_water = Arc::clone(&high_water);
                let seen_ids = Arc::clone(&seen_ids);
                runner
                    .add_task(move |worker_id| {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        high_water.fetch_max(now, Ordering::SeqCst);
                        seen_ids.lock().unwrap().push(worker_id);
                        thread::sleep(Duration::from_millis(2));
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .unwrap();
            }
            runner.done();
        });
        runner.run();
    });
    assert!(high_water.load(Ordering::SeqCst) <= WORKERS);
    assert!(seen_ids.lock().unwrap().iter().all(|&id| id < WORKERS));
}

#[test]
fn test_runner_errors_go_to_callback_and_siblings_continue() {
    let runner = BoundedRunner::new(RunnerOpts::with_workers(2));
    let errors = Arc::new(ErrorsQueue::new(10));
    let summary = thread::scope(|s| {
        s.spawn(|| {
            for i in 0..10 {
                let sink = Arc::clone(&errors);
                runner
                    .add_task_with_error(
                        move |_| {
                            if i % 5 == 0 {
                                Err(anyhow!("task {} failed", i))
                            } else {
                                Ok(())
                            }
                        },
                        move |err| sink.add_error(err),
                    )
                    .unwrap();
            }
            runner.done();
        });
        runner.run()
    });
    assert_eq!(summary.completed, 8);
    assert_eq!(summary.failed, 2);
    let err = errors.take_error().unwrap();
    assert_eq!(
        err.downcast_ref::<AggregateError>().unwrap().errors().len(),
        2
    );
}

#[test]
fn test_done_is_idempotent_and_rejects_later_tasks() {
    let runner = BoundedRunner::new(RunnerOpts::with_workers(1));
    runner.done();
    runner.done();
    assert_eq!(runner.add_task(|_| Ok(())), Err(RunnerError::Closed));
    let summary = runner.run();
    assert_eq!(summary.submitted, 0);
}

#[test]
fn test_runner_with_no_tasks_returns() {
    let runner = BoundedRunner::new(RunnerOpts::with_workers(4));
    runner.done();
    let summary = runner.run();
    assert_eq!(summary.completed, 0);
}

#[test]
fn test_unbounded_queue_accepts_before_run() {
    let runner = BoundedRunner::new(RunnerOpts {
        workers: 2,
        queue: QueueMode::Unbounded,
        fail_fast: false,
    });
    for _ in 0..1000 {
        runner.add_task(|_| Ok(())).unwrap();
    }
    runner.done();
    assert_eq!(runner.run().completed, 1000);
}

#[test]
fn test_fail_fast_skips_remaining_tasks() {
    let runner = BoundedRunner::new(RunnerOpts {
        workers: 1,
        queue: QueueMode::Unbounded,
        fail_fast: true,
    });
    runner.add_task(|_| Err(anyhow!("first fails"))).unwrap();
    for _ in 0..9 {
        runner.add_task(|_| Ok(())).unwrap();
    }
    runner.done();
    let summary = runner.run();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.completed, 0);
    assert_eq!(summary.skipped, 9);
    assert!(runner.is_cancelled());
    assert_eq!(runner.add_task(|_| Ok(())), Err(RunnerError::Cancelled));
}

#[test]
fn test_external_cancel_flag() {
    let flag = Arc::new(AtomicBool::new(false));
    let runner = BoundedRunner::new(RunnerOpts {
        workers: 1,
        queue: QueueMode::Unbounded,
        fail_fast: false,
    })
    .with_cancel_flag(Arc::clone(&flag));
    let cancel = Arc::clone(&flag);
    runner
        .add_task(move |_| {
            cancel.store(true, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();
    for _ in 0..4 {
        runner.add_task(|_| Ok(())).unwrap();
    }
    runner.done();
    let summary = runner.run();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.skipped, 4);
    assert_eq!(runner.add_task(|_| Ok(())), Err(RunnerError::Cancelled));
}

// --- panicking tasks ---

#[test]
fn test_panicking_task_is_reported_as_error() {
    let runner = BoundedRunner::new(RunnerOpts::with_workers(2));
    let errors = Arc::new(ErrorsQueue::new(10));
    let summary = thread::scope(|s| {
        s.spawn(|| {
            for i in 0..20 {
                let sink = Arc::clone(&errors);
                runner
                    .add_task_with_error(
                        move |_| {
                            if i == 7 {
                                panic!("record {} exploded", i);
                            }
                            Ok(())
                        },
                        move |err| sink.add_error(err),
                    )
                    .unwrap();
            }
            runner.done();
        });
        runner.run()
    });
    assert_eq!(summary.completed, 19);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.panicked_workers, 0);
    let err = errors.take_error().unwrap();
    assert!(err.to_string().contains("record 7 exploded"));
}

#[test]
fn test_every_task_panicking_still_returns() {
    let runner = BoundedRunner::new(RunnerOpts {
        workers: 2,
        queue: QueueMode::Bounded(1),
        fail_fast: false,
    });
    let errors = Arc::new(ErrorsQueue::new(100));
    let summary = thread::scope(|s| {
        s.spawn(|| {
            for i in 0..40 {
                let sink = Arc::clone(&errors);
                runner
                    .add_task_with_error(
                        move |_| -> anyhow::Result<()> { panic!("task {} always panics", i) },
                        move |err| sink.add_error(err),
                    )
                    .unwrap();
            }
            runner.done();
        });
        runner.run()
    });
    assert_eq!(summary.failed, 40);
    assert_eq!(summary.panicked_workers, 0);
    assert_eq!(errors.len(), 40);
}
