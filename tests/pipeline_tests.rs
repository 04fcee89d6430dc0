use anyhow::bail;
use resultflow::pool::QueueMode;
use resultflow::{
    AggregateError, ContentError, ContentReader, DispatchOpts, GenericRecord, ReaderState,
    dispatch_records,
};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

fn write_file(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("results.json");
    fs::write(&path, body).unwrap();
    path
}

fn numbered(n: usize) -> String {
    let items: Vec<String> = (0..n).map(|i| format!(r#"{{"a":{}}}"#, i)).collect();
    format!(r#"{{"results":[{}]}}"#, items.join(","))
}

#[derive(Debug, Deserialize)]
struct Rec {
    a: i64,
}

#[test]
fn test_one_failing_record() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_file(&dir, r#"{"results":[{"a":1},{"a":2},{"a":3}]}"#);
    let mut reader = ContentReader::new(&path, "results");
    let outcome = dispatch_records(
        &mut reader,
        &DispatchOpts::with_threads(2),
        |_worker, rec: Rec| {
            if rec.a == 2 {
                bail!("a={} rejected", rec.a);
            }
            Ok(())
        },
    )?;
    assert_eq!(outcome.success, 2);
    assert_eq!(outcome.failure, 1);
    let err = outcome.error.unwrap();
    assert!(format!("{:#}", err).contains("a=2"));
    assert!(err.downcast_ref::<AggregateError>().is_none());
    assert_eq!(reader.state(), ReaderState::NotStarted);
    Ok(())
}

#[test]
fn test_empty_array_dispatch() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_file(&dir, r#"{"results":[]}"#);
    let mut reader = ContentReader::new(&path, "results");
    assert!(reader.is_empty()?);
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let (success, failure, error) = dispatch_records(
        &mut reader,
        &DispatchOpts::with_threads(4),
        move |_, _rec: GenericRecord| {
            seen.fetch_add(1, Ordering::Relaxed);
            Ok(())
        },
    )?
    .into_parts();
    assert_eq!((success, failure), (0, 0));
    assert!(error.is_none());
    assert_eq!(calls.load(Ordering::Relaxed), 0);
    Ok(())
}

#[test]
fn test_predicate_counts_add_up() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_file(&dir, &numbered(500));
    let mut reader = ContentReader::new(&path, "results").with_buffer_capacity(16);
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let outcome = dispatch_records(
        &mut reader,
        &DispatchOpts::with_threads(4),
        move |_, rec: Rec| {
            seen.fetch_add(1, Ordering::Relaxed);
            if rec.a % 7 == 0 {
                bail!("a={} is a multiple of 7", rec.a);
            }
            Ok(())
        },
    )?;
    let expected_failures = (0..500).filter(|a| a % 7 == 0).count();
    assert_eq!(calls.load(Ordering::Relaxed), 500);
    assert_eq!(outcome.failure, expected_failures);
    assert_eq!(outcome.success, 500 - expected_failures);
    assert_eq!(outcome.total(), 500);
    assert_eq!(outcome.per_worker.len(), 4);
    assert_eq!(outcome.per_worker.iter().sum::<usize>(), outcome.success);
    let err = outcome.error.unwrap();
    let agg = err.downcast_ref::<AggregateError>().unwrap();
    assert_eq!(agg.errors().len() + agg.dropped(), expected_failures);
    Ok(())
}

#[test]
fn test_error_capacity_bounds_aggregate() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_file(&dir, &numbered(50));
    let mut reader = ContentReader::new(&path, "results");
    let opts = DispatchOpts {
        error_capacity: 3,
        ..DispatchOpts::with_threads(2)
    };
    let outcome = dispatch_records(&mut reader, &opts, |_, rec: Rec| {
        bail!("a={} always fails", rec.a)
    })?;
    assert_eq!(outcome.success, 0);
    assert_eq!(outcome.failure, 50);
    assert_eq!(outcome.dropped_errors, 47);
    let err = outcome.error.unwrap();
    let agg = err.downcast_ref::<AggregateError>().unwrap();
    assert_eq!(agg.errors().len(), 3);
    assert!(agg.is_overflow());
    Ok(())
}

#[test]
fn test_missing_key_surfaces_not_found() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_file(&dir, r#"{"items":[{"a":1}]}"#);
    let mut reader = ContentReader::new(&path, "results");
    let outcome = dispatch_records(
        &mut reader,
        &DispatchOpts::with_threads(2),
        |_, _rec: Rec| Ok(()),
    )?;
    assert_eq!((outcome.success, outcome.failure), (0, 0));
    let err = outcome.error.unwrap();
    assert!(matches!(
        err.downcast_ref::<ContentError>(),
        Some(ContentError::NotFound { .. })
    ));
    Ok(())
}

#[test]
fn test_malformed_stream_keeps_processed_records() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_file(&dir, r#"{"results":[{"a":1},{"a":2},{"a":"#);
    let mut reader = ContentReader::new(&path, "results");
    let outcome = dispatch_records(
        &mut reader,
        &DispatchOpts::with_threads(2),
        |_, _rec: Rec| Ok(()),
    )?;
    assert_eq!(outcome.success, 2);
    assert_eq!(outcome.failure, 0);
    let err = outcome.error.unwrap();
    assert!(matches!(
        err.downcast_ref::<ContentError>(),
        Some(ContentError::Malformed { .. })
    ));
    Ok(())
}

#[test]
fn test_unconvertible_record_counts_as_failure() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_file(&dir, r#"{"results":[{"a":1},{"a":"x"},{"a":3}]}"#);
    let mut reader = ContentReader::new(&path, "results");
    let outcome = dispatch_records(
        &mut reader,
        &DispatchOpts::with_threads(2),
        |_, _rec: Rec| Ok(()),
    )?;
    assert_eq!((outcome.success, outcome.failure), (2, 1));
    let err = outcome.error.unwrap();
    assert!(matches!(
        err.downcast_ref::<ContentError>(),
        Some(ContentError::Convert { index: 1, .. })
    ));
    Ok(())
}

#[test]
fn test_reader_reusable_after_dispatch() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_file(&dir, &numbered(20));
    let mut reader = ContentReader::new(&path, "results");
    let opts = DispatchOpts::with_threads(3);
    let first = dispatch_records(&mut reader, &opts, |_, _rec: Rec| Ok(()))?;
    let second = dispatch_records(&mut reader, &opts, |_, _rec: Rec| Ok(()))?;
    assert_eq!(first.success, 20);
    assert_eq!(second.success, 20);
    assert_eq!(reader.length()?, 20);
    Ok(())
}

#[test]
fn test_fail_fast_stops_early() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_file(&dir, &numbered(200));
    let mut reader = ContentReader::new(&path, "results");
    let opts = DispatchOpts {
        fail_fast: true,
        ..DispatchOpts::with_threads(1)
    };
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let outcome = dispatch_records(&mut reader, &opts, move |_, rec: Rec| {
        seen.fetch_add(1, Ordering::Relaxed);
        if rec.a == 0 {
            bail!("a=0 fails first");
        }
        Ok(())
    })?;
    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert_eq!(outcome.success, 0);
    assert_eq!(outcome.failure, 200);
    assert!(outcome.error.is_some());
    Ok(())
}

#[test]
fn test_cancel_flag_stops_dispatch() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_file(&dir, &numbered(300));
    let mut reader = ContentReader::new(&path, "results");
    let flag = Arc::new(AtomicBool::new(false));
    let opts = DispatchOpts {
        queue: QueueMode::Bounded(1),
        cancel_check: Some(Arc::clone(&flag)),
        ..DispatchOpts::with_threads(1)
    };
    let cancel = Arc::clone(&flag);
    let outcome = dispatch_records(&mut reader, &opts, move |_, rec: Rec| {
        if rec.a == 9 {
            cancel.store(true, Ordering::Relaxed);
        }
        Ok(())
    })?;
    assert!(outcome.success >= 10);
    assert!(outcome.success < 300);
    assert_eq!(outcome.total(), 300);
    assert!(outcome.error.is_none());
    Ok(())
}

#[test]
fn test_panicking_record_is_reported() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_file(&dir, &numbered(50));
    let mut reader = ContentReader::new(&path, "results");
    let outcome = dispatch_records(
        &mut reader,
        &DispatchOpts::with_threads(2),
        |_, rec: Rec| {
            if rec.a == 3 {
                panic!("a={} cannot be handled", rec.a);
            }
            Ok(())
        },
    )?;
    assert_eq!((outcome.success, outcome.failure), (49, 1));
    let err = outcome.error.unwrap();
    assert!(format!("{:#}", err).contains("a=3"));
    Ok(())
}

#[test]
fn test_all_records_panicking_completes() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = write_file(&dir, &numbered(50));
    let mut reader = ContentReader::new(&path, "results");
    let outcome = dispatch_records(
        &mut reader,
        &DispatchOpts::with_threads(2),
        |_, rec: Rec| -> anyhow::Result<()> { panic!("a={} always panics", rec.a) },
    )?;
    assert_eq!((outcome.success, outcome.failure), (0, 50));
    let err = outcome.error.unwrap();
    let agg = err.downcast_ref::<AggregateError>().unwrap();
    assert_eq!(agg.errors().len(), 50);
    Ok(())
}
