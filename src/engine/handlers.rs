//! Command handlers for the resultflow CLI

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::content::{ContentReader, merge_readers};
use crate::engine::arg_parser::{Cli, Commands};
use crate::engine::progress::{
    create_counter, flush_progress_remainder, refresh_bar, report_progress_batched,
};
use crate::pipeline::{DispatchOpts, dispatch_records};
use crate::utils::config::PROGRESS_UPDATE_BATCH_SIZE;
use crate::utils::settings_toml::{apply_file_to_opts, load_settings_toml};
use crate::utils::setup_logging;
use crate::{GenericRecord, Opts};

/// Defaults, then `.resultflow.toml` from the working directory, then CLI flags.
fn setup_opts(cli: &Cli) -> Opts {
    let mut opts = Opts::default();
    let file = std::env::current_dir()
        .ok()
        .and_then(|dir| load_settings_toml(&dir));
    if let Some(file) = &file {
        apply_file_to_opts(file, &mut opts);
    }
    if let Some(v) = cli.verbose {
        opts.verbose = v;
    }
    if let Some(key) = &cli.key {
        opts.array_key = key.clone();
    }
    if let Some(n) = cli.buffer {
        opts.buffer_capacity = n;
    }
    if let Commands::Check {
        threads,
        fail_fast,
        unbounded,
        ..
    } = &cli.command
    {
        if threads.is_some() {
            opts.threads = *threads;
        }
        if let Some(v) = fail_fast {
            opts.fail_fast = *v;
        }
        if let Some(v) = unbounded {
            opts.unbounded_queue = *v;
        }
    }
    setup_logging(opts.verbose);
    if file.is_some() {
        debug!("Loaded {}", crate::utils::PackagePaths::get().settings_filename());
    }
    opts
}

fn open_reader(file: &Path, opts: &Opts) -> ContentReader {
    ContentReader::new(file, opts.array_key.as_str()).with_buffer_capacity(opts.buffer_capacity)
}

/// Run the parsed command.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let opts = setup_opts(cli);
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        opts
    );
    match &cli.command {
        Commands::Count { file } => handle_count(file, &opts),
        Commands::Empty { file } => handle_empty(file, &opts),
        Commands::Dump { file, limit } => handle_dump(file, *limit, &opts),
        Commands::Merge { output, files } => handle_merge(output, files, &opts),
        Commands::Check { file, require, .. } => handle_check(file, require, &opts),
    }
}

fn handle_count(file: &Path, opts: &Opts) -> Result<()> {
    let mut reader = open_reader(file, opts);
    let n = reader.length()?;
    println!("{}", n);
    Ok(())
}

fn handle_empty(file: &Path, opts: &Opts) -> Result<()> {
    let reader = open_reader(file, opts);
    println!("{}", reader.is_empty()?);
    Ok(())
}

fn handle_dump(file: &Path, limit: Option<usize>, opts: &Opts) -> Result<()> {
    let mut reader = open_reader(file, opts);
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut written = 0usize;
    while limit.is_none_or(|n| written < n) {
        let Some(record) = reader.next_value()? else {
            break;
        };
        serde_json::to_writer(&mut out, &record).context("encode record")?;
        out.write_all(b"\n").context("write stdout")?;
        written += 1;
    }
    out.flush().context("flush stdout")?;
    debug!("Dumped {} records", written);
    Ok(())
}

fn handle_merge(output: &Path, files: &[PathBuf], opts: &Opts) -> Result<()> {
    // Merging consumes and deletes its inputs, so merge private copies.
    let copies = files
        .iter()
        .map(|f| open_reader(f, opts).duplicate())
        .collect::<Result<Vec<_>>>()?;
    let mut merged = merge_readers(copies, &opts.array_key)?;
    let total = merged.length()?;
    let merged_path = merged
        .file_path()
        .context("merged reader has no backing file")?
        .to_path_buf();
    fs::copy(&merged_path, output)
        .with_context(|| format!("write merged output {}", output.display()))?;
    merged.close()?;
    info!(
        "Merged {} records from {} files into {}",
        total,
        files.len(),
        output.display()
    );
    Ok(())
}

fn handle_check(file: &Path, require: &[String], opts: &Opts) -> Result<()> {
    let mut reader = open_reader(file, opts);

    let cancel_requested = Arc::new(AtomicBool::new(false));
    let cancel_requested_handler = Arc::clone(&cancel_requested);
    ctrlc::set_handler(move || {
        cancel_requested_handler.store(true, Ordering::Relaxed);
    })
    .context("set Ctrl+C handler")?;

    let mut dispatch = DispatchOpts::from(opts);
    dispatch.cancel_check = Some(Arc::clone(&cancel_requested));
    debug!("Checking with {} workers", dispatch.threads);

    let bar = opts.verbose.then(|| {
        let b = create_counter("Checking");
        refresh_bar(&b);
        b
    });
    let processed = Arc::new(AtomicUsize::new(0));

    let required: Arc<[String]> = require.into();
    let worker_bar = bar.clone();
    let worker_processed = Arc::clone(&processed);
    let outcome = dispatch_records(&mut reader, &dispatch, move |_worker_id, record: GenericRecord| {
        let missing: Vec<&str> = required
            .iter()
            .filter(|field| !record.contains_key(field.as_str()))
            .map(String::as_str)
            .collect();
        report_progress_batched(
            worker_bar.as_ref(),
            &worker_processed,
            PROGRESS_UPDATE_BATCH_SIZE,
        );
        if !missing.is_empty() {
            bail!(
                "missing required field(s) {} in {}",
                missing.join(", "),
                serde_json::Value::Object(record)
            );
        }
        Ok(())
    })?;
    flush_progress_remainder(
        bar.as_ref(),
        processed.load(Ordering::Relaxed),
        PROGRESS_UPDATE_BATCH_SIZE,
    );

    if cancel_requested.load(Ordering::Relaxed) {
        warn!("Cancelled: {} records never ran", outcome.skipped);
    }
    println!("success: {}", outcome.success);
    println!("failure: {}", outcome.failure);
    if outcome.dropped_errors > 0 {
        debug!("{} errors beyond capacity were dropped", outcome.dropped_errors);
    }
    if let Some(err) = outcome.error {
        warn!("{:#}", err);
    }
    if outcome.failure > 0 {
        bail!("{} of {} records failed", outcome.failure, outcome.success + outcome.failure);
    }
    Ok(())
}
