//! Progress counter for long dispatch runs

use kdam::{Animation, Bar, BarExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub type ProgressBar = Arc<Mutex<Bar>>;

/// Create a counter for unknown total (shows count without percentage)
pub fn create_counter(desc: &'static str) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = 0,
        desc = desc,
        animation = Animation::Classic,
        position = 0,
        unit = " records"
    )))
}

/// Force a refresh of the bar (e.g. so the counter shows "0 records" immediately).
pub fn refresh_bar(pb: &ProgressBar) {
    if let Ok(mut bar) = pb.try_lock() {
        let _ = bar.refresh();
    }
}

/// Update progress bar without blocking; a contended update is skipped and caught up later.
pub fn update_progress_bar(pb: &ProgressBar, n: usize) {
    if let Ok(mut pb) = pb.try_lock() {
        let _ = pb.update(n);
    }
}

/// Increment a shared counter and update the bar every `chunk_size` items.
/// Called from pool workers to keep lock traffic low.
pub fn report_progress_batched(pb: Option<&ProgressBar>, counter: &AtomicUsize, chunk_size: usize) {
    let count = counter.fetch_add(1, Ordering::Relaxed) + 1;
    if let Some(pb) = pb
        && count.is_multiple_of(chunk_size)
    {
        update_progress_bar(pb, chunk_size);
    }
}

/// Final update for the remainder after batched updates.
pub fn flush_progress_remainder(pb: Option<&ProgressBar>, total: usize, chunk_size: usize) {
    if let Some(pb) = pb {
        let remaining = total % chunk_size;
        if remaining > 0 {
            update_progress_bar(pb, remaining);
        }
        if let Ok(mut bar) = pb.lock() {
            let _ = bar.refresh();
        }
        eprintln!();
    }
}
