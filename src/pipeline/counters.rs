use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One success counter per pool worker. Worker `i` only ever touches slot `i`, so there is no
/// contention and relaxed ordering is enough; totals are read after the pool has joined.
#[derive(Clone, Debug)]
pub struct SuccessCounters(Arc<[AtomicUsize]>);

impl SuccessCounters {
    pub fn new(workers: usize) -> Self {
        Self((0..workers).map(|_| AtomicUsize::new(0)).collect())
    }

    pub fn record(&self, worker_id: usize) {
        self.0[worker_id].fetch_add(1, Ordering::Relaxed);
    }

    pub fn total(&self) -> usize {
        self.0.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    pub fn per_worker(&self) -> Vec<usize> {
        self.0.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }
}
