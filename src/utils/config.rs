//! Application configuration constants.
//! Tuning and thresholds in one place.

use std::sync::OnceLock;

use crate::utils::fd_limit::max_workers_by_fd_limit;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    temp_prefix: String,
    settings_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                temp_prefix: format!("{pkg}-"),
                settings_filename: format!(".{pkg}.toml"),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Prefix of every temp content file the reader and writer create.
    pub fn temp_prefix(&self) -> &str {
        &self.temp_prefix
    }

    pub fn temp_suffix(&self) -> &str {
        ".json"
    }

    pub fn settings_filename(&self) -> &str {
        &self.settings_filename
    }
}

// ---- Content streaming ----

/// Capacity of the decoded-record buffer between the decode thread and the consumer.
pub const CHANNEL_SIZE: usize = 100;

/// Read buffer for the content file scanner (bytes). 64 KB.
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Array key used when none is given (matches search result files).
pub const DEFAULT_ARRAY_KEY: &str = "results";

// ---- Error aggregation ----

/// Default capacity of an [`ErrorsQueue`](crate::pool::ErrorsQueue); further errors are dropped and counted.
pub const ERRORS_QUEUE_CAP: usize = 100;

// ---- Worker threads ----

/// Thread limits for the dispatch pool.
/// Use [`WorkerThreadLimits::current()`] to fill `all_threads` from rayon; the rest are const.
#[derive(Clone, Copy, Debug)]
pub struct WorkerThreadLimits {
    /// Available threads (from rayon); set by [`WorkerThreadLimits::current()`].
    pub all_threads: usize,
    /// Floor / minimum pool size.
    pub floor: usize,
    /// Default ceiling; tasks are I/O bound so more than this rarely helps.
    pub max: usize,
}

impl Default for WorkerThreadLimits {
    fn default() -> Self {
        Self {
            all_threads: 0, // use current() to set from rayon
            floor: Self::FLOOR_THREADS,
            max: Self::MAX_THREADS,
        }
    }
}

impl WorkerThreadLimits {
    pub const FLOOR_THREADS: usize = 2;
    pub const MAX_THREADS: usize = 16;

    /// Build limits with `all_threads` set from `rayon::current_num_threads()`.
    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            ..Self::default()
        }
    }

    /// Default pool size: available threads clamped to `[floor, max]`, then capped by the FD limit.
    pub fn default_workers(&self) -> usize {
        let n = self.all_threads.clamp(self.floor, self.max);
        match max_workers_by_fd_limit() {
            Some(cap) => n.min(cap).max(1),
            None => n,
        }
    }
}

/// Queued tasks allowed per worker in bounded mode before the producer blocks.
pub const QUEUE_SLOTS_PER_WORKER: usize = 4;

// ---- Progress ----

/// Batch size for progress bar updates from pool workers (reduce lock contention).
pub const PROGRESS_UPDATE_BATCH_SIZE: usize = 100;
