//! Resultflow: stream huge JSON result sets record by record and fan them out to a bounded worker pool

pub mod content;
pub mod engine;
pub mod errors;
pub mod pipeline;
pub mod pool;
pub mod props;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use content::{ContentReader, ContentWriter, ReaderState, merge_readers};
pub use errors::{AggregateError, ContentError, RunnerError};
pub use pipeline::{DispatchOpts, DispatchOutcome, dispatch_records};
pub use pool::{BoundedRunner, ErrorsQueue, QueueMode, RunnerOpts};

/// Result alias used by public resultflow API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
