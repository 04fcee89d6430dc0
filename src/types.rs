//! Public and internal types for the resultflow API and CLI.

use serde_json::{Map, Value};

use crate::utils::config::{CHANNEL_SIZE, DEFAULT_ARRAY_KEY, ERRORS_QUEUE_CAP};

/// One array element as decoded from a content file: a key-ordered string → value mapping.
///
/// Schema-agnostic operations (count, merge, dump) work on this type. Typed consumers use
/// [`ContentReader::next_record`](crate::content::ContentReader::next_record), which converts
/// the decoded tree without re-encoding it.
pub type GenericRecord = Map<String, Value>;

/// Full options for the CLI. Lib callers use [`DispatchOpts`](crate::DispatchOpts) and reader builders.
#[derive(Clone, Debug)]
pub struct Opts {
    /// Name of the top-level array field to stream.
    pub array_key: String,
    /// Decoded-record buffer between the decode thread and the consumer.
    pub buffer_capacity: usize,
    /// Pool size. When None, derived from available threads and the FD limit.
    pub threads: Option<usize>,
    /// Errors kept before further ones are dropped (and counted).
    pub error_capacity: usize,
    /// Never block the dispatch driver on a full task queue.
    pub unbounded_queue: bool,
    /// Stop starting tasks after the first failure.
    pub fail_fast: bool,
    /// Debug logging and progress output.
    pub verbose: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            array_key: DEFAULT_ARRAY_KEY.to_string(),
            buffer_capacity: CHANNEL_SIZE,
            threads: None,
            error_capacity: ERRORS_QUEUE_CAP,
            unbounded_queue: false,
            fail_fast: false,
            verbose: false,
        }
    }
}
