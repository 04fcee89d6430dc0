//! Typed errors. Public operations return [`anyhow::Result`]; recover these with `downcast_ref`.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while streaming or writing a content file.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The array key is absent from the document. Distinct from end-of-stream.
    #[error("array key '{key}' not found in {}", path.display())]
    NotFound { key: String, path: PathBuf },

    /// Syntax error, truncated input, or a value of the wrong shape (non-object element,
    /// non-array under the key, non-object document). `msg` carries the position.
    #[error("malformed JSON in {}: {msg}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        column: usize,
        msg: String,
    },

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record #`index` decoded fine but does not fit the requested type. The stream continues.
    #[error("record #{index} does not match the requested shape: {source}")]
    Convert {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("content reader used after close")]
    Closed,
}

impl ContentError {
    /// True for errors that end the stream (everything except [`ContentError::Convert`]).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ContentError::Convert { .. })
    }
}

/// Submission rejected by a [`BoundedRunner`](crate::pool::BoundedRunner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RunnerError {
    #[error("runner is closed to new tasks")]
    Closed,
    #[error("runner was cancelled")]
    Cancelled,
}

/// Combined error of an [`ErrorsQueue`](crate::pool::ErrorsQueue) holding several errors, or
/// one that overflowed.
#[derive(Debug)]
pub struct AggregateError {
    errors: Vec<anyhow::Error>,
    dropped: usize,
}

impl AggregateError {
    pub(crate) fn new(errors: Vec<anyhow::Error>, dropped: usize) -> Self {
        Self { errors, dropped }
    }

    /// Errors that were accepted, in arrival order.
    pub fn errors(&self) -> &[anyhow::Error] {
        &self.errors
    }

    /// Errors discarded because the queue was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn is_overflow(&self) -> bool {
        self.dropped > 0
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred", self.errors.len() + self.dropped)?;
        for e in &self.errors {
            write!(f, "\n  - {:#}", e)?;
        }
        if self.dropped > 0 {
            write!(f, "\n  ({} more dropped: error queue full)", self.dropped)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}
