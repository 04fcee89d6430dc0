//! Bounded, thread-safe error collection shared by pool workers, the dispatch driver and the reader.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::AggregateError;

/// Holds at most `capacity` errors. Additions past capacity are dropped and counted, which bounds
/// memory during an error storm; [`AggregateError::is_overflow`] reports it.
pub struct ErrorsQueue {
    tx: Sender<anyhow::Error>,
    rx: Receiver<anyhow::Error>,
    capacity: usize,
    dropped: AtomicUsize,
}

impl ErrorsQueue {
    /// `capacity` is raised to 1 if zero.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            dropped: AtomicUsize::new(0),
        }
    }

    /// Record an error. Never blocks.
    pub fn add_error(&self, err: anyhow::Error) {
        match self.tx.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("error queue full, dropping: {:#}", err);
            }
            // Both ends live in self.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Errors currently held (not counting dropped ones).
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty() && self.dropped() == 0
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Drain the queue into one error: the error itself when exactly one was captured and none
    /// dropped, otherwise an [`AggregateError`]. `None` when nothing was captured.
    /// Resets the dropped count.
    pub fn take_error(&self) -> Option<anyhow::Error> {
        let mut errors: Vec<anyhow::Error> = self.rx.try_iter().collect();
        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        match (errors.len(), dropped) {
            (0, 0) => None,
            (1, 0) => errors.pop(),
            _ => Some(anyhow::Error::new(AggregateError::new(errors, dropped))),
        }
    }

    /// Discard everything held, e.g. stale errors from an abandoned pass.
    pub fn clear(&self) {
        for _ in self.rx.try_iter() {}
        self.dropped.store(0, Ordering::Relaxed);
    }
}

impl Default for ErrorsQueue {
    fn default() -> Self {
        Self::new(crate::utils::config::ERRORS_QUEUE_CAP)
    }
}
