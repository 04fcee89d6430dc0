//! Streaming reader over one array field of a JSON file too large to load.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, error};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::GenericRecord;
use crate::content::scanner::scan_array;
use crate::errors::ContentError;
use crate::pool::ErrorsQueue;
use crate::utils::config::{CHANNEL_SIZE, PackagePaths, READ_BUFFER_SIZE};
use crate::utils::tempfiles::{copy_to_temp_content_file, remove_content_file};

/// Observable state of the current pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderState {
    /// No decode thread yet; the next read starts one.
    NotStarted,
    /// A decode thread is feeding the buffer.
    Running,
    /// The pass ended (end of array or error). [`ContentReader::restart`] allows another.
    Drained,
    /// The backing file was deleted.
    Closed,
}

enum Stream {
    NotStarted,
    Running {
        rx: Receiver<GenericRecord>,
        handle: JoinHandle<()>,
    },
    Drained,
}

/// Reads the array stored under `array_key` in a JSON file, one element at a time.
///
/// The first read spawns a single decode thread that pushes elements into a bounded buffer
/// (`buffer_capacity`, default [`CHANNEL_SIZE`]); a full buffer blocks the decode thread, not
/// the consumer. Elements come out in file order. Decode failures (I/O, malformed JSON, missing
/// key) end the pass and are returned by the read that observes the end.
///
/// Reads take `&mut self`: one consumer per reader. Use [`duplicate`](Self::duplicate) to
/// consume the same data twice concurrently.
pub struct ContentReader {
    file_path: Option<PathBuf>,
    array_key: String,
    buffer_capacity: usize,
    stream: Stream,
    errors: Arc<ErrorsQueue>,
    /// Element count, known after one clean full pass.
    length: Option<usize>,
    /// Records handed out in the current pass.
    consumed: usize,
    /// Temp files created by this crate are removed on drop; caller files only on `close`.
    owns_file: bool,
}

impl ContentReader {
    /// Reader over `file_path`. Nothing is opened until the first read.
    pub fn new(file_path: impl Into<PathBuf>, array_key: impl Into<String>) -> Self {
        Self {
            file_path: Some(file_path.into()),
            array_key: array_key.into(),
            buffer_capacity: CHANNEL_SIZE,
            stream: Stream::NotStarted,
            errors: Arc::new(ErrorsQueue::new(CHANNEL_SIZE)),
            length: None,
            consumed: 0,
            owns_file: false,
        }
    }

    /// Reader over a temp file this crate created; the file is removed on drop.
    pub(crate) fn from_temp(file_path: PathBuf, array_key: impl Into<String>) -> Self {
        let mut reader = Self::new(file_path, array_key);
        reader.owns_file = true;
        reader
    }

    pub(crate) fn with_known_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    /// Set the decoded-record buffer size (min 1). Applies from the next pass.
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    pub fn array_key(&self) -> &str {
        &self.array_key
    }

    /// Backing file, or `None` after [`close`](Self::close).
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Records decoded and waiting in the buffer (at most [`buffer_capacity`](Self::buffer_capacity)).
    pub fn buffered(&self) -> usize {
        match &self.stream {
            Stream::Running { rx, .. } => rx.len(),
            _ => 0,
        }
    }

    pub fn state(&self) -> ReaderState {
        if self.file_path.is_none() {
            return ReaderState::Closed;
        }
        match self.stream {
            Stream::NotStarted => ReaderState::NotStarted,
            Stream::Running { .. } => ReaderState::Running,
            Stream::Drained => ReaderState::Drained,
        }
    }

    /// Next element as an untyped record. `Ok(None)` at end of array; `Err` if the pass failed.
    pub fn next_value(&mut self) -> Result<Option<GenericRecord>> {
        if matches!(self.stream, Stream::NotStarted) {
            self.start()?;
        }
        let received = match &self.stream {
            Stream::Running { rx, .. } => rx.recv().ok(),
            _ => return Ok(None),
        };
        match received {
            Some(record) => {
                self.consumed += 1;
                Ok(Some(record))
            }
            None => self.finish_pass(),
        }
    }

    /// Next element converted to `T`. A record that does not fit `T` yields
    /// [`ContentError::Convert`] and the stream continues with the following record.
    pub fn next_record<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        let Some(record) = self.next_value()? else {
            return Ok(None);
        };
        let index = self.consumed - 1;
        serde_json::from_value(Value::Object(record))
            .map(Some)
            .map_err(|source| ContentError::Convert { index, source }.into())
    }

    /// Drop the current pass so the next read starts again from the top of the file.
    pub fn restart(&mut self) {
        self.stop_stream();
        self.errors.clear();
        self.consumed = 0;
    }

    /// Number of elements. Free once known; otherwise a full counting pass (which discards any
    /// in-progress pass) followed by a restart.
    pub fn length(&mut self) -> Result<usize> {
        if let Some(n) = self.length {
            return Ok(n);
        }
        self.restart();
        let drained = loop {
            match self.next_value() {
                Ok(Some(_)) => continue,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.restart();
        drained.context("count content records")?;
        Ok(self.length.unwrap_or_default())
    }

    /// True if the array has no elements. Reads a fresh handle up to the first element; the
    /// current pass is untouched.
    pub fn is_empty(&self) -> Result<bool> {
        if let Some(n) = self.length {
            return Ok(n == 0);
        }
        let path = self.file_path.as_deref().ok_or(ContentError::Closed)?;
        let summary = scan_array(open_content(path)?, path, &self.array_key, |_| {
            ControlFlow::Break(())
        })?;
        Ok(summary.elements == 0)
    }

    /// Independent reader over a byte-identical temp copy of the file, same key and buffer size.
    /// The copy is removed when the new reader is closed or dropped.
    pub fn duplicate(&self) -> Result<ContentReader> {
        let path = self.file_path.as_deref().ok_or(ContentError::Closed)?;
        let copy = copy_to_temp_content_file(path)?;
        let mut dup = ContentReader::from_temp(copy, self.array_key.clone())
            .with_buffer_capacity(self.buffer_capacity);
        dup.length = self.length;
        Ok(dup)
    }

    /// Stop streaming and delete the backing file. Later reads fail with [`ContentError::Closed`].
    /// Idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.stop_stream();
        self.errors.clear();
        if let Some(path) = &self.file_path {
            std::fs::remove_file(path).map_err(|source| ContentError::Io {
                path: path.clone(),
                source,
            })?;
            debug!("removed content file {}", path.display());
        }
        self.file_path = None;
        Ok(())
    }

    /// Delete the current backing file and bind the reader to `new_path` (treated as caller-owned).
    pub fn set_file_path(&mut self, new_path: impl Into<PathBuf>) -> Result<()> {
        self.close()?;
        self.file_path = Some(new_path.into());
        self.owns_file = false;
        self.length = None;
        self.consumed = 0;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let path = self.file_path.clone().ok_or(ContentError::Closed)?;
        let (tx, rx) = bounded(self.buffer_capacity);
        let key = self.array_key.clone();
        let errors = Arc::clone(&self.errors);
        let handle = thread::Builder::new()
            .name(format!("{}-decode", PackagePaths::get().pkg_name()))
            .spawn(move || decode_array(path, key, tx, errors))
            .context("spawn decode thread")?;
        self.consumed = 0;
        self.stream = Stream::Running { rx, handle };
        Ok(())
    }

    /// Buffer closed: join the decode thread and report how the pass ended.
    fn finish_pass(&mut self) -> Result<Option<GenericRecord>> {
        if let Stream::Running { handle, .. } = std::mem::replace(&mut self.stream, Stream::Drained)
            && handle.join().is_err()
        {
            self.errors
                .add_error(anyhow::anyhow!("decode thread panicked"));
        }
        match self.errors.take_error() {
            Some(err) => Err(err),
            None => {
                self.length = Some(self.consumed);
                Ok(None)
            }
        }
    }

    fn stop_stream(&mut self) {
        if let Stream::Running { rx, handle } =
            std::mem::replace(&mut self.stream, Stream::NotStarted)
        {
            // Dropping the receiver wakes a decode thread blocked on a full buffer.
            drop(rx);
            if handle.join().is_err() {
                error!(
                    "decode thread panicked while stopping {}",
                    self.file_path
                        .as_deref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default()
                );
            }
        }
        self.stream = Stream::NotStarted;
    }
}

impl Drop for ContentReader {
    fn drop(&mut self) {
        self.stop_stream();
        if self.owns_file
            && let Some(path) = self.file_path.take()
        {
            remove_content_file(&path);
        }
    }
}

fn open_content(path: &Path) -> Result<BufReader<File>, ContentError> {
    let file = File::open(path).map_err(|source| ContentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::with_capacity(READ_BUFFER_SIZE, file))
}

/// Decode thread body. Errors go to `errors`; closing `tx` (by returning) ends the pass.
fn decode_array(
    path: PathBuf,
    key: String,
    tx: Sender<GenericRecord>,
    errors: Arc<ErrorsQueue>,
) {
    match stream_elements(&path, &key, &tx) {
        Ok(sent) => debug!("decoded {} records from {}", sent, path.display()),
        Err(err) => {
            error!("{}", err);
            errors.add_error(err.into());
        }
    }
}

fn stream_elements(
    path: &Path,
    key: &str,
    tx: &Sender<GenericRecord>,
) -> Result<usize, ContentError> {
    let summary = scan_array(open_content(path)?, path, key, |record| {
        if tx.send(record).is_ok() {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    })?;
    if summary.stopped {
        debug!("reader restarted or dropped; stopped decoding {}", path.display());
        return Ok(summary.elements - 1);
    }
    Ok(summary.elements)
}
