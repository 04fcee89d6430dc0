//! Writes records into a content file (`{"<key>":[ ... ]}`) one at a time.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::content::ContentReader;
use crate::utils::tempfiles::{create_temp_content_file, remove_content_file};

/// Bytes read from the end of a file when looking for the closing `]}`.
const TAIL_WINDOW: u64 = 64;

/// Streaming writer producing files [`ContentReader`] can read.
///
/// Output layout: `{"<key>":[\n<record>,\n<record>\n]}\n`.
/// A writer that created its own temp file removes it when dropped without [`close`](Self::close).
pub struct ContentWriter {
    out: BufWriter<File>,
    path: PathBuf,
    array_key: String,
    has_elements: bool,
    written: usize,
    remove_on_drop: bool,
    closed: bool,
}

impl ContentWriter {
    /// Start a new temp content file.
    pub fn new(array_key: impl Into<String>) -> Result<Self> {
        let (file, path) = create_temp_content_file()?;
        let mut writer = Self {
            out: BufWriter::new(file),
            path,
            array_key: array_key.into(),
            has_elements: false,
            written: 0,
            remove_on_drop: true,
            closed: false,
        };
        writer.out.write_all(b"{")?;
        serde_json::to_writer(&mut writer.out, &writer.array_key)?;
        writer.out.write_all(b":[")?;
        Ok(writer)
    }

    /// Continue the array of an existing file written by [`ContentWriter`] (the array must be the
    /// last top-level field). The file is never removed by this writer.
    pub fn append(path: impl Into<PathBuf>, array_key: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let array_key = array_key.into();
        let has_elements = !ContentReader::new(&path, array_key.clone())
            .is_empty()
            .with_context(|| format!("append to {}", path.display()))?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("open {} for append", path.display()))?;
        let Some(close_at) = find_array_close(&mut file)
            .with_context(|| format!("read tail of {}", path.display()))?
        else {
            bail!("{} does not end with a closed array", path.display());
        };
        file.set_len(close_at)
            .with_context(|| format!("truncate {}", path.display()))?;
        file.seek(SeekFrom::End(0))?;
        log::debug!(
            "appending to {} (existing elements: {})",
            path.display(),
            has_elements
        );
        Ok(Self {
            out: BufWriter::new(file),
            path,
            array_key,
            has_elements,
            written: 0,
            remove_on_drop: false,
            closed: false,
        })
    }

    /// Append one record. It should serialize to a JSON object.
    pub fn write<S: Serialize + ?Sized>(&mut self, record: &S) -> Result<()> {
        let sep: &[u8] = if self.has_elements { b",\n" } else { b"\n" };
        self.out.write_all(sep)?;
        serde_json::to_writer(&mut self.out, record).with_context(|| {
            format!(
                "serialize record #{} to {}",
                self.written,
                self.path.display()
            )
        })?;
        self.has_elements = true;
        self.written += 1;
        Ok(())
    }

    /// Records written by this writer (not counting pre-existing ones when appending).
    pub fn count(&self) -> usize {
        self.written
    }

    pub fn array_key(&self) -> &str {
        &self.array_key
    }

    pub fn file_path(&self) -> &Path {
        &self.path
    }

    /// Close the array and return the file path. The caller now owns the file.
    pub fn close(mut self) -> Result<PathBuf> {
        self.out.write_all(b"\n]}\n")?;
        self.out
            .flush()
            .with_context(|| format!("flush {}", self.path.display()))?;
        self.closed = true;
        log::debug!("wrote {} records to {}", self.written, self.path.display());
        Ok(self.path.clone())
    }
}

impl Drop for ContentWriter {
    fn drop(&mut self) {
        if !self.closed && self.remove_on_drop {
            remove_content_file(&self.path);
        }
    }
}

/// Offset of the `]` in the trailing `]}` (whitespace allowed around both).
fn find_array_close(file: &mut File) -> std::io::Result<Option<u64>> {
    let len = file.metadata()?.len();
    let window = len.min(TAIL_WINDOW);
    let start = len - window;
    file.seek(SeekFrom::Start(start))?;
    let mut tail = Vec::with_capacity(window as usize);
    file.read_to_end(&mut tail)?;
    let mut significant = tail
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, b)| !b.is_ascii_whitespace());
    match (significant.next(), significant.next()) {
        (Some((_, &b'}')), Some((i, &b']'))) => Ok(Some(start + i as u64)),
        _ => Ok(None),
    }
}
