//! Finds a named top-level array with `serde_json` and hands its elements out one at a time.
//!
//! The document is walked through a `DeserializeSeed`: other top-level values are skipped as
//! `IgnoredAny` (never built), and each array element is decoded into a [`GenericRecord`] and
//! passed to a callback before the next one is read.

use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::error::Category;
use std::fmt;
use std::io::Read;
use std::ops::ControlFlow;
use std::path::Path;

use crate::GenericRecord;
use crate::errors::ContentError;

/// Error text used to unwind the deserializer when the callback asks to stop.
const STOPPED: &str = "element consumer stopped";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ScanSummary {
    /// Elements handed to the callback.
    pub(crate) elements: usize,
    /// The callback returned `Break` before the end of the array.
    pub(crate) stopped: bool,
}

struct ScanState<'k, F> {
    key: &'k str,
    on_element: F,
    found: bool,
    elements: usize,
    stopped: bool,
}

/// Stream the array under top-level `key` of `reader` into `on_element`.
///
/// Only the first occurrence of `key` is streamed. Unless the callback stops early, the rest of
/// the document is still validated. A document without `key` gives [`ContentError::NotFound`].
pub(crate) fn scan_array<R, F>(
    reader: R,
    path: &Path,
    key: &str,
    on_element: F,
) -> Result<ScanSummary, ContentError>
where
    R: Read,
    F: FnMut(GenericRecord) -> ControlFlow<()>,
{
    let mut state = ScanState {
        key,
        on_element,
        found: false,
        elements: 0,
        stopped: false,
    };
    let mut de = serde_json::Deserializer::from_reader(reader);
    let scanned = TopLevel(&mut state)
        .deserialize(&mut de)
        .and_then(|()| de.end());
    match scanned {
        Ok(()) => {}
        Err(_) if state.stopped => {}
        Err(e) => return Err(json_error(path, e)),
    }
    if !state.found {
        return Err(ContentError::NotFound {
            key: key.to_string(),
            path: path.to_path_buf(),
        });
    }
    Ok(ScanSummary {
        elements: state.elements,
        stopped: state.stopped,
    })
}

fn json_error(path: &Path, e: serde_json::Error) -> ContentError {
    match e.classify() {
        Category::Io => ContentError::Io {
            path: path.to_path_buf(),
            source: e.into(),
        },
        Category::Syntax | Category::Data | Category::Eof => ContentError::Malformed {
            path: path.to_path_buf(),
            line: e.line(),
            column: e.column(),
            msg: e.to_string(),
        },
    }
}

/// Seed for the whole document: an object whose keys are matched against the wanted one.
struct TopLevel<'s, 'k, F>(&'s mut ScanState<'k, F>);

impl<'de, F> DeserializeSeed<'de> for TopLevel<'_, '_, F>
where
    F: FnMut(GenericRecord) -> ControlFlow<()>,
{
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, F> Visitor<'de> for TopLevel<'_, '_, F>
where
    F: FnMut(GenericRecord) -> ControlFlow<()>,
{
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object at top level")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        while let Some(name) = map.next_key::<String>()? {
            if !self.0.found && name == self.0.key {
                self.0.found = true;
                map.next_value_seed(Elements(&mut *self.0))?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(())
    }
}

/// Seed for the wanted array: every element goes to the callback as soon as it is decoded.
struct Elements<'s, 'k, F>(&'s mut ScanState<'k, F>);

impl<'de, F> DeserializeSeed<'de> for Elements<'_, '_, F>
where
    F: FnMut(GenericRecord) -> ControlFlow<()>,
{
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, F> Visitor<'de> for Elements<'_, '_, F>
where
    F: FnMut(GenericRecord) -> ControlFlow<()>,
{
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "an array of objects under '{}'", self.0.key)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        while let Some(record) = seq.next_element::<GenericRecord>()? {
            self.0.elements += 1;
            if (self.0.on_element)(record).is_break() {
                self.0.stopped = true;
                return Err(de::Error::custom(STOPPED));
            }
        }
        Ok(())
    }
}
