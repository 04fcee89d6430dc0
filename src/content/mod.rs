//! Content files: stream, copy, write and merge the array stored under one key of a JSON file.

pub mod merge;
pub mod reader;
pub(crate) mod scanner;
pub mod writer;

pub use merge::merge_readers;
pub use reader::{ContentReader, ReaderState};
pub use writer::ContentWriter;
