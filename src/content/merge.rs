use anyhow::{Context, Result};
use log::debug;

use crate::content::{ContentReader, ContentWriter};

/// Concatenate `readers` (in order, each in its own order) into a new reader over a temp file.
///
/// Each input is drained and then closed, which deletes its file. The first error from any input
/// aborts the merge: the partial output is removed and inputs not yet reached are left alone
/// (dropped without deleting caller-owned files). Zero inputs give an empty reader.
pub fn merge_readers(readers: Vec<ContentReader>, array_key: &str) -> Result<ContentReader> {
    let inputs = readers.len();
    let mut writer = ContentWriter::new(array_key)?;
    for (i, mut reader) in readers.into_iter().enumerate() {
        while let Some(record) = reader
            .next_value()
            .with_context(|| format!("merge: read input #{}", i))?
        {
            writer.write(&record)?;
        }
        reader
            .close()
            .with_context(|| format!("merge: close input #{}", i))?;
    }
    let total = writer.count();
    let path = writer.close()?;
    debug!(
        "merged {} readers ({} records) into {}",
        inputs,
        total,
        path.display()
    );
    Ok(ContentReader::from_temp(path, array_key).with_known_length(total))
}
