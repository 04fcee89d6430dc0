use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::utils::config::PackagePaths;

/// Create an empty, persisted temp content file in the system temp dir.
/// The caller owns the returned path and is responsible for removing it.
pub fn create_temp_content_file() -> Result<(File, PathBuf)> {
    let paths = PackagePaths::get();
    let temp = tempfile::Builder::new()
        .prefix(paths.temp_prefix())
        .suffix(paths.temp_suffix())
        .tempfile()
        .context("create temp content file")?;
    let (file, path) = temp
        .keep()
        .map_err(|e| anyhow::anyhow!("persist temp content file: {}", e.error))?;
    Ok((file, path))
}

/// Copy `src` byte-for-byte into a new temp content file and return its path.
/// The partial copy is removed when copying fails.
pub fn copy_to_temp_content_file(src: &Path) -> Result<PathBuf> {
    let input = File::open(src).with_context(|| format!("open {}", src.display()))?;
    let (out, temp_path) = create_temp_content_file()?;
    let copied = (|| -> io::Result<u64> {
        let mut reader = BufReader::new(input);
        let mut writer = BufWriter::new(out);
        let n = io::copy(&mut reader, &mut writer)?;
        writer.flush()?;
        Ok(n)
    })();
    match copied {
        Ok(n) => {
            log::debug!(
                "copied {} bytes: {} -> {}",
                n,
                src.display(),
                temp_path.display()
            );
            Ok(temp_path)
        }
        Err(e) => {
            remove_content_file(&temp_path);
            Err(e).with_context(|| {
                format!("copy {} -> {}", src.display(), temp_path.display())
            })
        }
    }
}

/// Best-effort removal for cleanup paths (drop, failed copy). Missing files are ignored.
pub fn remove_content_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        log::warn!("failed to remove {}: {}", path.display(), e);
    }
}
