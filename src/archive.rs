use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::Path;

use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// An entry's resolved path would land outside the destination directory.
    #[error("archive entry escapes destination directory: {0}")]
    ZipSlip(String),
    /// The payload is not a container this service can decode. `.rar` and
    /// `.7z` pass the upstream extension filter but end up here.
    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),
    #[error("archive read error: {0}")]
    Archive(#[from] ZipError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Extract a zip archive held in memory into `destination`.
///
/// Every entry path is checked for lexical containment within the
/// destination before anything is written; the first offending entry fails
/// the whole extraction with [`ExtractError::ZipSlip`]. Extraction stops at
/// the first error of any sort. Entries already materialized stay on disk --
/// cleaning up a partially extracted directory is the caller's job.
pub fn extract_archive(data: &[u8], destination: &Path) -> Result<(), ExtractError> {
    let mut archive = ZipArchive::new(Cursor::new(data)).map_err(|e| match e {
        ZipError::Io(io_err) => ExtractError::Io(io_err),
        other => ExtractError::UnsupportedFormat(other.to_string()),
    })?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| ExtractError::ZipSlip(entry.name().to_string()))?;
        let target = destination.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        // Truncates any file left behind by a previous extraction.
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
        }
    }

    Ok(())
}
