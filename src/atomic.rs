//! Staging a database file beside its destination so that a failed write
//! leaves the destination exactly as it was.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::debug;

use crate::error::{Error, Result};

/// A temporary copy of the destination in the same directory. Dropping it
/// deletes the copy; [`StagedFile::commit`] renames it over the destination.
#[derive(Debug)]
pub struct StagedFile {
    temp: TempPath,
    destination: PathBuf,
}

impl StagedFile {
    /// Create the staging file. With `copy_existing`, the destination's
    /// current bytes are copied in first so appends see existing tables.
    pub fn stage(destination: &Path, copy_existing: bool) -> Result<Self> {
        // 1) Same directory as the destination, so the final rename cannot
        //    cross filesystems.
        let dir = match destination.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let prefix = format!(
            ".{}.",
            destination
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        let temp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(dir)?
            .into_temp_path();

        // 2) Seed it with the current contents.
        if copy_existing && destination.exists() {
            fs::copy(destination, &temp)?;
        }
        debug!(staged = %temp.display(), destination = %destination.display(), "staged");
        Ok(Self {
            temp,
            destination: destination.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.temp
    }

    /// Move the staged file over the destination.
    pub fn commit(self) -> Result<()> {
        let destination = self.destination;
        self.temp.persist(&destination).map_err(|e| Error::Persist {
            path: destination.display().to_string(),
            source: e.error,
        })?;
        debug!(destination = %destination.display(), "staged file moved into place");
        Ok(())
    }
}
