//! Whole-file writes via temp file + rename.
//!
//! The temp file lives in the destination directory so the final rename never
//! crosses filesystems. If the writer fails, the destination is untouched.
//! Several files can be staged first and committed together once all of them
//! were written.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::WriteError;

/// Contents fully written and synced next to `path`, not yet visible there.
/// Dropping it without [`StagedFile::commit`] removes the temp file.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    tmp: NamedTempFile,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the temp file over the destination.
    pub fn commit(self) -> Result<PathBuf, WriteError> {
        let Self { path, tmp } = self;
        match tmp.persist(&path) {
            Ok(_) => Ok(path),
            Err(e) => Err(WriteError { path, source: e.error }),
        }
    }
}

/// Write the whole file to a temp file in the destination directory.
pub fn stage_atomic<F>(path: &Path, write: F) -> Result<StagedFile, WriteError>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let wrap = |source: io::Error| WriteError {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(wrap)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(wrap)?;
    {
        let mut out = BufWriter::new(tmp.as_file_mut());
        write(&mut out).map_err(wrap)?;
        out.flush().map_err(wrap)?;
    }
    tmp.as_file().sync_all().map_err(wrap)?;
    Ok(StagedFile {
        path: path.to_path_buf(),
        tmp,
    })
}

pub fn write_atomic<F>(path: &Path, write: F) -> Result<(), WriteError>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    stage_atomic(path, write)?.commit()?;
    Ok(())
}
