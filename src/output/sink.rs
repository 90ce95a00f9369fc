//! Durable sink: commit a whole batch via temp file + atomic rename.
//!
//! The destination either holds the complete new batch or is untouched.
//! When the primary rename fails (target locked by a tailing reader, not a
//! file, ...) the batch lands at `<path>.new` instead.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile, PersistError};

use crate::core::errors::{Result, SnapError};

/// Where a batch ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkOutcome {
    pub destination: PathBuf,
    pub used_fallback: bool,
    pub lines: usize,
    /// Why the primary path was skipped, when it was.
    pub primary_error: Option<String>,
}

/// Commits a complete batch of lines to a destination.
pub trait BatchWriter {
    /// Replace `path` with `lines`, each terminated by `\n`.
    fn write_batch(&self, lines: &[String], path: &Path) -> Result<SinkOutcome>;
}

impl<T: BatchWriter + ?Sized> BatchWriter for &T {
    fn write_batch(&self, lines: &[String], path: &Path) -> Result<SinkOutcome> {
        (**self).write_batch(lines, path)
    }
}

/// Whole-file NDJSON writer.
#[derive(Debug, Clone, Default)]
pub struct DurableSink {
    scratch_dir: Option<PathBuf>,
}

impl DurableSink {
    /// `scratch_dir = None` stages in the system temp directory.
    #[must_use]
    pub fn new(scratch_dir: Option<PathBuf>) -> Self {
        Self { scratch_dir }
    }

    fn stage(&self, lines: &[String]) -> Result<NamedTempFile> {
        let scratch = self.scratch_dir.clone().unwrap_or_else(env::temp_dir);
        fs::create_dir_all(&scratch).map_err(|e| SnapError::io(&scratch, e))?;
        let mut tmp = Builder::new()
            .prefix("tasksnap-")
            .suffix(".ndjson.tmp")
            .tempfile_in(&scratch)
            .map_err(|e| SnapError::io(&scratch, e))?;
        write_lines(tmp.as_file_mut(), lines).map_err(|e| SnapError::io(tmp.path(), e))?;
        Ok(tmp)
    }
}

impl BatchWriter for DurableSink {
    fn write_batch(&self, lines: &[String], path: &Path) -> Result<SinkOutcome> {
        let staged = self.stage(lines)?;
        if let Some(parent) = non_empty_parent(path) {
            fs::create_dir_all(parent).map_err(|e| SnapError::io(parent, e))?;
        }

        match commit(staged, path) {
            Ok(()) => Ok(SinkOutcome {
                destination: path.to_path_buf(),
                used_fallback: false,
                lines: lines.len(),
                primary_error: None,
            }),
            Err(PersistError { error, file }) => {
                let alternate = fallback_path(path);
                commit(file, &alternate).map_err(|e| SnapError::io(&alternate, e.error))?;
                Ok(SinkOutcome {
                    destination: alternate,
                    used_fallback: true,
                    lines: lines.len(),
                    primary_error: Some(error.to_string()),
                })
            }
        }
    }
}

/// `<path>.new`, the secondary destination.
#[must_use]
pub fn fallback_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".new");
    PathBuf::from(name)
}

// ──── helpers ────

fn write_lines(file: &mut fs::File, lines: &[String]) -> io::Result<()> {
    let mut writer = BufWriter::new(&mut *file);
    for line in lines {
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    drop(writer);
    file.sync_all()
}

/// Rename onto `target`; when the scratch dir sits on another volume, copy
/// into a sibling of `target` first so the final step is still a rename.
fn commit(tmp: NamedTempFile, target: &Path) -> std::result::Result<(), PersistError> {
    let PersistError { error, file } = match tmp.persist(target) {
        Ok(_) => return Ok(()),
        Err(e) => e,
    };
    if error.kind() != io::ErrorKind::CrossesDevices {
        return Err(PersistError { error, file });
    }
    let dir = non_empty_parent(target).unwrap_or_else(|| Path::new("."));
    let staged = Builder::new()
        .prefix(".tasksnap-")
        .tempfile_in(dir)
        .and_then(|sibling| fs::copy(file.path(), sibling.path()).map(|_| sibling));
    match staged {
        Ok(sibling) => sibling
            .persist(target)
            .map(|_| ())
            .map_err(|e| PersistError { error: e.error, file }),
        Err(copy_error) => Err(PersistError {
            error: copy_error,
            file,
        }),
    }
}

fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}
