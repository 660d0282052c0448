//! Whole-file replacement.
//!
//! Every persisted object is written to a sibling temp file, flushed,
//! optionally fsynced and renamed over the target, so a crash leaves either
//! the old or the new contents and never a truncated file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Result as IoResult, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

const TEMP_MARKER: &str = ".tmp.";

/// A pending replacement of one file.
///
/// Dropping an unfinished write removes its temp file.
pub struct AtomicWrite {
    temp_path: Option<PathBuf>,
    final_path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl AtomicWrite {
    /// Opens a temp file next to `final_path`.
    pub fn begin(final_path: &Path) -> IoResult<Self> {
        let mut name = final_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!("{TEMP_MARKER}{}", Uuid::new_v4()));
        let temp_path = final_path.with_file_name(name);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;

        Ok(Self {
            temp_path: Some(temp_path),
            final_path: final_path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Appends bytes to the pending contents.
    pub fn write_all(&mut self, bytes: &[u8]) -> IoResult<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "writer already consumed")
        })?;
        writer.write_all(bytes)
    }

    /// Flushes, optionally fsyncs, and renames over the target.
    ///
    /// This is the commit point.
    pub fn commit(mut self, sync: bool) -> IoResult<()> {
        let mut writer = self.writer.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "writer already consumed")
        })?;
        let temp_path = self.temp_path.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "temp_path already consumed")
        })?;

        writer.flush()?;
        if sync {
            writer.get_ref().sync_all()?;
        }
        drop(writer);

        if let Err(e) = fs::rename(&temp_path, &self.final_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
        Ok(())
    }
}

impl Drop for AtomicWrite {
    fn drop(&mut self) {
        self.writer.take();
        if let Some(ref temp_path) = self.temp_path {
            let _ = fs::remove_file(temp_path);
        }
    }
}

/// Replaces `path` with `bytes` in one step.
pub fn replace_file(path: &Path, bytes: &[u8], sync: bool) -> IoResult<()> {
    let mut write = AtomicWrite::begin(path)?;
    write.write_all(bytes)?;
    write.commit(sync)
}

/// Returns true if `path` names a temp file left by an interrupted write.
#[must_use]
pub fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains(TEMP_MARKER))
}

/// Deletes temp files left in `dir` by interrupted writes.
///
/// Returns how many were removed.
pub fn sweep_temp_files(dir: &Path) -> IoResult<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if is_temp_file(&path) && fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_replace_file_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("projects.json");
        replace_file(&path, b"first", true).unwrap();
        replace_file(&path, b"second", false).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_dropped_write_leaves_target_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profile.json");
        replace_file(&path, b"original", true).unwrap();

        {
            let mut write = AtomicWrite::begin(&path).unwrap();
            write.write_all(b"partial").unwrap();
        }

        assert_eq!(fs::read(&path).unwrap(), b"original");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_sweep_removes_only_temp_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("abc.json"), b"{}").unwrap();
        fs::write(dir.path().join("abc.json.tmp.1234"), b"{").unwrap();
        assert_eq!(sweep_temp_files(dir.path()).unwrap(), 1);
        assert!(dir.path().join("abc.json").exists());
    }
}
