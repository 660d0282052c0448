//! Advisory lock on a data directory.
//!
//! The subsystem has a single-writer model: one process owns a data
//! directory at a time. The lock file is `<dir>/.lock`; the lock is held
//! for the lifetime of [`DirectoryLock`] and released when the file handle
//! closes.

use std::fs::{File, OpenOptions};
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::{Path, PathBuf};

/// Exclusive lock on a data directory.
#[derive(Debug)]
pub struct DirectoryLock {
    _file: File,
    path: PathBuf,
}

impl DirectoryLock {
    /// Name of the lock file inside the locked directory.
    pub const FILE_NAME: &'static str = ".lock";

    /// Takes the lock without blocking.
    ///
    /// # Errors
    /// - `ErrorKind::WouldBlock` if another process holds the lock
    /// - any error from creating the lock file
    pub fn acquire(dir: &Path) -> IoResult<Self> {
        let path = dir.join(Self::FILE_NAME);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        lock_exclusive(&file)?;

        Ok(Self { _file: file, path })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> IoResult<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `file` and valid for the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(());
    }

    let err = IoError::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        return Err(IoError::new(
            ErrorKind::WouldBlock,
            "data directory is locked by another process",
        ));
    }
    Err(err)
}

#[cfg(windows)]
fn lock_exclusive(file: &File) -> IoResult<()> {
    use std::os::windows::io::AsRawHandle;
    use windows_sys::Win32::Foundation::HANDLE;
    use windows_sys::Win32::Storage::FileSystem::{
        LockFileEx, LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY,
    };

    let handle = file.as_raw_handle() as HANDLE;
    // SAFETY: the handle is owned by `file`; OVERLAPPED is plain data.
    let ok = unsafe {
        let mut overlapped = std::mem::zeroed::<windows_sys::Win32::System::IO::OVERLAPPED>();
        LockFileEx(
            handle,
            LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
            0,
            1,
            0,
            &mut overlapped,
        )
    };

    if ok == 0 {
        let err = IoError::last_os_error();
        return Err(IoError::new(
            ErrorKind::WouldBlock,
            format!("data directory is locked by another process: {err}"),
        ));
    }
    Ok(())
}

#[cfg(not(any(unix, windows)))]
fn lock_exclusive(_file: &File) -> IoResult<()> {
    Err(IoError::new(
        ErrorKind::Unsupported,
        "directory locking is not supported on this platform",
    ))
}
