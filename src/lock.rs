//! Advisory write locks.
//!
//! A writer signals "in use" by creating a sibling file named
//! `<original-name>.lock` for the duration of the write. Presence of
//! the lock file is the whole protocol; concurrent writers to the same
//! logical file are a caller error the codec does not detect.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

pub const LOCK_SUFFIX: &str = "lock";

/// Lock path for a container file: the full file name plus `.lock`.
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

/// Holds the advisory lock file; removed on release or drop.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    armed: bool,
}

impl LockFile {
    /// Take the lock for `target`. Fails with [`Error::LockHeld`] if a
    /// lock file already exists.
    pub fn acquire(target: &Path) -> Result<Self> {
        let path = lock_path(target);
        match OpenOptions::new().create_new(true).write(true).open(&path) {
            Ok(_) => Ok(Self { path, armed: true }),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(Error::LockHeld(path)),
            Err(err) => Err(err.into()),
        }
    }

    /// Remove the lock file.
    pub fn release(mut self) -> Result<()> {
        self.armed = false;
        std::fs::remove_file(&self.path)?;
        Ok(())
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
