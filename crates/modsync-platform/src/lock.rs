use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use modsync_backend::SyncError;
use thiserror::Error;

const LOCK_FILE_NAME: &str = ".modsync.lock";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another modsync process is installing into {path}")]
    Busy { path: String },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl LockError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}

impl From<LockError> for SyncError {
    fn from(error: LockError) -> Self {
        SyncError::install_failed_from("lock target directory", error)
    }
}

/// Exclusive advisory lock on a modpack directory, held while installing.
///
/// Released when dropped.
#[derive(Debug)]
pub struct TargetLock {
    file: File,
    path: PathBuf,
}

impl TargetLock {
    /// # Errors
    /// Returns [`LockError::Busy`] when another process holds the lock, and
    /// [`LockError::Io`] when the lock file cannot be created or written.
    pub fn acquire(target_dir: &Path) -> Result<Self, LockError> {
        std::fs::create_dir_all(target_dir)
            .map_err(|error| LockError::io("failed to create target directory", error))?;
        let path = target_dir.join(LOCK_FILE_NAME);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|error| LockError::io("failed to open install lock file", error))?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                return Err(LockError::Busy {
                    path: target_dir.display().to_string(),
                });
            }
            Err(error) => {
                return Err(LockError::io("failed to acquire install lock", error));
            }
        }

        file.set_len(0)
            .and_then(|()| file.seek(SeekFrom::Start(0)).map(|_| ()))
            .and_then(|()| writeln!(file, "{}", std::process::id()))
            .map_err(|error| LockError::io("failed to write install lock metadata", error))?;

        Ok(Self { file, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::{LockError, TargetLock};

    #[test]
    fn second_lock_on_same_dir_is_busy_until_released() {
        let dir = tempfile::tempdir().expect("temporary directory should be created");

        let first = TargetLock::acquire(dir.path()).expect("first lock");
        assert!(first.path().exists());
        assert!(matches!(
            TargetLock::acquire(dir.path()),
            Err(LockError::Busy { .. })
        ));

        drop(first);
        assert!(TargetLock::acquire(dir.path()).is_ok());
    }
}
