use std::io::Write;
use std::path::{Component, Path, PathBuf};

use log::{debug, warn};
use modsync_backend::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("refusing to write outside the target directory: {path}")]
    UnsafePath { path: String },
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl WriteError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

impl From<WriteError> for SyncError {
    fn from(error: WriteError) -> Self {
        match error {
            WriteError::UnsafePath { .. } => SyncError::malformed_from("config file path", error),
            WriteError::Io { .. } => SyncError::install_failed_from("write files", error),
        }
    }
}

/// A file this process wrote, and whether it replaced an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub existed: bool,
}

/// One file, or a set of files relative to a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRequest {
    SingleFile {
        path: PathBuf,
        content: Vec<u8>,
    },
    FileSet {
        dir: PathBuf,
        /// `(relative path, content)`; relative paths may not leave `dir`.
        files: Vec<(String, Vec<u8>)>,
    },
}

impl WriteRequest {
    /// Write every file atomically, creating parent directories as needed.
    ///
    /// Paths of a file set are all validated before anything is written.
    /// When a write fails part way, files this call created are removed
    /// again; files it replaced keep their new content.
    ///
    /// # Errors
    /// Returns [`WriteError::UnsafePath`] for a relative path that is absolute
    /// or climbs out of `dir`, and [`WriteError::Io`] when a write fails.
    pub fn apply(&self) -> Result<Vec<WrittenFile>, WriteError> {
        match self {
            Self::SingleFile { path, content } => Ok(vec![write_one(path, content)?]),
            Self::FileSet { dir, files } => {
                let targets = files
                    .iter()
                    .map(|(relative, content)| {
                        validate_relative_path(relative).map(|safe| (dir.join(safe), content))
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                let mut written = Vec::with_capacity(targets.len());
                for (path, content) in targets {
                    match write_one(&path, content) {
                        Ok(file) => written.push(file),
                        Err(error) => {
                            remove_created(&written);
                            return Err(error);
                        }
                    }
                }
                debug!("Wrote {} files under {}", written.len(), dir.display());
                Ok(written)
            }
        }
    }
}

/// Normalize a forward- or back-slash separated relative path, rejecting
/// absolute paths and any `..` component.
///
/// # Errors
/// Returns [`WriteError::UnsafePath`] when the path is empty, absolute, or
/// contains a parent-directory component.
pub fn validate_relative_path(relative: &str) -> Result<PathBuf, WriteError> {
    let unsafe_path = || WriteError::UnsafePath {
        path: relative.to_string(),
    };
    let normalized = relative.replace('\\', "/");
    let mut safe = PathBuf::new();

    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => safe.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(unsafe_path());
            }
        }
    }

    if safe.as_os_str().is_empty() {
        return Err(unsafe_path());
    }
    Ok(safe)
}

/// Remove the files in `written` that did not exist before they were
/// written. Failures are logged and skipped.
pub fn remove_created(written: &[WrittenFile]) {
    for file in written.iter().filter(|file| !file.existed) {
        if let Err(error) = std::fs::remove_file(&file.path) {
            warn!("Failed to remove {}: {error}", file.path.display());
        }
    }
}

fn write_one(path: &Path, content: &[u8]) -> Result<WrittenFile, WriteError> {
    let existed = path.exists();
    write_atomic(path, content).map_err(|source| WriteError::io(path, source))?;
    Ok(WrittenFile {
        path: path.to_path_buf(),
        existed,
    })
}

/// Write through a temporary file in the destination directory and rename it
/// into place, so readers never observe a partial file.
///
/// # Errors
/// Returns an error if the parent directory cannot be created or the
/// temporary file cannot be written or persisted.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent")
    })?;
    std::fs::create_dir_all(parent)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".modsync-")
        .suffix(".tmp")
        .tempfile_in(parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|error| error.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use modsync_backend::{ErrorKind, SyncError};

    use super::{WriteError, WriteRequest, validate_relative_path, write_atomic};

    #[test]
    fn single_file_is_written_with_parents() {
        let dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = dir.path().join("nested/options.txt");

        let written = WriteRequest::SingleFile {
            path: path.clone(),
            content: b"fov:90".to_vec(),
        }
        .apply()
        .expect("write succeeds");

        assert_eq!(written.len(), 1);
        assert!(!written[0].existed);
        assert_eq!(std::fs::read(&path).expect("file exists"), b"fov:90");
    }

    #[test]
    fn file_set_writes_relative_to_dir_and_reports_replacements() {
        let dir = tempfile::tempdir().expect("temporary directory should be created");
        std::fs::create_dir_all(dir.path().join("config")).expect("create config dir");
        std::fs::write(dir.path().join("config/jei.toml"), "old").expect("seed file");

        let written = WriteRequest::FileSet {
            dir: dir.path().to_path_buf(),
            files: vec![
                ("config/jei.toml".to_string(), b"new".to_vec()),
                ("config\\sodium\\options.json".to_string(), b"{}".to_vec()),
            ],
        }
        .apply()
        .expect("write succeeds");

        assert!(written[0].existed);
        assert!(!written[1].existed);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("config/jei.toml")).expect("read"),
            "new"
        );
        assert!(dir.path().join("config/sodium/options.json").is_file());
    }

    #[test]
    fn escaping_paths_are_rejected_before_writing() {
        let dir = tempfile::tempdir().expect("temporary directory should be created");

        let result = WriteRequest::FileSet {
            dir: dir.path().to_path_buf(),
            files: vec![
                ("config/ok.toml".to_string(), b"a".to_vec()),
                ("../escape.toml".to_string(), b"b".to_vec()),
            ],
        }
        .apply();

        assert!(matches!(result, Err(WriteError::UnsafePath { .. })));
        assert!(!dir.path().join("config/ok.toml").exists());
    }

    #[test]
    fn relative_path_validation() {
        assert_eq!(
            validate_relative_path("./config/a.toml").expect("valid"),
            PathBuf::from("config").join("a.toml")
        );
        assert!(validate_relative_path("/etc/passwd").is_err());
        assert!(validate_relative_path("config/../../x").is_err());
        assert!(validate_relative_path("").is_err());
        assert!(validate_relative_path(".").is_err());
    }

    #[test]
    fn write_errors_map_into_sync_errors() {
        let unsafe_path: SyncError = WriteError::UnsafePath {
            path: "../x".to_string(),
        }
        .into();
        assert_eq!(unsafe_path.kind(), ErrorKind::Malformed);

        let io: SyncError = WriteError::Io {
            path: "x".to_string(),
            source: std::io::Error::other("disk full"),
        }
        .into();
        assert_eq!(io.kind(), ErrorKind::Install);
    }

    #[test]
    fn atomic_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = dir.path().join("entry.json");
        std::fs::write(&path, "{not-valid-json").expect("seed file");

        write_atomic(&path, b"{}").expect("write succeeds");

        assert_eq!(std::fs::read_to_string(&path).expect("read"), "{}");
        let leftovers = std::fs::read_dir(dir.path())
            .expect("read temp dir entries")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
