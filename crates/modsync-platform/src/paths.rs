use std::path::PathBuf;
use thiserror::Error;

const APP_DIR: &str = "modsync";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppPathsError {
    #[error("Could not determine home directory")]
    HomeDirUnavailable,
    #[error("Could not determine config directory")]
    ConfigDirUnavailable,
    #[error("Could not determine cache directory")]
    CacheDirUnavailable,
    #[error("Could not determine data directory")]
    DataDirUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Resolve per-user application directories for the current platform.
    ///
    /// # Errors
    /// Returns an error when a required base directory cannot be determined.
    pub fn new() -> Result<Self, AppPathsError> {
        #[cfg(target_os = "macos")]
        {
            let home = dirs::home_dir().ok_or(AppPathsError::HomeDirUnavailable)?;
            Ok(Self::under(
                home.join("Library/Application Support").join(APP_DIR),
                home.join("Library/Caches").join(APP_DIR),
                home.join("Library/Application Support").join(APP_DIR),
            ))
        }

        #[cfg(not(target_os = "macos"))]
        {
            Ok(Self::under(
                dirs::config_dir()
                    .ok_or(AppPathsError::ConfigDirUnavailable)?
                    .join(APP_DIR),
                dirs::cache_dir()
                    .ok_or(AppPathsError::CacheDirUnavailable)?
                    .join(APP_DIR),
                dirs::data_dir()
                    .ok_or(AppPathsError::DataDirUnavailable)?
                    .join(APP_DIR),
            ))
        }
    }

    fn under(config_dir: PathBuf, cache_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            config_dir,
            cache_dir,
            data_dir,
        }
    }

    /// Paths rooted in a single directory, for portable installs and tests.
    #[must_use]
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self::under(root.join("config"), root.join("cache"), root.join("data"))
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    /// Directory of the durable bundle cache, one file per entry.
    #[must_use]
    pub fn bundle_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("bundles")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("debug.log")
    }

    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(self.bundle_cache_dir())?;
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}
