use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;
use modsync_core::{CacheConfig, RetryPolicy, SyncConfig};
use modsync_platform::{AppPaths, write_atomic};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `owner/name` of the repository updates are published to.
    pub repo: Option<String>,
    /// Modpack directory updates are installed into.
    pub target_dir: Option<PathBuf>,
    pub manifest_cache_ttl_secs: u64,
    pub manifest_cache_capacity: usize,
    pub config_cache_ttl_secs: u64,
    pub config_cache_capacity: usize,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub http_timeout_secs: u64,
    pub install_batch_size: usize,
    pub debug_logging: bool,
    pub max_log_size_bytes: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let bundles = CacheConfig::bundles();
        let config_text = CacheConfig::config_text();
        let retry = RetryPolicy::default();

        Self {
            repo: None,
            target_dir: None,
            manifest_cache_ttl_secs: bundles.ttl.as_secs(),
            manifest_cache_capacity: bundles.capacity,
            config_cache_ttl_secs: config_text.ttl.as_secs(),
            config_cache_capacity: config_text.capacity,
            retry_max_attempts: retry.max_attempts(),
            retry_base_delay_ms: u64::try_from(retry.base_delay().as_millis())
                .unwrap_or(u64::MAX),
            http_timeout_secs: 30,
            install_batch_size: modsync_install::DEFAULT_BATCH_SIZE,
            debug_logging: false,
            max_log_size_bytes: 5 * 1024 * 1024,
        }
    }
}

impl Settings {
    pub fn load(paths: &AppPaths) -> Self {
        Self::load_from(&paths.settings_file())
    }

    /// Missing or unreadable files yield the defaults.
    pub fn load_from(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(error) => {
                warn!("Failed to read {}: {error}", path.display());
                return Self::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|error| {
            warn!("Ignoring corrupt settings file {}: {error}", path.display());
            Self::default()
        })
    }

    pub fn save(&self, paths: &AppPaths) -> std::io::Result<()> {
        paths.ensure_dirs()?;
        self.save_to(&paths.settings_file())
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        let content = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &content)
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            retry: RetryPolicy::new(
                self.retry_max_attempts,
                Duration::from_millis(self.retry_base_delay_ms),
            ),
            bundle_cache: CacheConfig::new(
                CacheConfig::bundles().namespace,
                Duration::from_secs(self.manifest_cache_ttl_secs),
                self.manifest_cache_capacity,
            ),
        }
    }

    pub fn config_text_cache(&self) -> CacheConfig {
        CacheConfig::new(
            CacheConfig::config_text().namespace,
            Duration::from_secs(self.config_cache_ttl_secs),
            self.config_cache_capacity,
        )
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::Settings;

    #[test]
    fn defaults_match_cache_and_retry_defaults() {
        let settings = Settings::default();

        assert_eq!(settings.manifest_cache_ttl_secs, 600);
        assert_eq!(settings.manifest_cache_capacity, 50);
        assert_eq!(settings.config_cache_ttl_secs, 900);
        assert_eq!(settings.config_cache_capacity, 30);
        assert_eq!(settings.retry_max_attempts, 4);
        assert_eq!(settings.retry_base_delay_ms, 1000);
        assert_eq!(settings.install_batch_size, 8);
        assert_eq!(settings.max_log_size_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{ "repo": "modsync/packs", "retry_max_attempts": 2, "unknown": true }"#,
        )
        .expect("settings file should be written");

        let settings = Settings::load_from(&path);

        assert_eq!(settings.repo.as_deref(), Some("modsync/packs"));
        assert_eq!(settings.retry_max_attempts, 2);
        assert_eq!(settings.http_timeout_secs, 30);
    }

    #[test]
    fn missing_or_corrupt_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = dir.path().join("settings.json");
        assert_eq!(Settings::load_from(&path), Settings::default());

        std::fs::write(&path, "{ not json").expect("settings file should be written");
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            target_dir: Some(dir.path().join("pack")),
            debug_logging: true,
            ..Settings::default()
        };

        settings.save_to(&path).expect("settings should save");

        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn sync_config_uses_configured_values() {
        let settings = Settings {
            manifest_cache_ttl_secs: 60,
            retry_max_attempts: 2,
            retry_base_delay_ms: 250,
            ..Settings::default()
        };

        let config = settings.sync_config();

        assert_eq!(config.bundle_cache.namespace, "github");
        assert_eq!(config.bundle_cache.ttl, Duration::from_secs(60));
        assert_eq!(config.retry.max_attempts(), 2);
        assert_eq!(config.retry.delay_before(2), Duration::from_millis(500));
        assert_eq!(settings.config_text_cache().namespace, "config");
    }
}
