use async_trait::async_trait;
use std::path::Path;

use crate::error::SyncError;
use crate::types::{ConfigFileContent, Manifest};

/// Remote object store holding published update bundles, addressed by
/// repository and update UUID.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch_manifest(&self, repo: &str, uuid: &str) -> Result<Manifest, SyncError>;

    async fn fetch_config_files(
        &self,
        repo: &str,
        uuid: &str,
        manifest: &Manifest,
    ) -> Result<Vec<ConfigFileContent>, SyncError>;

    async fn upload_bundle(
        &self,
        repo: &str,
        token: &str,
        uuid: &str,
        manifest: &Manifest,
        config_files: &[ConfigFileContent],
    ) -> Result<(), SyncError>;
}

/// Applies a bundle to a modpack directory.
///
/// Implementations must leave the target re-installable when they fail part
/// way through.
#[async_trait]
pub trait Installer: Send + Sync {
    async fn install_bundle(
        &self,
        target: &Path,
        old_manifest: Option<&Manifest>,
        new_manifest: &Manifest,
        config_files: &[ConfigFileContent],
    ) -> Result<(), SyncError>;

    /// `Ok(None)` means nothing was installed into `target` yet.
    async fn read_previous_manifest(&self, target: &Path) -> Result<Option<Manifest>, SyncError>;

    async fn record_manifest(&self, target: &Path, manifest: &Manifest) -> Result<(), SyncError>;
}

/// Durable backing layer of a tiered cache.
///
/// Keys are fully namespaced. Callers treat every error as a miss, so
/// implementations should not retry internally.
pub trait DurableStore: Send + Sync {
    fn load_entry(&self, key: &str) -> std::io::Result<Option<String>>;

    fn persist_entry(&self, key: &str, serialized: &str) -> std::io::Result<()>;

    fn delete_entry(&self, key: &str) -> std::io::Result<()>;

    fn delete_by_prefix(&self, prefix: &str) -> std::io::Result<()>;

    fn count_by_prefix(&self, prefix: &str) -> std::io::Result<usize>;
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct MapStore {
        entries: Mutex<HashMap<String, String>>,
    }

    impl DurableStore for MapStore {
        fn load_entry(&self, key: &str) -> std::io::Result<Option<String>> {
            Ok(self.entries.lock().expect("lock").get(key).cloned())
        }

        fn persist_entry(&self, key: &str, serialized: &str) -> std::io::Result<()> {
            self.entries
                .lock()
                .expect("lock")
                .insert(key.to_string(), serialized.to_string());
            Ok(())
        }

        fn delete_entry(&self, key: &str) -> std::io::Result<()> {
            self.entries.lock().expect("lock").remove(key);
            Ok(())
        }

        fn delete_by_prefix(&self, prefix: &str) -> std::io::Result<()> {
            self.entries
                .lock()
                .expect("lock")
                .retain(|key, _| !key.starts_with(prefix));
            Ok(())
        }

        fn count_by_prefix(&self, prefix: &str) -> std::io::Result<usize> {
            Ok(self
                .entries
                .lock()
                .expect("lock")
                .keys()
                .filter(|key| key.starts_with(prefix))
                .count())
        }
    }

    #[test]
    fn durable_store_is_object_safe() {
        let store: Box<dyn DurableStore> = Box::new(MapStore::default());
        store.persist_entry("github::a", "1").expect("persist");
        store.persist_entry("github::b", "2").expect("persist");
        store.persist_entry("config::a", "3").expect("persist");

        assert_eq!(store.count_by_prefix("github::").expect("count"), 2);
        store.delete_by_prefix("github::").expect("delete");

        assert_eq!(store.load_entry("github::a").expect("load"), None);
        assert_eq!(
            store.load_entry("config::a").expect("load").as_deref(),
            Some("3")
        );
    }

    struct NoopInstaller;

    #[async_trait]
    impl Installer for NoopInstaller {
        async fn install_bundle(
            &self,
            _target: &Path,
            _old_manifest: Option<&Manifest>,
            _new_manifest: &Manifest,
            _config_files: &[ConfigFileContent],
        ) -> Result<(), SyncError> {
            Ok(())
        }

        async fn read_previous_manifest(
            &self,
            _target: &Path,
        ) -> Result<Option<Manifest>, SyncError> {
            Ok(None)
        }

        async fn record_manifest(
            &self,
            _target: &Path,
            _manifest: &Manifest,
        ) -> Result<(), SyncError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn boxed_installer_reports_fresh_install() {
        let installer: Box<dyn Installer> = Box::new(NoopInstaller);
        let previous = installer
            .read_previous_manifest(Path::new("/tmp/modpack"))
            .await
            .expect("read succeeds");
        assert!(previous.is_none());
    }
}
