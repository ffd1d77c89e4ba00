use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use modsync_backend::{
    Addon, ConfigFileContent, DurableStore, Installer, Manifest, RemoteStore, SyncError,
};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct MemoryDurableStore {
    pub entries: Mutex<HashMap<String, String>>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub writes: AtomicUsize,
}

impl MemoryDurableStore {
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().expect("store lock").get(key).cloned()
    }

    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .expect("store lock")
            .insert(key.to_string(), value.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("store lock").len()
    }
}

impl DurableStore for MemoryDurableStore {
    fn load_entry(&self, key: &str) -> std::io::Result<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("simulated read failure"));
        }
        Ok(self.raw(key))
    }

    fn persist_entry(&self, key: &str, serialized: &str) -> std::io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("simulated write failure"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.insert_raw(key, serialized);
        Ok(())
    }

    fn delete_entry(&self, key: &str) -> std::io::Result<()> {
        self.entries.lock().expect("store lock").remove(key);
        Ok(())
    }

    fn delete_by_prefix(&self, prefix: &str) -> std::io::Result<()> {
        self.entries
            .lock()
            .expect("store lock")
            .retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }

    fn count_by_prefix(&self, prefix: &str) -> std::io::Result<usize> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("simulated read failure"));
        }
        Ok(self
            .entries
            .lock()
            .expect("store lock")
            .keys()
            .filter(|key| key.starts_with(prefix))
            .count())
    }
}

pub fn addon(project_id: u64, name: &str, version: &str) -> Addon {
    Addon {
        project_id,
        file_id: project_id * 10,
        name: name.to_string(),
        version: version.to_string(),
        download_url: format!("https://cdn.example/{project_id}/{name}-{version}.jar"),
        folder_path: "mods".to_string(),
        file_name_on_disk: format!("{name}-{version}.jar"),
        disabled: false,
        website_url: None,
    }
}

pub fn manifest_with_mods(mods: Vec<Addon>) -> Manifest {
    Manifest {
        mods,
        ..Manifest::default()
    }
}

pub fn config_file(relative_path: &str, content: &str) -> ConfigFileContent {
    ConfigFileContent {
        relative_path: relative_path.to_string(),
        content: content.to_string(),
        is_binary: false,
    }
}

/// Remote store double that counts calls and fails on demand.
pub struct FakeRemote {
    manifest: Manifest,
    config_files: Vec<ConfigFileContent>,
    manifest_failures: Mutex<VecDeque<SyncError>>,
    config_failures: Mutex<VecDeque<SyncError>>,
    uploads: Mutex<Vec<(String, String)>>,
    cancel_on_fetch: Option<CancellationToken>,
    fetch_delay: Duration,
    pub manifest_calls: AtomicUsize,
    pub config_calls: AtomicUsize,
}

impl FakeRemote {
    pub fn new(manifest: Manifest, config_files: Vec<ConfigFileContent>) -> Self {
        Self {
            manifest,
            config_files,
            manifest_failures: Mutex::default(),
            config_failures: Mutex::default(),
            uploads: Mutex::default(),
            cancel_on_fetch: None,
            fetch_delay: Duration::ZERO,
            manifest_calls: AtomicUsize::new(0),
            config_calls: AtomicUsize::new(0),
        }
    }

    pub fn cancelling_on_fetch(mut self, token: CancellationToken) -> Self {
        self.cancel_on_fetch = Some(token);
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn fail_manifest_once(&self, error: SyncError) {
        self.manifest_failures
            .lock()
            .expect("failures lock")
            .push_back(error);
    }

    pub fn fail_config_once(&self, error: SyncError) {
        self.config_failures
            .lock()
            .expect("failures lock")
            .push_back(error);
    }

    pub fn uploaded(&self) -> Vec<(String, String)> {
        self.uploads.lock().expect("uploads lock").clone()
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn fetch_manifest(&self, _repo: &str, _uuid: &str) -> Result<Manifest, SyncError> {
        self.manifest_calls.fetch_add(1, Ordering::SeqCst);
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        if let Some(token) = &self.cancel_on_fetch {
            token.cancel();
        }
        let failure = self
            .manifest_failures
            .lock()
            .expect("failures lock")
            .pop_front();
        match failure {
            Some(error) => Err(error),
            None => Ok(self.manifest.clone()),
        }
    }

    async fn fetch_config_files(
        &self,
        _repo: &str,
        _uuid: &str,
        _manifest: &Manifest,
    ) -> Result<Vec<ConfigFileContent>, SyncError> {
        self.config_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .config_failures
            .lock()
            .expect("failures lock")
            .pop_front();
        match failure {
            Some(error) => Err(error),
            None => Ok(self.config_files.clone()),
        }
    }

    async fn upload_bundle(
        &self,
        repo: &str,
        _token: &str,
        uuid: &str,
        _manifest: &Manifest,
        _config_files: &[ConfigFileContent],
    ) -> Result<(), SyncError> {
        self.uploads
            .lock()
            .expect("uploads lock")
            .push((repo.to_string(), uuid.to_string()));
        Ok(())
    }
}

/// Installer double that keeps the "previous manifest" in memory.
#[derive(Default)]
pub struct FakeInstaller {
    previous: Mutex<Option<Manifest>>,
    install_failure: Mutex<Option<SyncError>>,
    pub installs: AtomicUsize,
}

impl FakeInstaller {
    pub fn with_previous(manifest: Manifest) -> Self {
        Self {
            previous: Mutex::new(Some(manifest)),
            ..Self::default()
        }
    }

    pub fn fail_install(&self, error: SyncError) {
        *self.install_failure.lock().expect("failure lock") = Some(error);
    }

    pub fn previous(&self) -> Option<Manifest> {
        self.previous.lock().expect("previous lock").clone()
    }
}

#[async_trait]
impl Installer for FakeInstaller {
    async fn install_bundle(
        &self,
        _target: &Path,
        _old_manifest: Option<&Manifest>,
        _new_manifest: &Manifest,
        _config_files: &[ConfigFileContent],
    ) -> Result<(), SyncError> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        match self.install_failure.lock().expect("failure lock").take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn read_previous_manifest(&self, _target: &Path) -> Result<Option<Manifest>, SyncError> {
        Ok(self.previous())
    }

    async fn record_manifest(&self, _target: &Path, manifest: &Manifest) -> Result<(), SyncError> {
        *self.previous.lock().expect("previous lock") = Some(manifest.clone());
        Ok(())
    }
}
