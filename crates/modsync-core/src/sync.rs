//! The update cycle: fetch a manifest, diff it against what is installed,
//! fetch config files, and install.
//!
//! Every session ends in exactly one [`SyncOutcome`]. Cancellation is checked
//! whenever the session moves to a new phase and while waiting on the remote
//! store; an install that has started always runs to completion or rollback.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use modsync_backend::{
    ConfigFileContent, DurableStore, Installer, Manifest, RemoteStore, SyncError, UpdateKind,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::{CacheConfig, TieredCache};
use crate::diff::{UpdateDiff, diff_manifests};
use crate::flight::KeyedLocks;
use crate::retry::{RetryPolicy, RetryState};

pub type ProgressSender = mpsc::UnboundedSender<SyncProgress>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncPhase {
    Idle,
    FetchingManifest,
    Diffing,
    FetchingConfig,
    Installing,
    Uploading,
    Completed,
    Failed,
    Cancelled,
}

impl SyncPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::FetchingManifest => "fetching manifest",
            Self::Diffing => "diffing",
            Self::FetchingConfig => "fetching config",
            Self::Installing => "installing",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Stop after config files are fetched and report what would change.
    Preview,
    #[default]
    Install,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub repo: String,
    pub uuid: String,
    pub target_dir: PathBuf,
    pub mode: SyncMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncProgress {
    pub phase: SyncPhase,
    pub percent: u8,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundleKey {
    pub repo: String,
    pub uuid: String,
}

impl BundleKey {
    pub fn new(repo: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            uuid: uuid.into(),
        }
    }
}

impl fmt::Display for BundleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.repo, self.uuid)
    }
}

/// What the bundle cache holds for one `repo@uuid`.
///
/// `config_files` is `None` until the config phase succeeds, which lets a
/// failed session resume without fetching the manifest again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedBundle {
    pub manifest: Manifest,
    pub config_files: Option<Vec<ConfigFileContent>>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdatePreview {
    pub old_manifest: Option<Manifest>,
    pub new_manifest: Manifest,
    pub diff: UpdateDiff,
    pub has_changes: bool,
    pub config_files: Vec<ConfigFileContent>,
}

impl UpdatePreview {
    fn new(
        old_manifest: Option<Manifest>,
        new_manifest: Manifest,
        diff: UpdateDiff,
        config_files: Vec<ConfigFileContent>,
    ) -> Self {
        // Config files are always rewritten, so their presence counts as a change.
        let has_changes = diff.has_changes() || !config_files.is_empty();
        Self {
            old_manifest,
            new_manifest,
            diff,
            has_changes,
            config_files,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub preview: UpdatePreview,
    pub from_cache: bool,
    pub installed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(Box<SyncReport>),
    Failed {
        /// Phase the session was in when the error surfaced.
        phase: SyncPhase,
        error: SyncError,
        diff: Option<UpdateDiff>,
    },
    Cancelled {
        phase: SyncPhase,
    },
}

impl SyncOutcome {
    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        match self {
            Self::Completed(_) => SyncPhase::Completed,
            Self::Failed { .. } => SyncPhase::Failed,
            Self::Cancelled { .. } => SyncPhase::Cancelled,
        }
    }

    #[must_use]
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            Self::Completed(report) => Some(&**report),
            _ => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&SyncError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub repo: String,
    pub token: String,
    /// A fresh v4 UUID is generated when absent.
    pub uuid: Option<String>,
    pub manifest: Manifest,
    pub config_files: Vec<ConfigFileContent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub retry: RetryPolicy,
    pub bundle_cache: CacheConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            bundle_cache: CacheConfig::bundles(),
        }
    }
}

enum Halt {
    Cancelled,
    Failed(SyncError),
}

impl From<SyncError> for Halt {
    fn from(error: SyncError) -> Self {
        Self::Failed(error)
    }
}

struct SyncSession {
    key: BundleKey,
    phase: SyncPhase,
    percent: u8,
    diff: Option<UpdateDiff>,
    progress: Option<ProgressSender>,
    cancel: CancellationToken,
}

impl SyncSession {
    fn new(key: BundleKey, progress: Option<ProgressSender>, cancel: CancellationToken) -> Self {
        Self {
            key,
            phase: SyncPhase::Idle,
            percent: 0,
            diff: None,
            progress,
            cancel,
        }
    }

    /// Phase boundary: stop here if cancellation was requested.
    fn checkpoint(&mut self, phase: SyncPhase, percent: u8, message: &str) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            info!("Sync {} cancelled before {phase}", self.key);
            return Err(Halt::Cancelled);
        }
        self.advance(phase, percent, message);
        Ok(())
    }

    fn advance(&mut self, phase: SyncPhase, percent: u8, message: &str) {
        debug!("Sync {}: {} -> {phase}", self.key, self.phase);
        self.phase = phase;
        self.report(percent, message);
    }

    fn report(&mut self, percent: u8, message: &str) {
        self.percent = self.percent.max(percent.min(100));
        let Some(progress) = &self.progress else {
            return;
        };
        let update = SyncProgress {
            phase: self.phase,
            percent: self.percent,
            message: message.to_string(),
        };
        if progress.send(update).is_err() {
            debug!("Progress receiver for {} dropped", self.key);
            self.progress = None;
        }
    }

    /// Observer for [`RetryPolicy::run_observed`] that reports each backoff
    /// at the current phase and percent.
    fn retry_reporter(&self) -> impl FnMut(RetryState) + use<> {
        let progress = self.progress.clone();
        let key = self.key.clone();
        let phase = self.phase;
        let percent = self.percent;
        move |state: RetryState| {
            let message = format!(
                "Retrying in {}ms ({} attempts left)",
                state.next_delay.as_millis(),
                state.remaining
            );
            info!("Sync {key}: {message}");
            if let Some(progress) = &progress {
                let _ = progress.send(SyncProgress {
                    phase,
                    percent,
                    message,
                });
            }
        }
    }

    async fn until_cancelled<T, F>(&self, work: F) -> Result<T, Halt>
    where
        F: Future<Output = Result<T, SyncError>>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                info!("Sync {} cancelled during {}", self.key, self.phase);
                Err(Halt::Cancelled)
            }
            result = work => result.map_err(Halt::Failed),
        }
    }
}

/// Diff shown for an update. Config-only updates leave addons alone, so they
/// never report addon changes.
fn update_diff(old: Option<&Manifest>, new: &Manifest) -> UpdateDiff {
    match new.update_kind {
        UpdateKind::Full => diff_manifests(old, new),
        UpdateKind::ConfigOnly => UpdateDiff::default(),
    }
}

/// Manifest describing the modpack after `new` is installed over `old`.
///
/// A config-only update keeps the installed addon lists so the next full
/// update still sees them as upgrades or removals.
fn installed_manifest(old: Option<&Manifest>, new: &Manifest) -> Manifest {
    match (new.update_kind, old) {
        (UpdateKind::Full, _) => new.clone(),
        (UpdateKind::ConfigOnly, Some(old)) => Manifest {
            config_files: new.config_files.clone(),
            ..old.clone()
        },
        (UpdateKind::ConfigOnly, None) => Manifest {
            update_kind: UpdateKind::Full,
            config_files: new.config_files.clone(),
            ..Manifest::default()
        },
    }
}

pub struct SyncOrchestrator {
    remote: Arc<dyn RemoteStore>,
    installer: Arc<dyn Installer>,
    cache: TieredCache<BundleKey, CachedBundle>,
    retry: RetryPolicy,
    flights: KeyedLocks,
}

impl SyncOrchestrator {
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        installer: Arc<dyn Installer>,
        cache: TieredCache<BundleKey, CachedBundle>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            remote,
            installer,
            cache,
            retry,
            flights: KeyedLocks::new(),
        }
    }

    /// Build an orchestrator whose bundle cache is backed by `durable` when
    /// one is given.
    #[must_use]
    pub fn with_config(
        remote: Arc<dyn RemoteStore>,
        installer: Arc<dyn Installer>,
        durable: Option<Arc<dyn DurableStore>>,
        config: SyncConfig,
    ) -> Self {
        let cache = match durable {
            Some(store) => TieredCache::durable(config.bundle_cache, store),
            None => TieredCache::memory(config.bundle_cache),
        };
        Self::new(remote, installer, cache, config.retry)
    }

    pub fn cache(&self) -> &TieredCache<BundleKey, CachedBundle> {
        &self.cache
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Drop every cached bundle from memory and disk.
    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Bundle cache cleared");
    }

    /// Run one update cycle for `request`.
    ///
    /// Sessions for the same `repo@uuid` run one at a time; a waiting session
    /// sees whatever the previous one cached.
    pub async fn sync(
        &self,
        request: &SyncRequest,
        progress: Option<ProgressSender>,
        cancel: CancellationToken,
    ) -> SyncOutcome {
        let key = BundleKey::new(&request.repo, &request.uuid);
        let _flight = self.flights.acquire(&key.to_string()).await;
        let mut session = SyncSession::new(key.clone(), progress, cancel);

        info!("Starting {:?} sync of {key}", request.mode);
        let result = self.run_session(&mut session, request).await;
        let interrupted_in = session.phase;

        match result {
            Ok(report) => {
                let message = if report.installed {
                    "Update installed"
                } else if report.from_cache {
                    "Using cached data"
                } else {
                    "Update ready"
                };
                session.advance(SyncPhase::Completed, 100, message);
                info!("Sync of {key} completed (from cache: {})", report.from_cache);
                SyncOutcome::Completed(Box::new(report))
            }
            Err(Halt::Cancelled) => {
                session.advance(SyncPhase::Cancelled, session.percent, "Cancelled");
                SyncOutcome::Cancelled {
                    phase: interrupted_in,
                }
            }
            Err(Halt::Failed(error)) => {
                warn!("Sync of {key} failed during {interrupted_in}: {error}");
                session.advance(SyncPhase::Failed, session.percent, &error.to_string());
                SyncOutcome::Failed {
                    phase: interrupted_in,
                    error,
                    diff: session.diff.take(),
                }
            }
        }
    }

    async fn run_session(
        &self,
        session: &mut SyncSession,
        request: &SyncRequest,
    ) -> Result<SyncReport, Halt> {
        let key = session.key.clone();
        session.checkpoint(SyncPhase::FetchingManifest, 10, "Contacting GitHub...")?;

        let cached = self.cache.get(&key);
        if request.mode == SyncMode::Preview
            && let Some(CachedBundle {
                manifest,
                config_files: Some(config_files),
                ..
            }) = cached.clone()
        {
            session.report(100, "Using cached data");
            let old_manifest = self
                .installer
                .read_previous_manifest(&request.target_dir)
                .await?;
            let diff = update_diff(old_manifest.as_ref(), &manifest);
            return Ok(SyncReport {
                preview: UpdatePreview::new(old_manifest, manifest, diff, config_files),
                from_cache: true,
                installed: false,
            });
        }

        let from_cache = cached.is_some();
        let (manifest, mut config_files) = match cached {
            Some(bundle) => {
                let message = if bundle.config_files.is_some() {
                    "Using cached data"
                } else {
                    "Using cached manifest"
                };
                debug!("Reusing cached bundle for {key} from {}", bundle.fetched_at);
                session.report(30, message);
                (bundle.manifest, bundle.config_files)
            }
            None => {
                let on_retry = session.retry_reporter();
                let manifest = session
                    .until_cancelled(self.retry.run_observed(
                        "fetch manifest",
                        || self.remote.fetch_manifest(&request.repo, &request.uuid),
                        on_retry,
                    ))
                    .await?;
                info!(
                    "Fetched manifest for {key} ({} addons)",
                    manifest.addon_count()
                );
                self.cache.set(
                    key.clone(),
                    CachedBundle {
                        manifest: manifest.clone(),
                        config_files: None,
                        fetched_at: self.cache.now(),
                    },
                );
                session.report(30, "Manifest downloaded");
                (manifest, None)
            }
        };

        session.checkpoint(SyncPhase::Diffing, 40, "Comparing with installed modpack...")?;
        let old_manifest = self
            .installer
            .read_previous_manifest(&request.target_dir)
            .await?;
        let diff = update_diff(old_manifest.as_ref(), &manifest);
        debug!(
            "Diff for {key}: {} removed, {} upgraded, {} added",
            diff.removed.len(),
            diff.upgraded.len(),
            diff.added.len()
        );
        session.diff = Some(diff.clone());

        session.checkpoint(SyncPhase::FetchingConfig, 50, "Downloading config files...")?;
        let config_files = match config_files.take() {
            Some(config_files) => config_files,
            None => {
                let fetched = if manifest.config_files.is_empty() {
                    Vec::new()
                } else {
                    let on_retry = session.retry_reporter();
                    session
                        .until_cancelled(self.retry.run_observed(
                            "fetch config files",
                            || {
                                self.remote
                                    .fetch_config_files(&request.repo, &request.uuid, &manifest)
                            },
                            on_retry,
                        ))
                        .await?
                };
                self.cache.set(
                    key.clone(),
                    CachedBundle {
                        manifest: manifest.clone(),
                        config_files: Some(fetched.clone()),
                        fetched_at: self.cache.now(),
                    },
                );
                fetched
            }
        };
        session.report(70, "Config files ready");

        if request.mode == SyncMode::Preview {
            return Ok(SyncReport {
                preview: UpdatePreview::new(old_manifest, manifest, diff, config_files),
                from_cache,
                installed: false,
            });
        }

        session.checkpoint(SyncPhase::Installing, 75, "Installing update...")?;
        self.installer
            .install_bundle(
                &request.target_dir,
                old_manifest.as_ref(),
                &manifest,
                &config_files,
            )
            .await?;
        let installed = installed_manifest(old_manifest.as_ref(), &manifest);
        self.installer
            .record_manifest(&request.target_dir, &installed)
            .await?;
        session.report(100, "Installation complete");

        Ok(SyncReport {
            preview: UpdatePreview::new(old_manifest, manifest, diff, config_files),
            from_cache,
            installed: true,
        })
    }

    /// Upload a bundle and cache it under its UUID, which is returned.
    ///
    /// # Errors
    /// Returns the upload error after the retry policy gives up.
    pub async fn publish(
        &self,
        request: PublishRequest,
        progress: Option<ProgressSender>,
    ) -> Result<String, SyncError> {
        let PublishRequest {
            repo,
            token,
            uuid,
            manifest,
            config_files,
        } = request;
        let uuid = uuid.unwrap_or_else(|| Uuid::new_v4().to_string());
        let key = BundleKey::new(&repo, &uuid);

        let _flight = self.flights.acquire(&key.to_string()).await;
        let mut session = SyncSession::new(key.clone(), progress, CancellationToken::new());

        session.advance(SyncPhase::Uploading, 10, "Preparing upload...");
        let uploaded = self
            .retry
            .run_observed(
                "upload bundle",
                || {
                    self.remote
                        .upload_bundle(&repo, &token, &uuid, &manifest, &config_files)
                },
                session.retry_reporter(),
            )
            .await;

        if let Err(error) = uploaded {
            warn!("Publishing {key} failed: {error}");
            session.advance(SyncPhase::Failed, session.percent, &error.to_string());
            return Err(error);
        }

        self.cache.set(
            key.clone(),
            CachedBundle {
                manifest,
                config_files: Some(config_files),
                fetched_at: self.cache.now(),
            },
        );
        session.advance(SyncPhase::Completed, 100, "Upload complete");
        info!("Published {key}");

        Ok(uuid)
    }
}
