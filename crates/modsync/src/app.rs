use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use modsync_backend::{ConfigFileContent, DurableStore, Manifest, SyncError};
use modsync_core::{
    CacheStats, PublishRequest, SyncMode, SyncOrchestrator, SyncOutcome, SyncProgress,
    SyncReport, SyncRequest, SyncService,
};
use modsync_github::GitHubStore;
use modsync_install::DiskInstaller;
use modsync_platform::{
    AppPaths, FileEntryStore, import_minecraft_instance, validate_relative_path,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cli::Command;
use crate::error::AppError;
use crate::settings::Settings;

pub const TOKEN_ENV_VAR: &str = "MODSYNC_GITHUB_TOKEN";

/// Build the production orchestrator: GitHub remote, disk installer, and a
/// bundle cache persisted under the cache directory.
///
/// # Errors
/// Returns an error when an HTTP client cannot be built.
pub fn build_orchestrator(
    paths: &AppPaths,
    settings: &Settings,
) -> Result<SyncOrchestrator, SyncError> {
    let remote =
        GitHubStore::new(settings.http_timeout())?.with_config_cache(settings.config_text_cache());
    let installer = DiskInstaller::new(settings.http_timeout(), settings.install_batch_size)?;
    let durable: Arc<dyn DurableStore> = Arc::new(FileEntryStore::new(paths.bundle_cache_dir()));

    Ok(SyncOrchestrator::with_config(
        Arc::new(remote),
        Arc::new(installer),
        Some(durable),
        settings.sync_config(),
    ))
}

pub struct App {
    paths: AppPaths,
    settings: Settings,
    service: SyncService,
}

impl App {
    pub fn new(paths: AppPaths, settings: Settings) -> Self {
        Self {
            paths,
            settings,
            service: SyncService::new(),
        }
    }

    async fn orchestrator(&self) -> Result<Arc<SyncOrchestrator>, AppError> {
        let paths = &self.paths;
        let settings = &self.settings;
        let orchestrator = self
            .service
            .get_or_init(|| async move { build_orchestrator(paths, settings) })
            .await?;
        Ok(orchestrator)
    }

    fn repo(&self, repo: Option<String>) -> Result<String, AppError> {
        repo.or_else(|| self.settings.repo.clone())
            .ok_or(AppError::MissingRepo)
    }

    fn target(&self, target: Option<PathBuf>) -> Result<PathBuf, AppError> {
        target
            .or_else(|| self.settings.target_dir.clone())
            .ok_or(AppError::MissingTarget)
    }

    pub async fn run(
        &mut self,
        repo: Option<String>,
        command: Command,
        cancel: CancellationToken,
    ) -> Result<(), AppError> {
        match command {
            Command::Check { uuid, target } => {
                self.sync(repo, uuid, target, SyncMode::Preview, cancel)
                    .await
            }
            Command::Install { uuid, target } => {
                self.sync(repo, uuid, target, SyncMode::Install, cancel)
                    .await
            }
            Command::Publish {
                manifest,
                instance,
                config_root,
                uuid,
                token,
            } => {
                let token = resolve_token(token, |name| std::env::var(name).ok())?;
                let (manifest, source) = load_publish_manifest(manifest, instance)?;
                let config_root = config_root.unwrap_or_else(|| {
                    source
                        .parent()
                        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
                });
                self.publish(repo, manifest, &config_root, uuid, token)
                    .await
            }
            Command::Configure {
                target,
                debug_logging,
            } => self.configure(repo, target, debug_logging),
            Command::ClearCache => {
                self.orchestrator().await?.clear_cache();
                println!("Bundle cache cleared");
                Ok(())
            }
            Command::CacheStats => {
                let orchestrator = self.orchestrator().await?;
                let cache = orchestrator.cache();
                print!("{}", render_cache_stats(&cache.stats(), cache.durable_len()));
                Ok(())
            }
        }
    }

    async fn sync(
        &self,
        repo: Option<String>,
        uuid: String,
        target: Option<PathBuf>,
        mode: SyncMode,
        cancel: CancellationToken,
    ) -> Result<(), AppError> {
        let request = SyncRequest {
            repo: self.repo(repo)?,
            uuid,
            target_dir: self.target(target)?,
            mode,
        };
        let orchestrator = self.orchestrator().await?;

        let (progress, printer) = spawn_progress_printer();
        let outcome = orchestrator.sync(&request, Some(progress), cancel).await;
        let _ = printer.await;

        match outcome {
            SyncOutcome::Completed(report) => {
                print!("{}", render_report(&report, &request.target_dir));
                Ok(())
            }
            SyncOutcome::Failed { phase, error, .. } => {
                warn!("Sync failed during {phase}: {error}");
                Err(error.into())
            }
            SyncOutcome::Cancelled { phase } => Err(AppError::Cancelled { phase }),
        }
    }

    async fn publish(
        &self,
        repo: Option<String>,
        manifest: Manifest,
        config_root: &Path,
        uuid: Option<String>,
        token: String,
    ) -> Result<(), AppError> {
        let repo = self.repo(repo)?;
        let config_files = read_config_files(config_root, &manifest)?;
        let orchestrator = self.orchestrator().await?;

        let (progress, printer) = spawn_progress_printer();
        let published = orchestrator
            .publish(
                PublishRequest {
                    repo: repo.clone(),
                    token,
                    uuid,
                    manifest,
                    config_files,
                },
                Some(progress),
            )
            .await;
        let _ = printer.await;

        let uuid = published?;
        println!("Published {repo} update code: {uuid}");
        Ok(())
    }

    fn configure(
        &mut self,
        repo: Option<String>,
        target: Option<PathBuf>,
        debug_logging: Option<bool>,
    ) -> Result<(), AppError> {
        if let Some(repo) = repo {
            self.settings.repo = Some(repo);
        }
        if let Some(target) = target {
            self.settings.target_dir = Some(target);
        }
        if let Some(enabled) = debug_logging {
            self.settings.debug_logging = enabled;
        }

        self.settings
            .save(&self.paths)
            .map_err(AppError::SaveSettings)?;
        info!("Saved settings to {}", self.paths.settings_file().display());
        println!("Settings saved to {}", self.paths.settings_file().display());
        Ok(())
    }
}

fn spawn_progress_printer() -> (mpsc::UnboundedSender<SyncProgress>, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::unbounded_channel::<SyncProgress>();
    let printer = tokio::spawn(async move {
        while let Some(update) = receiver.recv().await {
            println!("{}", render_progress(&update));
        }
    });
    (sender, printer)
}

fn render_progress(update: &SyncProgress) -> String {
    format!("[{:>3}%] {}: {}", update.percent, update.phase, update.message)
}

/// The flag wins over the environment variable; blank values count as unset.
fn resolve_token(
    flag: Option<String>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<String, AppError> {
    flag.or_else(|| env(TOKEN_ENV_VAR))
        .filter(|token| !token.trim().is_empty())
        .ok_or(AppError::MissingToken)
}

/// The manifest to publish and the file it came from. An instance file wins
/// when both are given.
fn load_publish_manifest(
    manifest: Option<PathBuf>,
    instance: Option<PathBuf>,
) -> Result<(Manifest, PathBuf), AppError> {
    match (instance, manifest) {
        (Some(instance), _) => {
            let manifest = import_minecraft_instance(&instance).map_err(SyncError::from)?;
            Ok((manifest, instance))
        }
        (None, Some(path)) => Ok((read_manifest(&path)?, path)),
        (None, None) => Err(AppError::MissingManifest),
    }
}

fn read_manifest(path: &Path) -> Result<Manifest, AppError> {
    let raw = std::fs::read(path).map_err(|source| AppError::read_input(path, source))?;
    serde_json::from_slice(&raw).map_err(|source| AppError::ParseManifest {
        path: path.to_path_buf(),
        source,
    })
}

fn read_config_files(root: &Path, manifest: &Manifest) -> Result<Vec<ConfigFileContent>, AppError> {
    manifest
        .config_files
        .iter()
        .map(|entry| -> Result<ConfigFileContent, AppError> {
            let relative = validate_relative_path(&entry.relative_path).map_err(SyncError::from)?;
            let path = root.join(relative);
            let bytes = std::fs::read(&path).map_err(|source| AppError::read_input(&path, source))?;
            Ok(ConfigFileContent::from_bytes(entry.relative_path.clone(), bytes))
        })
        .collect()
}

fn render_cache_stats(stats: &CacheStats, on_disk: Option<usize>) -> String {
    let mut out = format!(
        "{} cached bundles in memory ({} live, {} expired), capacity {}\n",
        stats.total, stats.active, stats.expired, stats.capacity
    );
    if let Some(on_disk) = on_disk {
        let _ = writeln!(out, "{on_disk} cached bundles on disk");
    }
    out
}

fn render_report(report: &SyncReport, target: &Path) -> String {
    let preview = &report.preview;
    let diff = &preview.diff;
    let mut out = String::new();

    if report.from_cache {
        let _ = writeln!(out, "Using cached data");
    }
    if !preview.has_changes {
        let _ = writeln!(out, "Already up to date");
        return out;
    }

    for name in &diff.added {
        let _ = writeln!(out, "  + {name}");
    }
    for upgrade in &diff.upgraded {
        let _ = writeln!(
            out,
            "  ~ {} {} -> {}",
            upgrade.name, upgrade.old_version, upgrade.new_version
        );
    }
    for name in &diff.removed {
        let _ = writeln!(out, "  - {name}");
    }
    let _ = writeln!(
        out,
        "{} addon changes, {} config files",
        diff.change_count(),
        preview.config_files.len()
    );

    if report.installed {
        let _ = writeln!(out, "Installed into {}", target.display());
    }
    out
}
