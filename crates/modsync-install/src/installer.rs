use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use modsync_backend::{
    Addon, AddonCategory, ConfigFileContent, Installer, MANIFEST_FILE_NAME, Manifest, SyncError,
    UpdateKind,
};
use modsync_core::{AddonChanges, addon_changes, process_in_batches};
use modsync_platform::{
    TargetLock, WriteRequest, WrittenFile, remove_created, validate_relative_path,
};
use sha2::{Digest, Sha256};

use crate::error::InstallError;

pub const DEFAULT_BATCH_SIZE: usize = 8;

/// Appended to the file name of addons the manifest marks as disabled.
pub const DISABLED_SUFFIX: &str = ".disabled";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct DownloadJob {
    name: String,
    url: String,
    relative_path: String,
}

/// [`Installer`] writing addons and config files into a modpack directory.
///
/// Every download finishes before anything on disk changes. If writing or
/// removing files fails afterwards, files created by this run are removed
/// again and the previous manifest is left as it was, so the same update can
/// simply be installed again.
pub struct DiskInstaller {
    client: reqwest::Client,
    batch_size: usize,
}

impl DiskInstaller {
    /// # Errors
    /// Returns an error when the HTTP client cannot be built.
    pub fn new(timeout: Duration, batch_size: usize) -> Result<Self, InstallError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(format!("modsync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(InstallError::ClientBuild)?;
        Ok(Self::with_client(client, batch_size))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, batch_size: usize) -> Self {
        Self {
            client,
            batch_size: batch_size.max(1),
        }
    }

    async fn download_all(&self, jobs: &[DownloadJob]) -> Result<Vec<(String, Vec<u8>)>, SyncError> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let results = process_in_batches(
            jobs,
            self.batch_size,
            |job, _| download(self.client.clone(), job.clone()),
            |done, total| debug!("Downloaded {done}/{total} addons"),
        )
        .await;

        results
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map_err(SyncError::from)
    }
}

/// Path of an addon relative to the modpack directory: its manifest folder
/// (or the category's default folder) plus its on-disk file name.
#[must_use]
pub fn addon_relative_path(category: AddonCategory, addon: &Addon) -> String {
    let folder = addon.folder_path.trim_matches(|c| c == '/' || c == '\\');
    let folder = if folder.is_empty() {
        category.folder_name()
    } else {
        folder
    };

    let mut file_name = addon.disk_file_name();
    if addon.disabled {
        file_name.push_str(DISABLED_SUFFIX);
    }
    format!("{folder}/{file_name}")
}

async fn download(client: reqwest::Client, job: DownloadJob) -> Result<(String, Vec<u8>), InstallError> {
    if job.url.is_empty() {
        return Err(InstallError::MissingUrl { name: job.name });
    }

    let response = client
        .get(&job.url)
        .send()
        .await
        .map_err(|source| InstallError::Request {
            name: job.name.clone(),
            source,
        })?;

    if !response.status().is_success() {
        return Err(InstallError::Status {
            name: job.name,
            status: response.status(),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|source| InstallError::Request {
            name: job.name.clone(),
            source,
        })?;
    if bytes.is_empty() {
        return Err(InstallError::EmptyDownload { name: job.name });
    }

    debug!(
        "Downloaded {} ({} bytes, sha256 {:x})",
        job.name,
        bytes.len(),
        Sha256::digest(&bytes)
    );
    Ok((job.relative_path, bytes.to_vec()))
}

fn download_jobs(changes: &AddonChanges<'_>) -> Vec<DownloadJob> {
    changes
        .added
        .iter()
        .map(|(category, addon)| (*category, *addon))
        .chain(
            changes
                .upgraded
                .iter()
                .map(|(category, _, new_addon)| (*category, *new_addon)),
        )
        .map(|(category, addon)| DownloadJob {
            name: addon.name.clone(),
            url: addon.download_url.clone(),
            relative_path: addon_relative_path(category, addon),
        })
        .collect()
}

/// Files left behind by removed addons and by the old side of upgrades. Both
/// the enabled and disabled file names are candidates.
fn stale_paths(target: &Path, changes: &AddonChanges<'_>) -> Result<Vec<PathBuf>, SyncError> {
    let old_addons = changes
        .removed
        .iter()
        .map(|(category, addon)| (*category, *addon))
        .chain(
            changes
                .upgraded
                .iter()
                .map(|(category, old_addon, _)| (*category, *old_addon)),
        );

    let mut paths = Vec::new();
    for (category, addon) in old_addons {
        let relative = addon_relative_path(category, addon);
        let enabled = relative
            .strip_suffix(DISABLED_SUFFIX)
            .unwrap_or(&relative)
            .to_string();
        let disabled = format!("{enabled}{DISABLED_SUFFIX}");
        for candidate in [enabled, disabled] {
            paths.push(target.join(validate_relative_path(&candidate)?));
        }
    }
    Ok(paths)
}

fn remove_stale(stale: &[PathBuf], keep: &HashSet<&Path>) -> Result<usize, InstallError> {
    let mut removed = 0;
    for path in stale.iter().filter(|path| !keep.contains(path.as_path())) {
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!("Removed {}", path.display());
                removed += 1;
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(InstallError::Remove {
                    path: path.display().to_string(),
                    source,
                });
            }
        }
    }
    Ok(removed)
}

async fn apply_write(request: WriteRequest) -> Result<Vec<WrittenFile>, SyncError> {
    tokio::task::spawn_blocking(move || request.apply())
        .await
        .map_err(|error| SyncError::install_failed_from("write files", error))?
        .map_err(SyncError::from)
}

#[async_trait]
impl Installer for DiskInstaller {
    async fn install_bundle(
        &self,
        target: &Path,
        old_manifest: Option<&Manifest>,
        new_manifest: &Manifest,
        config_files: &[ConfigFileContent],
    ) -> Result<(), SyncError> {
        let _lock = TargetLock::acquire(target)?;

        let changes = if new_manifest.update_kind == UpdateKind::ConfigOnly {
            debug!("Config-only update, leaving addons untouched");
            AddonChanges::default()
        } else {
            addon_changes(old_manifest, new_manifest)
        };

        let mut files = config_files
            .iter()
            .map(|file| {
                file.to_bytes()
                    .map(|bytes| (file.relative_path.clone(), bytes))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let stale = stale_paths(target, &changes)?;

        let mut downloads = self.download_all(&download_jobs(&changes)).await?;
        let addon_count = downloads.len();
        downloads.append(&mut files);

        let written = apply_write(WriteRequest::FileSet {
            dir: target.to_path_buf(),
            files: downloads,
        })
        .await?;

        let keep: HashSet<&Path> = written.iter().map(|file| file.path.as_path()).collect();
        let removed = match remove_stale(&stale, &keep) {
            Ok(removed) => removed,
            Err(error) => {
                remove_created(&written);
                return Err(error.into());
            }
        };

        info!(
            "Installed into {}: {addon_count} addons written, {removed} files removed, {} config files",
            target.display(),
            config_files.len()
        );
        Ok(())
    }

    async fn read_previous_manifest(&self, target: &Path) -> Result<Option<Manifest>, SyncError> {
        let path = target.join(MANIFEST_FILE_NAME);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!("No previous manifest in {}", target.display());
                return Ok(None);
            }
            Err(error) => {
                return Err(SyncError::install_failed_from(
                    "read previous manifest",
                    error,
                ));
            }
        };

        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|error| SyncError::malformed_from("previous manifest", error))
    }

    async fn record_manifest(&self, target: &Path, manifest: &Manifest) -> Result<(), SyncError> {
        let content = serde_json::to_vec_pretty(manifest)
            .map_err(|error| SyncError::malformed_from("manifest", error))?;
        apply_write(WriteRequest::SingleFile {
            path: target.join(MANIFEST_FILE_NAME),
            content,
        })
        .await?;
        debug!("Recorded manifest in {}", target.display());
        Ok(())
    }
}
