//! Building a publishable manifest from a CurseForge `minecraftinstance.json`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{debug, info};
use modsync_backend::{Addon, AddonCategory, Manifest, SyncError};
use serde::Deserialize;
use thiserror::Error;

use crate::write::validate_relative_path;

const DISABLED_EXTENSION: &str = "disabled";

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a valid instance file: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<InstanceError> for SyncError {
    fn from(error: InstanceError) -> Self {
        SyncError::malformed_from("minecraft instance", error)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MinecraftInstance {
    #[serde(default)]
    installed_addons: Vec<InstalledAddon>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstalledAddon {
    #[serde(rename = "addonID")]
    addon_id: Option<u64>,
    name: Option<String>,
    mod_folder_path: Option<String>,
    installed_file: Option<InstalledFile>,
    category_section: Option<CategorySection>,
    #[serde(rename = "webSiteURL")]
    website_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstalledFile {
    id: Option<u64>,
    file_name: Option<String>,
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CategorySection {
    name: Option<String>,
}

/// Read an instance file and turn its installed addons into a manifest.
///
/// Addons missing any identifying field are skipped. An addon is flagged
/// disabled when `<file>.disabled` exists in its category folder next to the
/// instance file. The manifest lists no config files.
///
/// # Errors
/// Returns an error when the file cannot be read or is not instance JSON.
pub fn import_minecraft_instance(path: &Path) -> Result<Manifest, InstanceError> {
    let raw = std::fs::read(path).map_err(|source| InstanceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let instance: MinecraftInstance =
        serde_json::from_slice(&raw).map_err(|source| InstanceError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut manifest = Manifest::default();
    let disabled_by_category = AddonCategory::ALL.map(|category| {
        (
            category,
            disabled_file_names(&base_dir.join(category.folder_name())),
        )
    });
    let mut skipped = 0;

    for installed in instance.installed_addons {
        let Some((category, mut addon)) = convert(installed) else {
            skipped += 1;
            continue;
        };
        addon.disabled = disabled_by_category
            .iter()
            .find(|(candidate, _)| *candidate == category)
            .is_some_and(|(_, disabled)| disabled.contains(&addon.file_name_on_disk));
        addons_mut(&mut manifest, category).push(addon);
    }

    info!(
        "Imported {} addons from {} ({skipped} skipped)",
        manifest.addon_count(),
        path.display()
    );
    Ok(manifest)
}

fn convert(installed: InstalledAddon) -> Option<(AddonCategory, Addon)> {
    let file = installed.installed_file?;
    let name = installed.name?;
    let folder = installed.mod_folder_path?;
    let category_name = installed.category_section?.name?;
    let file_id = file.id?;
    let project_id = installed.addon_id?;
    let file_name = file.file_name?;
    let download_url = file.download_url?;

    let category = categorize(&category_name, &folder);
    // Instance files usually carry the absolute folder of the machine they were
    // exported on, drive letter included.
    let folder_path = if !folder.contains(':') && validate_relative_path(&folder).is_ok() {
        folder
    } else {
        debug!("Using {category} for {name}, folder {folder} is not relative");
        category.folder_name().to_string()
    };

    Some((
        category,
        Addon {
            project_id,
            file_id,
            name,
            version: file_name.clone(),
            download_url,
            folder_path,
            file_name_on_disk: file_name,
            disabled: false,
            website_url: installed.website_url,
        },
    ))
}

/// Shader, resource and data packs are recognized by category name or by the
/// folder they live in; everything else is a mod.
fn categorize(category_name: &str, folder: &str) -> AddonCategory {
    let category_name = category_name.to_lowercase();
    let folder = folder.to_lowercase().replace('\\', "/");
    let folder = folder.trim_end_matches('/');

    if category_name.contains("shader") || folder.ends_with("shaderpacks") {
        AddonCategory::ShaderPacks
    } else if category_name.contains("resource") || folder.ends_with("resourcepacks") {
        AddonCategory::ResourcePacks
    } else if category_name.contains("datapack") || folder.ends_with("datapacks") {
        AddonCategory::DataPacks
    } else {
        AddonCategory::Mods
    }
}

fn addons_mut(manifest: &mut Manifest, category: AddonCategory) -> &mut Vec<Addon> {
    match category {
        AddonCategory::Mods => &mut manifest.mods,
        AddonCategory::ResourcePacks => &mut manifest.resourcepacks,
        AddonCategory::ShaderPacks => &mut manifest.shaderpacks,
        AddonCategory::DataPacks => &mut manifest.datapacks,
    }
}

/// File names (without the `.disabled` suffix) of disabled files in `dir`.
/// A missing directory has none.
fn disabled_file_names(dir: &Path) -> HashSet<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return HashSet::new();
    };

    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().and_then(std::ffi::OsStr::to_str) == Some(DISABLED_EXTENSION)
        })
        .filter_map(|path| {
            path.file_stem()
                .and_then(std::ffi::OsStr::to_str)
                .map(str::to_string)
        })
        .collect()
}
