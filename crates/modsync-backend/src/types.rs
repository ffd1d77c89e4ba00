use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::SyncError;

/// File name under which an installed manifest is kept in the modpack directory.
pub const MANIFEST_FILE_NAME: &str = "modsync-manifest.json";

const DATA_URI_PREFIX: &str = "data:application/octet-stream;base64,";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateKind {
    #[default]
    #[serde(rename = "full")]
    Full,
    #[serde(rename = "config")]
    ConfigOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addon {
    #[serde(rename = "addon_project_id")]
    pub project_id: u64,
    #[serde(rename = "addon_file_id", default)]
    pub file_id: u64,
    #[serde(rename = "addon_name")]
    pub name: String,
    pub version: String,
    #[serde(rename = "cdn_download_url")]
    pub download_url: String,
    #[serde(rename = "mod_folder_path")]
    pub folder_path: String,
    #[serde(rename = "fileNameOnDisk", default)]
    pub file_name_on_disk: String,
    #[serde(
        default,
        deserialize_with = "null_as_false",
        skip_serializing_if = "is_false"
    )]
    pub disabled: bool,
    #[serde(rename = "webSiteURL", default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
}

impl Addon {
    /// Name of the file this addon occupies on disk, falling back to the last
    /// segment of its download URL and then to `<name>-<version>`.
    #[must_use]
    pub fn disk_file_name(&self) -> String {
        if !self.file_name_on_disk.is_empty() {
            return self.file_name_on_disk.clone();
        }

        self.download_url
            .rsplit('/')
            .next()
            .filter(|segment| segment.contains('.') && !segment.contains(".."))
            .map_or_else(
                || format!("{}-{}", self.name.replace(' ', "_"), self.version),
                str::to_string,
            )
    }
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddonCategory {
    Mods,
    ResourcePacks,
    ShaderPacks,
    DataPacks,
}

impl AddonCategory {
    pub const ALL: [AddonCategory; 4] = [
        Self::Mods,
        Self::ResourcePacks,
        Self::ShaderPacks,
        Self::DataPacks,
    ];

    #[must_use]
    pub fn folder_name(self) -> &'static str {
        match self {
            Self::Mods => "mods",
            Self::ResourcePacks => "resourcepacks",
            Self::ShaderPacks => "shaderpacks",
            Self::DataPacks => "datapacks",
        }
    }
}

impl fmt::Display for AddonCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(rename = "filename")]
    pub path: String,
    pub relative_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFileContent {
    pub relative_path: String,
    pub content: String,
    /// Binary payloads travel as `data:<mime>;base64,<payload>` URIs.
    #[serde(default)]
    pub is_binary: bool,
}

impl ConfigFileContent {
    /// Wrap raw file bytes, keeping UTF-8 text as-is and encoding anything
    /// else as a base64 data URI.
    pub fn from_bytes(relative_path: impl Into<String>, bytes: Vec<u8>) -> Self {
        let relative_path = relative_path.into();
        match String::from_utf8(bytes) {
            Ok(content) => Self {
                relative_path,
                content,
                is_binary: false,
            },
            Err(error) => Self {
                relative_path,
                content: format!(
                    "{DATA_URI_PREFIX}{}",
                    BASE64.encode(error.as_bytes())
                ),
                is_binary: true,
            },
        }
    }

    /// The bytes to write to disk.
    ///
    /// # Errors
    /// Returns a `Malformed` error when a binary payload is not a valid
    /// base64 data URI.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        if !self.is_binary {
            return Ok(self.content.as_bytes().to_vec());
        }

        let payload = self
            .content
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(";base64,"))
            .map(|(_, payload)| payload)
            .ok_or_else(|| {
                SyncError::malformed(
                    "config file",
                    format!("{} is not a base64 data URI", self.relative_path),
                )
            })?;

        BASE64
            .decode(payload.trim())
            .map_err(|error| SyncError::malformed_from("config file", error))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "updateType", default)]
    pub update_kind: UpdateKind,
    #[serde(default)]
    pub mods: Vec<Addon>,
    #[serde(default)]
    pub resourcepacks: Vec<Addon>,
    #[serde(default)]
    pub shaderpacks: Vec<Addon>,
    #[serde(default)]
    pub datapacks: Vec<Addon>,
    #[serde(default)]
    pub config_files: Vec<ConfigFile>,
}

impl Manifest {
    #[must_use]
    pub fn addons(&self, category: AddonCategory) -> &[Addon] {
        match category {
            AddonCategory::Mods => &self.mods,
            AddonCategory::ResourcePacks => &self.resourcepacks,
            AddonCategory::ShaderPacks => &self.shaderpacks,
            AddonCategory::DataPacks => &self.datapacks,
        }
    }

    pub fn all_addons(&self) -> impl Iterator<Item = (AddonCategory, &Addon)> {
        AddonCategory::ALL
            .into_iter()
            .flat_map(move |category| self.addons(category).iter().map(move |a| (category, a)))
    }

    #[must_use]
    pub fn addon_count(&self) -> usize {
        AddonCategory::ALL
            .iter()
            .map(|category| self.addons(*category).len())
            .sum()
    }
}
