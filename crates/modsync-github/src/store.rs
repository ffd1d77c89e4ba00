use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::{debug, info};
use modsync_backend::{ConfigFileContent, Manifest, RemoteStore, SyncError};
use modsync_core::{CacheConfig, CacheStats, TieredCache};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use serde_json::json;

use crate::error::GitHubError;
use crate::repo::{RepoRef, is_path_segment};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REMOTE_MANIFEST_NAME: &str = "manifest.json";
const UPLOAD_BRANCH: &str = "main";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const BODY_SNIPPET_CHARS: usize = 160;

#[derive(Deserialize)]
struct ContentMetadata {
    sha: String,
}

/// [`RemoteStore`] over the GitHub contents API.
///
/// Downloaded config files are kept in a memory-only cache so repeated
/// previews of the same bundle do not download them again.
pub struct GitHubStore {
    client: reqwest::Client,
    api_base: String,
    config_text: TieredCache<String, ConfigFileContent>,
}

impl GitHubStore {
    /// # Errors
    /// Returns an error when the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, GitHubError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(format!("modsync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(GitHubError::ClientBuild)?;

        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            config_text: TieredCache::memory(CacheConfig::config_text()),
        })
    }

    /// Point the store at another API host, such as GitHub Enterprise.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_config_cache(mut self, config: CacheConfig) -> Self {
        self.config_text = TieredCache::memory(config);
        self
    }

    pub fn config_cache_stats(&self) -> CacheStats {
        self.config_text.stats()
    }

    fn contents_url(
        &self,
        repo: &RepoRef,
        uuid: &str,
        path: &str,
    ) -> Result<String, GitHubError> {
        if !is_path_segment(uuid) {
            return Err(GitHubError::InvalidPath {
                value: uuid.to_string(),
            });
        }
        let path = path.replace('\\', "/");
        if path.split('/').any(|segment| !is_path_segment(segment)) {
            return Err(GitHubError::InvalidPath { value: path });
        }

        Ok(format!(
            "{}/repos/{}/{}/contents/{uuid}/{path}",
            self.api_base, repo.owner, repo.name
        ))
    }

    async fn get_raw(
        &self,
        operation: &'static str,
        url: &str,
        resource: String,
    ) -> Result<Vec<u8>, GitHubError> {
        debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .header(ACCEPT, RAW_MEDIA_TYPE)
            .send()
            .await
            .map_err(|source| GitHubError::request(operation, source))?;
        let response = check_status(operation, resource, response).await?;

        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|source| GitHubError::request(operation, source))
    }

    async fn existing_sha(&self, url: &str, token: &str) -> Result<Option<String>, GitHubError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, JSON_MEDIA_TYPE)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await
            .map_err(|source| GitHubError::request("look up existing file", source))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status("look up existing file", url.to_string(), response).await?;
        let metadata: ContentMetadata = response
            .json()
            .await
            .map_err(|error| GitHubError::decode("contents metadata", error))?;
        Ok(Some(metadata.sha))
    }

    async fn put_file(
        &self,
        url: &str,
        token: &str,
        message: String,
        content: &[u8],
    ) -> Result<(), GitHubError> {
        let mut body = json!({
            "message": message,
            "content": BASE64.encode(content),
            "branch": UPLOAD_BRANCH,
        });
        if let Some(sha) = self.existing_sha(url, token).await? {
            body["sha"] = json!(sha);
        }

        debug!("PUT {url}");
        let response = self
            .client
            .put(url)
            .header(ACCEPT, JSON_MEDIA_TYPE)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .json(&body)
            .send()
            .await
            .map_err(|source| GitHubError::request("upload file", source))?;
        check_status("upload file", url.to_string(), response).await?;
        Ok(())
    }
}

async fn check_status(
    operation: &'static str,
    resource: String,
    response: reqwest::Response,
) -> Result<reqwest::Response, GitHubError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body_snippet = response
        .text()
        .await
        .ok()
        .map(|body| response_snippet(&body, BODY_SNIPPET_CHARS))
        .unwrap_or_default();
    Err(GitHubError::Status {
        operation,
        resource,
        status,
        body_snippet,
    })
}

fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.trim().chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}

fn parse_repo(repo: &str) -> Result<RepoRef, SyncError> {
    repo.parse::<RepoRef>().map_err(SyncError::from)
}

#[async_trait]
impl RemoteStore for GitHubStore {
    async fn fetch_manifest(&self, repo: &str, uuid: &str) -> Result<Manifest, SyncError> {
        let repo = parse_repo(repo)?;
        let url = self.contents_url(&repo, uuid, REMOTE_MANIFEST_NAME)?;
        let bytes = self
            .get_raw("fetch manifest", &url, format!("{repo}/{uuid}/{REMOTE_MANIFEST_NAME}"))
            .await?;

        let manifest: Manifest = serde_json::from_slice(&bytes)
            .map_err(|error| GitHubError::decode("manifest", error))?;
        info!(
            "Downloaded manifest {repo}/{uuid} ({} addons, {} config files)",
            manifest.addon_count(),
            manifest.config_files.len()
        );
        Ok(manifest)
    }

    async fn fetch_config_files(
        &self,
        repo: &str,
        uuid: &str,
        manifest: &Manifest,
    ) -> Result<Vec<ConfigFileContent>, SyncError> {
        let repo = parse_repo(repo)?;
        let mut files = Vec::with_capacity(manifest.config_files.len());

        for entry in &manifest.config_files {
            let cache_key = format!("{repo}/{uuid}/{}", entry.relative_path);
            if let Some(cached) = self.config_text.get(&cache_key) {
                files.push(cached);
                continue;
            }

            let url = self.contents_url(&repo, uuid, &entry.relative_path)?;
            let bytes = self
                .get_raw("fetch config file", &url, cache_key.clone())
                .await?;
            let file = ConfigFileContent::from_bytes(entry.relative_path.clone(), bytes);
            self.config_text.set(cache_key, file.clone());
            files.push(file);
        }

        debug!("Fetched {} config files for {repo}/{uuid}", files.len());
        Ok(files)
    }

    async fn upload_bundle(
        &self,
        repo: &str,
        token: &str,
        uuid: &str,
        manifest: &Manifest,
        config_files: &[ConfigFileContent],
    ) -> Result<(), SyncError> {
        let repo = parse_repo(repo)?;

        let manifest_json = serde_json::to_vec_pretty(manifest)
            .map_err(|error| SyncError::malformed_from("manifest", error))?;
        let url = self.contents_url(&repo, uuid, REMOTE_MANIFEST_NAME)?;
        self.put_file(
            &url,
            token,
            format!("Upload manifest for update {uuid}"),
            &manifest_json,
        )
        .await?;

        for file in config_files {
            let url = self.contents_url(&repo, uuid, &file.relative_path)?;
            self.put_file(
                &url,
                token,
                format!("Upload config file {} for update {uuid}", file.relative_path),
                &file.to_bytes()?,
            )
            .await?;
        }

        info!(
            "Uploaded bundle {repo}/{uuid} with {} config files",
            config_files.len()
        );
        Ok(())
    }
}
