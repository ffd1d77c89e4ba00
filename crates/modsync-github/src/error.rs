use modsync_backend::SyncError;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitHubError {
    #[error("invalid repository {value:?}, expected owner/name")]
    InvalidRepo { value: String },

    #[error("invalid path segment {value:?}")]
    InvalidPath { value: String },

    #[error("failed to build GitHub client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("request to {operation} failed: {source}")]
    Request {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} failed with HTTP {status} for {resource}{body_snippet}")]
    Status {
        operation: &'static str,
        resource: String,
        status: StatusCode,
        body_snippet: String,
    },

    #[error("invalid {context}: {details}")]
    Decode {
        context: &'static str,
        details: String,
    },
}

impl GitHubError {
    pub(crate) fn request(operation: &'static str, source: reqwest::Error) -> Self {
        Self::Request { operation, source }
    }

    pub(crate) fn decode(context: &'static str, details: impl ToString) -> Self {
        Self::Decode {
            context,
            details: details.to_string(),
        }
    }
}

impl From<GitHubError> for SyncError {
    fn from(error: GitHubError) -> Self {
        match &error {
            GitHubError::InvalidRepo { .. } => SyncError::malformed_from("repository", error),
            GitHubError::InvalidPath { .. } => SyncError::malformed_from("bundle path", error),
            GitHubError::ClientBuild(_) => SyncError::network_from("build http client", error),
            GitHubError::Request { operation, .. } => SyncError::network_from(*operation, error),
            GitHubError::Status {
                operation,
                resource,
                status,
                ..
            } => match status.as_u16() {
                404 => SyncError::not_found(resource.clone()),
                401 | 403 => SyncError::auth(error.to_string()),
                408 | 429 | 500..=599 => SyncError::network_from(*operation, error),
                _ => SyncError::malformed_from("GitHub response", error),
            },
            GitHubError::Decode { context, details } => {
                SyncError::malformed(*context, details.clone())
            }
        }
    }
}
