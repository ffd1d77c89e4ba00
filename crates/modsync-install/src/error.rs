use modsync_backend::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("{name} has no download URL")]
    MissingUrl { name: String },

    #[error("failed to download {name}: {source}")]
    Request {
        name: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("download of {name} failed with HTTP {status}")]
    Status {
        name: String,
        status: reqwest::StatusCode,
    },

    #[error("download of {name} was empty")]
    EmptyDownload { name: String },

    #[error("failed to remove {path}: {source}")]
    Remove {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl InstallError {
    fn phase(&self) -> &'static str {
        match self {
            Self::ClientBuild(_) => "create HTTP client",
            Self::MissingUrl { .. }
            | Self::Request { .. }
            | Self::Status { .. }
            | Self::EmptyDownload { .. } => "download addons",
            Self::Remove { .. } => "remove old addons",
        }
    }
}

impl From<InstallError> for SyncError {
    fn from(error: InstallError) -> Self {
        SyncError::install_failed_from(error.phase(), error)
    }
}
