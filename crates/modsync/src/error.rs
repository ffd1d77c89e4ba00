use std::path::PathBuf;

use modsync_backend::SyncError;
use modsync_core::SyncPhase;
use modsync_platform::AppPathsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Paths(#[from] AppPathsError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("no repository configured")]
    MissingRepo,

    #[error("no modpack directory configured")]
    MissingTarget,

    #[error("no GitHub token given")]
    MissingToken,

    #[error("no manifest or instance file given")]
    MissingManifest,

    #[error("failed to read {path}: {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a valid manifest: {source}")]
    ParseManifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to save settings: {0}")]
    SaveSettings(#[source] std::io::Error),

    #[error("cancelled during {phase}")]
    Cancelled { phase: SyncPhase },
}

impl AppError {
    pub fn read_input(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadInput {
            path: path.into(),
            source,
        }
    }

    /// Remediation text shown under the error message, if any.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Sync(error) => Some(error.hint()),
            Self::MissingRepo => Some("Pass --repo owner/name or run `modsync configure --repo`."),
            Self::MissingTarget => {
                Some("Pass --target <dir> or run `modsync configure --target`.")
            }
            Self::MissingToken => Some("Pass --token or set MODSYNC_GITHUB_TOKEN."),
            Self::MissingManifest => {
                Some("Pass a manifest file or --instance <minecraftinstance.json>.")
            }
            Self::ParseManifest { .. } => {
                Some("The manifest must use the published update format.")
            }
            Self::Paths(_)
            | Self::ReadInput { .. }
            | Self::SaveSettings(_)
            | Self::Cancelled { .. } => None,
        }
    }

    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Sync(error) => Some(error.code()),
            _ => None,
        }
    }

    /// Process exit code: 130 for cancellation, 2 for usage problems, 1
    /// otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Cancelled { .. } => 130,
            Self::MissingRepo
            | Self::MissingTarget
            | Self::MissingToken
            | Self::MissingManifest => 2,
            _ => 1,
        }
    }
}
