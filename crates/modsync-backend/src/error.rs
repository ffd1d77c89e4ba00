use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Network error during {operation}: {details}")]
    Network {
        operation: &'static str,
        details: String,
    },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Authentication failed: {details}")]
    Auth { details: String },

    #[error("Malformed {context}: {details}")]
    Malformed {
        context: &'static str,
        details: String,
    },

    #[error("Installation failed during {phase}: {details}")]
    Install {
        phase: &'static str,
        details: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    NotFound,
    Auth,
    Malformed,
    Install,
}

impl SyncError {
    pub fn network(operation: &'static str, details: impl Into<String>) -> Self {
        Self::Network {
            operation,
            details: details.into(),
        }
    }

    pub fn network_from<E>(operation: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::network(operation, error.to_string())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn auth(details: impl Into<String>) -> Self {
        Self::Auth {
            details: details.into(),
        }
    }

    pub fn malformed(context: &'static str, details: impl Into<String>) -> Self {
        Self::Malformed {
            context,
            details: details.into(),
        }
    }

    pub fn malformed_from<E>(context: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::malformed(context, error.to_string())
    }

    pub fn install_failed(phase: &'static str, details: impl Into<String>) -> Self {
        Self::Install {
            phase,
            details: details.into(),
        }
    }

    pub fn install_failed_from<E>(phase: &'static str, error: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::install_failed(phase, error.to_string())
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Malformed { .. } => ErrorKind::Malformed,
            Self::Install { .. } => ErrorKind::Install,
        }
    }

    /// Whether a retry policy may re-run the failed operation on its own.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Network
    }

    /// Whether the presentation layer should offer a manual "retry" action.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network | ErrorKind::Install)
    }

    /// Stable machine-readable code for the presentation layer.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::NotFound => "UPDATE_NOT_FOUND",
            ErrorKind::Auth => "GITHUB_AUTH_ERROR",
            ErrorKind::Malformed => "INVALID_MANIFEST",
            ErrorKind::Install => "INSTALL_FAILED",
        }
    }

    #[must_use]
    pub fn hint(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Network => "Check your internet connection and try again.",
            ErrorKind::NotFound => {
                "Check the update code and ensure the update was uploaded correctly."
            }
            ErrorKind::Auth => {
                "Check your GitHub token and ensure it has the required permissions."
            }
            ErrorKind::Malformed => {
                "The manifest is corrupted or in an unsupported format. Ask the modpack author to republish it."
            }
            ErrorKind::Install => "Check disk space and ensure the modpack directory is writable.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorKind, SyncError};

    #[test]
    fn only_network_errors_are_transient() {
        assert!(SyncError::network("fetch manifest", "connection reset").is_transient());
        assert!(!SyncError::not_found("r/u1").is_transient());
        assert!(!SyncError::auth("bad credentials").is_transient());
        assert!(!SyncError::malformed("manifest", "expected value").is_transient());
        assert!(!SyncError::install_failed("write config", "disk full").is_transient());
    }

    #[test]
    fn codes_are_stable_per_kind() {
        let cases = [
            (SyncError::network("op", "x"), ErrorKind::Network, "NETWORK_ERROR"),
            (SyncError::not_found("x"), ErrorKind::NotFound, "UPDATE_NOT_FOUND"),
            (SyncError::auth("x"), ErrorKind::Auth, "GITHUB_AUTH_ERROR"),
            (
                SyncError::malformed("manifest", "x"),
                ErrorKind::Malformed,
                "INVALID_MANIFEST",
            ),
            (
                SyncError::install_failed("phase", "x"),
                ErrorKind::Install,
                "INSTALL_FAILED",
            ),
        ];

        for (error, kind, code) in cases {
            assert_eq!(error.kind(), kind);
            assert_eq!(error.code(), code);
            assert!(!error.hint().is_empty());
        }
    }

    #[test]
    fn install_errors_offer_manual_retry() {
        assert!(SyncError::install_failed("download addon", "timeout").can_retry());
        assert!(!SyncError::auth("401").can_retry());
    }

    #[test]
    fn display_includes_context() {
        let error = SyncError::network_from("fetch manifest", "connection refused");
        assert_eq!(
            error.to_string(),
            "Network error during fetch manifest: connection refused"
        );
    }
}
