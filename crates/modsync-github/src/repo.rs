use std::fmt;
use std::str::FromStr;

use crate::error::GitHubError;

/// An `owner/name` repository reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl FromStr for RepoRef {
    type Err = GitHubError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || GitHubError::InvalidRepo {
            value: value.to_string(),
        };
        let (owner, name) = value.trim().split_once('/').ok_or_else(invalid)?;
        let name = name.trim_end_matches(".git");

        if !is_path_segment(owner) || !is_path_segment(name) {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A single non-empty URL path segment that cannot climb directories.
pub(crate) fn is_path_segment(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\', '?', '#'])
}

#[cfg(test)]
mod tests {
    use super::{RepoRef, is_path_segment};

    #[test]
    fn parses_owner_and_name() {
        let repo: RepoRef = "modsync/packs".parse().expect("valid repo");
        assert_eq!(repo.owner, "modsync");
        assert_eq!(repo.name, "packs");
        assert_eq!(repo.to_string(), "modsync/packs");
    }

    #[test]
    fn strips_git_suffix() {
        let repo: RepoRef = "modsync/packs.git".parse().expect("valid repo");
        assert_eq!(repo.name, "packs");
    }

    #[test]
    fn rejects_malformed_repos() {
        for value in ["", "packs", "/packs", "modsync/", "a/b/c", "../x"] {
            assert!(value.parse::<RepoRef>().is_err(), "{value} should be rejected");
        }
    }

    #[test]
    fn path_segments_cannot_escape() {
        assert!(is_path_segment("3f2c9b1e-uuid"));
        assert!(!is_path_segment(".."));
        assert!(!is_path_segment("a/b"));
    }
}
