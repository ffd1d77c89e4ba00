//! GitHub contents API as the remote store for published update bundles.
//!
//! A bundle for `owner/name` and update UUID `u` lives in the repository as
//! `u/manifest.json` next to its config files at `u/<relative_path>`.

mod error;
mod repo;
mod store;

pub use error::GitHubError;
pub use repo::RepoRef;
pub use store::{DEFAULT_API_BASE, GitHubStore};
