//! Applies update bundles to a modpack directory on disk.

mod error;
mod installer;

pub use error::InstallError;
pub use installer::{DEFAULT_BATCH_SIZE, DISABLED_SUFFIX, DiskInstaller, addon_relative_path};
