mod error;
mod traits;
mod types;

pub use error::{ErrorKind, SyncError};
pub use traits::{DurableStore, Installer, RemoteStore};
pub use types::{
    Addon, AddonCategory, ConfigFile, ConfigFileContent, MANIFEST_FILE_NAME, Manifest, UpdateKind,
};
