mod instance;
mod lock;
mod paths;
mod store;
mod write;

pub use instance::{InstanceError, import_minecraft_instance};
pub use lock::{LockError, TargetLock};
pub use paths::{AppPaths, AppPathsError};
pub use store::FileEntryStore;
pub use write::{
    WriteError, WriteRequest, WrittenFile, remove_created, validate_relative_path, write_atomic,
};
