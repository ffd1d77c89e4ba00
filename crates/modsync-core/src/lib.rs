//! Update synchronization core for modsync.
//!
//! This crate holds the logic that is independent of any concrete remote
//! store or installer:
//! - A tiered cache with TTL expiry and an optional durable layer.
//! - Retry with exponential backoff and transient-error classification.
//! - Manifest diffing by addon project id.
//! - The sync orchestrator state machine and its one-shot service owner.

mod batch;
mod cache;
mod clock;
mod diff;
mod flight;
mod retry;
mod service;
mod sync;

#[cfg(test)]
mod test_support;

/// Order-preserving bounded-concurrency helper.
pub use batch::process_in_batches;
/// Tiered cache, its configuration and point-in-time statistics.
pub use cache::{CacheConfig, CacheStats, TieredCache};
pub use clock::{Clock, ManualClock, SystemClock};
/// Manifest diff results and the functions computing them.
pub use diff::{AddonChanges, AddonUpgrade, UpdateDiff, addon_changes, diff_manifests};
pub use flight::{KeyGuard, KeyedLocks};
/// Retry policy and error classification.
pub use retry::{RetryPolicy, RetryState, Transient, message_indicates_transient};
pub use service::SyncService;
/// Orchestrator, its requests, progress events and outcomes.
pub use sync::{
    BundleKey, CachedBundle, ProgressSender, PublishRequest, SyncConfig, SyncMode,
    SyncOrchestrator, SyncOutcome, SyncPhase, SyncProgress, SyncReport, SyncRequest,
    UpdatePreview,
};
