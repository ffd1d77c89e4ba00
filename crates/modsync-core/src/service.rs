use std::future::Future;
use std::sync::Arc;

use log::info;
use modsync_backend::SyncError;
use tokio::sync::OnceCell;

use crate::sync::SyncOrchestrator;

/// Owner of the process's orchestrator.
///
/// The orchestrator is built lazily on first use. Concurrent first callers
/// share one initialization; a failed initialization is retried by the next
/// caller.
#[derive(Default)]
pub struct SyncService {
    orchestrator: OnceCell<Arc<SyncOrchestrator>>,
}

impl SyncService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns the initializer's error when the orchestrator has not been
    /// built yet and building it fails.
    pub async fn get_or_init<F, Fut>(&self, init: F) -> Result<Arc<SyncOrchestrator>, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SyncOrchestrator, SyncError>>,
    {
        self.orchestrator
            .get_or_try_init(|| async move {
                let orchestrator = init().await?;
                info!("Sync service initialized");
                Ok(Arc::new(orchestrator))
            })
            .await
            .map(Arc::clone)
    }

    pub fn get(&self) -> Option<Arc<SyncOrchestrator>> {
        self.orchestrator.get().map(Arc::clone)
    }

    #[cfg(test)]
    fn is_initialized(&self) -> bool {
        self.orchestrator.initialized()
    }
}
