use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::services::reconcile::ReconcileService;

/// Periodically pushes offline-created records to the server.
pub struct ReconcileScheduler {
    service: Arc<ReconcileService>,
    interval: Duration,
}

impl ReconcileScheduler {
    pub fn new(service: Arc<ReconcileService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Runs forever; abort the task to stop it.
    pub async fn start(self) {
        info!("Starting reconcile scheduler (interval: {:?})", self.interval);

        loop {
            tokio::time::sleep(self.interval).await;

            match self.service.push_pending().await {
                Ok(stats) if stats.pushed + stats.failed + stats.remaining > 0 => {
                    info!(
                        "Auto-reconcile completed - Pushed: {} | Failed: {} | Remaining: {}",
                        stats.pushed, stats.failed, stats.remaining
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    // The loop keeps going after a failed pass.
                    warn!("Auto-reconcile failed: {:?}", e);
                }
            }
        }
    }
}
