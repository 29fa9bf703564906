use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::collection::SharedCollection;
use crate::db::repository;
use crate::error::AppError;
use crate::models::{Message, MessageKey};
use crate::remote::MessageApi;
use crate::state::Connectivity;

/// Pushes records created while offline to the server.
pub struct ReconcileService {
    db: SqlitePool,
    api: Arc<dyn MessageApi>,
    collection: SharedCollection,
    connectivity: Arc<Connectivity>,
    /// Held for a whole pass so two passes never push the same record.
    pass: Mutex<()>,
}

#[derive(Debug, Default, Serialize)]
pub struct ReconcileStats {
    pub pushed: usize,
    pub failed: usize,
    pub remaining: usize,
    /// Acknowledged after being deleted locally; removed from the server again.
    pub withdrawn: usize,
}

impl ReconcileService {
    pub fn new(
        db: SqlitePool,
        api: Arc<dyn MessageApi>,
        collection: SharedCollection,
        connectivity: Arc<Connectivity>,
    ) -> Self {
        Self {
            db,
            api,
            collection,
            connectivity,
            pass: Mutex::new(()),
        }
    }

    /// Records without a server id, from memory first and then from the mirror.
    pub async fn pending(&self) -> Result<Vec<Message>, AppError> {
        let mut pending: Vec<Message> = self
            .collection
            .read()
            .await
            .iter()
            .filter(|m| m.is_new())
            .cloned()
            .collect();

        let snapshot = repository::load_indexed(&self.db).await?;
        for message in snapshot.messages.into_iter().filter(Message::is_new) {
            if !pending.iter().any(|p| p.unique_id == message.unique_id) {
                pending.push(message);
            }
        }

        Ok(pending)
    }

    pub async fn push_pending(&self) -> Result<ReconcileStats, AppError> {
        let _pass = self.pass.lock().await;
        let pending = self.pending().await?;
        let mut stats = ReconcileStats::default();
        if pending.is_empty() {
            return Ok(stats);
        }
        info!("reconciling {} locally created messages", pending.len());

        let total = pending.len();
        for (done, message) in pending.into_iter().enumerate() {
            match self.api.create_message(&message).await {
                Ok(acknowledged) => {
                    self.connectivity.mark_online();
                    if self.apply_acknowledgment(&message, &acknowledged).await? {
                        stats.pushed += 1;
                    } else {
                        self.withdraw(&acknowledged).await;
                        stats.withdrawn += 1;
                    }
                }
                Err(e) if e.is_network() => {
                    warn!("server unreachable during reconcile, stopping: {}", e);
                    self.connectivity.mark_offline();
                    stats.remaining = total - done;
                    break;
                }
                Err(e) => {
                    warn!("server rejected {}: {}", message.unique_id, e);
                    stats.failed += 1;
                }
            }
        }

        info!(
            "reconcile finished: pushed {}, failed {}, remaining {}, withdrawn {}",
            stats.pushed, stats.failed, stats.remaining, stats.withdrawn
        );
        Ok(stats)
    }

    /// Replaces the local record with its acknowledgment, unless it was
    /// deleted while the create was in flight. Runs under the collection
    /// write lock so a concurrent delete sees either the old or the new record.
    async fn apply_acknowledgment(&self, local: &Message, acknowledged: &Message) -> Result<bool, AppError> {
        let mut collection = self.collection.write().await;
        let in_memory = collection.get(&MessageKey::Local(local.unique_id.clone())).is_some();
        let in_mirror = repository::is_indexed(&self.db, &local.unique_id).await?;
        if !in_memory && !in_mirror {
            return Ok(false);
        }

        repository::put_entry(&self.db, acknowledged).await?;
        if in_memory {
            collection.upsert(acknowledged.clone());
        }
        Ok(true)
    }

    async fn withdraw(&self, acknowledged: &Message) {
        let Some(id) = acknowledged.id else {
            return;
        };
        info!("{} was deleted during reconcile, removing server copy {}", acknowledged.unique_id, id);
        if let Err(e) = self.api.delete_message(id).await {
            warn!("failed to remove server copy {} of deleted {}: {}", id, acknowledged.unique_id, e);
        }
    }
}
