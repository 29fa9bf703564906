use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::collection::SharedCollection;
use crate::db::repository;
use crate::error::AppError;
use crate::models::{Message, MessageKey, NewMessageRequest, UpdateMessageRequest};
use crate::remote::MessageApi;
use crate::state::Connectivity;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum CreateOutcome {
    /// The server acknowledged the record and assigned its id.
    Acknowledged(Message),
    /// Offline: kept in memory and in the local mirror only.
    StoredLocally(Message),
}

impl CreateOutcome {
    pub fn message(&self) -> &Message {
        match self {
            CreateOutcome::Acknowledged(message) | CreateOutcome::StoredLocally(message) => message,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub message: Message,
    pub remote_acknowledged: bool,
}

pub struct MessageService {
    db: SqlitePool,
    api: Arc<dyn MessageApi>,
    collection: SharedCollection,
    connectivity: Arc<Connectivity>,
}

impl MessageService {
    pub fn new(
        db: SqlitePool,
        api: Arc<dyn MessageApi>,
        collection: SharedCollection,
        connectivity: Arc<Connectivity>,
    ) -> Self {
        Self { db, api, collection, connectivity }
    }

    pub async fn list(&self) -> Vec<Message> {
        self.collection.read().await.to_vec()
    }

    pub async fn get(&self, key: &MessageKey) -> Result<Message, AppError> {
        self.collection
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    pub async fn create(&self, req: NewMessageRequest) -> Result<CreateOutcome, AppError> {
        let message = Message::new(req);

        if self.connectivity.is_online() {
            match self.api.create_message(&message).await {
                Ok(acknowledged) => {
                    info!("POST complete for {} (id {:?})", acknowledged.unique_id, acknowledged.id);
                    self.connectivity.mark_online();
                    self.collection.write().await.upsert(acknowledged.clone());
                    return Ok(CreateOutcome::Acknowledged(acknowledged));
                }
                Err(e) if e.is_network() => {
                    warn!("create failed to reach the server, storing locally: {}", e);
                    self.connectivity.mark_offline();
                }
                Err(e) => return Err(e),
            }
        }

        self.store_locally(message).await
    }

    async fn store_locally(&self, message: Message) -> Result<CreateOutcome, AppError> {
        self.collection.write().await.upsert(message.clone());
        repository::mirror_message(&self.db, &message).await?;
        info!("stored {} locally", message.unique_id);
        Ok(CreateOutcome::StoredLocally(message))
    }

    /// Remote update of an existing record. A failure is logged and returned;
    /// nothing is written locally in that case. Records the server has never
    /// seen are edited in memory and in the mirror.
    pub async fn update(&self, key: &MessageKey, req: UpdateMessageRequest) -> Result<Message, AppError> {
        let mut message = self.get(key).await?;
        req.apply_to(&mut message);

        if message.is_new() {
            self.collection.write().await.upsert(message.clone());
            repository::put_entry(&self.db, &message).await?;
            return Ok(message);
        }

        match self.api.update_message(&message).await {
            Ok(updated) => {
                info!("PUT complete for {}", updated.key());
                self.connectivity.mark_online();
                let mut collection = self.collection.write().await;
                if repository::is_indexed(&self.db, &updated.unique_id).await? {
                    repository::put_entry(&self.db, &updated).await?;
                }
                collection.upsert(updated.clone());
                Ok(updated)
            }
            Err(e) => {
                warn!("Error on PUT for {}: {}", message.key(), e);
                if e.is_network() {
                    self.connectivity.mark_offline();
                }
                Err(e)
            }
        }
    }

    /// The record leaves the collection and the mirror whether or not the
    /// server confirmed the delete.
    pub async fn delete(&self, key: &MessageKey) -> Result<DeleteOutcome, AppError> {
        let message = self.get(key).await?;

        let mut remote_acknowledged = match message.id {
            Some(id) => self.delete_remote(id).await,
            None => false,
        };

        // Collection and mirror go together under the write lock so a
        // reconcile pass never sees one without the other.
        let removed = {
            let mut collection = self.collection.write().await;
            let removed = collection.remove(key);
            repository::remove_message(&self.db, &message.unique_id).await?;
            removed
        };

        // Acknowledged by a reconcile pass after we looked it up.
        if let (None, Some(Message { id: Some(id), .. })) = (message.id, &removed) {
            remote_acknowledged = self.delete_remote(*id).await;
        }

        Ok(DeleteOutcome { message, remote_acknowledged })
    }

    async fn delete_remote(&self, id: i64) -> bool {
        match self.api.delete_message(id).await {
            Ok(()) => {
                info!("message {} destroyed", id);
                self.connectivity.mark_online();
                true
            }
            Err(e) => {
                warn!("no access to server for delete of {}, treating as local-only: {}", id, e);
                if e.is_network() {
                    self.connectivity.mark_offline();
                }
                false
            }
        }
    }
}
