use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, broadcast};

use crate::models::{Message, MessageKey};

const CHANGE_BUFFER: usize = 64;

pub type SharedCollection = Arc<RwLock<MessageCollection>>;

/// Notification published after every mutation of the collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectionChange {
    Reset { len: usize },
    Add { key: MessageKey },
    Change { key: MessageKey },
    Remove { key: MessageKey },
}

/// Ordered, duplicate-free set of messages held in memory.
#[derive(Debug)]
pub struct MessageCollection {
    items: Vec<Message>,
    changes: broadcast::Sender<CollectionChange>,
}

impl Default for MessageCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageCollection {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self { items: Vec::new(), changes }
    }

    pub fn shared() -> SharedCollection {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CollectionChange> {
        self.changes.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<Message> {
        self.items.clone()
    }

    pub fn get(&self, key: &MessageKey) -> Option<&Message> {
        self.items.iter().find(|m| m.matches_key(key))
    }

    /// Replaces the contents. Later duplicates overwrite earlier ones in place.
    pub fn reset(&mut self, messages: Vec<Message>) {
        let mut items: Vec<Message> = Vec::with_capacity(messages.len());
        for message in messages {
            match items.iter_mut().find(|m| m.same_record(&message)) {
                Some(existing) => *existing = message,
                None => items.push(message),
            }
        }
        self.items = items;
        self.notify(CollectionChange::Reset { len: self.items.len() });
    }

    /// Adds `message`, or replaces the record it is the same as.
    /// Returns true when the message was added.
    pub fn upsert(&mut self, message: Message) -> bool {
        match self.items.iter_mut().find(|m| m.same_record(&message)) {
            Some(existing) => {
                let key = message.key();
                *existing = message;
                self.notify(CollectionChange::Change { key });
                false
            }
            None => {
                let key = message.key();
                self.items.push(message);
                self.notify(CollectionChange::Add { key });
                true
            }
        }
    }

    pub fn remove(&mut self, key: &MessageKey) -> Option<Message> {
        let position = self.items.iter().position(|m| m.matches_key(key))?;
        let removed = self.items.remove(position);
        self.notify(CollectionChange::Remove { key: removed.key() });
        Some(removed)
    }

    /// Case-insensitive substring match on `name` over what is in memory.
    pub fn filter_by_name(&self, query: &str) -> Vec<Message> {
        let needle = query.to_lowercase();
        self.items
            .iter()
            .filter(|m| m.name_contains(&needle))
            .cloned()
            .collect()
    }

    fn notify(&self, change: CollectionChange) {
        // No subscribers is not an error.
        let _ = self.changes.send(change);
    }
}
