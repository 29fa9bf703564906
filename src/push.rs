//! Applies events from the external push service to the shared collection.
//!
//! The transport is not modelled here: anything that can deserialize a
//! [`PushEvent`] hands it to a [`PushSender`], and the [`PushListener`]
//! task drains the channel.

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::collection::{MessageCollection, SharedCollection};
use crate::remote::dto::RemoteMessage;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    Add(RemoteMessage),
    Change(RemoteMessage),
    Remove(RemoteMessage),
    Reset(Vec<RemoteMessage>),
}

pub type PushSender = mpsc::Sender<PushEvent>;

pub fn apply_event(collection: &mut MessageCollection, event: PushEvent) {
    match event {
        PushEvent::Add(remote) | PushEvent::Change(remote) => {
            collection.upsert(remote.into_message());
        }
        PushEvent::Remove(remote) => {
            let key = remote.into_message().key();
            if collection.remove(&key).is_none() {
                debug!("push remove for unknown message {}", key);
            }
        }
        PushEvent::Reset(remotes) => {
            collection.reset(remotes.into_iter().map(RemoteMessage::into_message).collect());
        }
    }
}

pub struct PushListener {
    collection: SharedCollection,
    events: mpsc::Receiver<PushEvent>,
}

impl PushListener {
    pub fn channel(collection: SharedCollection, buffer: usize) -> (PushSender, Self) {
        let (tx, events) = mpsc::channel(buffer);
        (tx, Self { collection, events })
    }

    /// Runs until every sender has been dropped.
    pub async fn run(mut self) {
        info!("push listener started");
        while let Some(event) = self.events.recv().await {
            debug!("push event: {:?}", event);
            let mut collection = self.collection.write().await;
            apply_event(&mut collection, event);
        }
        info!("push listener stopped");
    }
}
