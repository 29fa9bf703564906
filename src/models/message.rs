use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// How a record is addressed before and after the server has seen it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MessageKey {
    Server(i64),
    Local(String),
}

impl MessageKey {
    /// Numeric path segments address server ids, anything else a unique id.
    pub fn parse(segment: &str) -> Self {
        let segment = segment.trim_end_matches('/');
        match segment.parse::<i64>() {
            Ok(id) => MessageKey::Server(id),
            Err(_) => MessageKey::Local(segment.to_string()),
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKey::Server(id) => write!(f, "{}", id),
            MessageKey::Local(unique_id) => write!(f, "{}", unique_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Option<i64>,
    pub unique_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub alert_type: Option<String>,
}

impl Message {
    pub fn new(req: NewMessageRequest) -> Self {
        Self {
            id: None,
            unique_id: Uuid::new_v4().to_string(),
            name: req.name,
            description: req.description,
            priority: req.priority,
            alert_type: req.alert_type,
        }
    }

    /// Stable unique id for a server record that never carried one.
    pub fn derived_unique_id(id: i64) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("message/{}", id).as_bytes()).to_string()
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn key(&self) -> MessageKey {
        match self.id {
            Some(id) => MessageKey::Server(id),
            None => MessageKey::Local(self.unique_id.clone()),
        }
    }

    pub fn matches_key(&self, key: &MessageKey) -> bool {
        match key {
            MessageKey::Server(id) => self.id == Some(*id),
            MessageKey::Local(unique_id) => &self.unique_id == unique_id,
        }
    }

    /// Identity used for de-duplication: server id when both sides have
    /// one, otherwise the unique id.
    pub fn same_record(&self, other: &Message) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.unique_id == other.unique_id,
        }
    }

    /// Case-insensitive substring match on `name`. `needle` must already be lowercase.
    pub fn name_contains(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
    }

    pub fn assign_server_id(&mut self, id: i64) -> Result<(), AppError> {
        match self.id {
            None => {
                self.id = Some(id);
                Ok(())
            }
            Some(existing) if existing == id => Ok(()),
            Some(existing) => Err(AppError::Conflict(format!(
                "message {} already has server id {}, refusing {}",
                self.unique_id, existing, id
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessageRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub alert_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessageRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i32>,
    pub alert_type: Option<String>,
}

impl UpdateMessageRequest {
    pub fn apply_to(self, message: &mut Message) {
        if let Some(name) = self.name {
            message.name = name;
        }
        if let Some(description) = self.description {
            message.description = description;
        }
        if let Some(priority) = self.priority {
            message.priority = Some(priority);
        }
        if let Some(alert_type) = self.alert_type {
            message.alert_type = Some(alert_type);
        }
    }
}
