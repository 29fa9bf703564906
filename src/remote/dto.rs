use serde::{Deserialize, Deserializer, Serialize};

use crate::models::Message;

/// List bodies come either bare or wrapped in a paging envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListResponse {
    Paged { meta: ListMeta, objects: Vec<RemoteMessage> },
    Bare(Vec<RemoteMessage>),
}

impl ListResponse {
    pub fn into_parts(self) -> (Vec<RemoteMessage>, Option<String>) {
        match self {
            ListResponse::Paged { meta, objects } => (objects, meta.next),
            ListResponse::Bare(objects) => (objects, None),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListMeta {
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteMessage {
    #[serde(default, deserialize_with = "deserialize_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, rename = "uniqueId", alias = "unique_id", skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_nullable_string")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default, rename = "alertType", alias = "alert_type", skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<String>,
}

impl RemoteMessage {
    pub fn into_message(self) -> Message {
        let unique_id = match (self.unique_id, self.id) {
            (Some(unique_id), _) if !unique_id.is_empty() => unique_id,
            (_, Some(id)) => Message::derived_unique_id(id),
            _ => uuid::Uuid::new_v4().to_string(),
        };

        Message {
            id: self.id,
            unique_id,
            name: self.name,
            description: self.description,
            priority: self.priority,
            alert_type: self.alert_type,
        }
    }

    /// Acknowledgment of `local`: the server's fields win, but the client's
    /// unique id is kept even when the server does not echo it.
    pub fn into_acknowledgment_of(self, local: &Message) -> Message {
        let mut message = self.into_message();
        message.unique_id = local.unique_id.clone();
        message
    }
}

impl From<&Message> for RemoteMessage {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            unique_id: Some(message.unique_id.clone()),
            name: message.name.clone(),
            description: message.description.clone(),
            priority: message.priority,
            alert_type: message.alert_type.clone(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Number(i64),
    Text(String),
}

/// Ids arrive as numbers or as numeric strings depending on the backend version.
fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<IdRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IdRepr::Number(id)) => Ok(Some(id)),
        Some(IdRepr::Text(text)) if text.is_empty() => Ok(None),
        Some(IdRepr::Text(text)) => text
            .parse::<i64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn deserialize_nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
