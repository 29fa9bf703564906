pub mod dto;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url, header};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::Message;

/// Upper bound on `meta.next` hops for a single list request.
const MAX_PAGES: usize = 100;

#[async_trait]
pub trait MessageApi: Send + Sync {
    /// `None` fetches the whole collection, `Some(key)` filters on `name__contains`.
    async fn fetch_messages(&self, name_filter: Option<&str>) -> Result<Vec<Message>, AppError>;
    async fn create_message(&self, message: &Message) -> Result<Message, AppError>;
    async fn update_message(&self, message: &Message) -> Result<Message, AppError>;
    async fn delete_message(&self, id: i64) -> Result<(), AppError>;
}

pub struct MessageHttpClient {
    client: Client,
    base_url: Url,
}

impl MessageHttpClient {
    pub fn new(base_url: Url) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, base_url })
    }

    /// Item urls keep the trailing slash: `<base><id>/`.
    pub fn item_url(&self, id: i64) -> Result<Url, AppError> {
        self.base_url
            .join(&format!("{}/", id))
            .map_err(|e| AppError::Config(format!("Failed to build item url for {}: {}", id, e)))
    }

    fn search_url(&self, name_filter: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Some(key) = name_filter {
            url.query_pairs_mut().append_pair("name__contains", key);
        }
        url
    }

    async fn fetch_page(&self, url: Url) -> Result<dto::ListResponse, AppError> {
        debug!("GET {}", url);
        let response = self.client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let body_text = response.text().await?;
        serde_json::from_str::<dto::ListResponse>(&body_text)
            .map_err(|e| {
                tracing::error!("Failed to parse message list: {}", e);
                AppError::BadRequest(format!("Failed to parse message list: {}", e))
            })
    }
}

#[async_trait]
impl MessageApi for MessageHttpClient {
    async fn fetch_messages(&self, name_filter: Option<&str>) -> Result<Vec<Message>, AppError> {
        let mut url = self.search_url(name_filter);
        let mut messages = Vec::new();

        for _ in 0..MAX_PAGES {
            let (objects, next) = self.fetch_page(url.clone()).await?.into_parts();
            messages.extend(objects.into_iter().map(dto::RemoteMessage::into_message));

            match next {
                Some(next) if !next.is_empty() => {
                    url = url
                        .join(&next)
                        .map_err(|e| AppError::BadRequest(format!("Invalid next page {}: {}", next, e)))?;
                }
                _ => return Ok(messages),
            }
        }

        warn!("Stopped following pages after {} requests", MAX_PAGES);
        Ok(messages)
    }

    async fn create_message(&self, message: &Message) -> Result<Message, AppError> {
        let request_body = dto::RemoteMessage::from(message);

        let response = self.client
            .post(self.base_url.clone())
            .header(header::ACCEPT, "application/json")
            .json(&request_body)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body_text = response.text().await?;

        if let Ok(remote) = serde_json::from_str::<dto::RemoteMessage>(&body_text) {
            if remote.id.is_some() {
                return Ok(remote.into_acknowledgment_of(message));
            }
        }

        // Created without a body: the new id is the last path segment of Location.
        let id = location
            .as_deref()
            .and_then(id_from_location)
            .ok_or_else(|| AppError::BadRequest("Create acknowledged without an id".to_string()))?;
        let mut acknowledged = message.clone();
        acknowledged.assign_server_id(id)?;
        Ok(acknowledged)
    }

    async fn update_message(&self, message: &Message) -> Result<Message, AppError> {
        let id = message
            .id
            .ok_or_else(|| AppError::BadRequest(format!("message {} has no server id", message.unique_id)))?;
        let url = self.item_url(id)?;
        debug!("PUT {}", url);

        let response = self.client
            .put(url)
            .header(header::ACCEPT, "application/json")
            .json(&dto::RemoteMessage::from(message))
            .send()
            .await?;
        let response = ensure_success(response).await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(message.clone());
        }
        let body_text = response.text().await?;
        match serde_json::from_str::<dto::RemoteMessage>(&body_text) {
            Ok(remote) => Ok(remote.into_acknowledgment_of(message)),
            Err(_) => Ok(message.clone()),
        }
    }

    async fn delete_message(&self, id: i64) -> Result<(), AppError> {
        let url = self.item_url(id)?;
        debug!("DELETE {}", url);

        let response = self.client.delete(url).send().await?;
        ensure_success(response).await?;
        Ok(())
    }
}

async fn ensure_success(response: Response) -> Result<Response, AppError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(AppError::Remote { status: status.as_u16(), body })
}

fn id_from_location(location: &str) -> Option<i64> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
}

/// Stands in for the remote when the client is started offline; every call
/// fails the way an unreachable server would.
pub struct OfflineMessageApi;

#[async_trait]
impl MessageApi for OfflineMessageApi {
    async fn fetch_messages(&self, _name_filter: Option<&str>) -> Result<Vec<Message>, AppError> {
        Err(AppError::Network("remote api is offline".to_string()))
    }

    async fn create_message(&self, _message: &Message) -> Result<Message, AppError> {
        Err(AppError::Network("remote api is offline".to_string()))
    }

    async fn update_message(&self, _message: &Message) -> Result<Message, AppError> {
        Err(AppError::Network("remote api is offline".to_string()))
    }

    async fn delete_message(&self, _id: i64) -> Result<(), AppError> {
        Err(AppError::Network("remote api is offline".to_string()))
    }
}
