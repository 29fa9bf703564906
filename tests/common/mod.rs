#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use message_mirror::config::AppConfig;
use message_mirror::db;
use message_mirror::error::AppError;
use message_mirror::models::{Message, NewMessageRequest};
use message_mirror::remote::MessageApi;
use message_mirror::state::AppState;

/// In-process stand-in for the remote API that can be switched off.
pub struct FakeApi {
    online: AtomicBool,
    next_id: AtomicI64,
    records: Mutex<Vec<Message>>,
    pub deletes: Mutex<Vec<i64>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(true),
            next_id: AtomicI64::new(1),
            records: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
        })
    }

    pub fn with_records(names: &[&str]) -> Arc<Self> {
        let api = Self::new();
        for name in names {
            let mut message = Message::new(request(name));
            message.id = Some(api.next_id.fetch_add(1, Ordering::SeqCst));
            api.records.lock().unwrap().push(message);
        }
        api
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<Message> {
        self.records.lock().unwrap().clone()
    }

    fn check_online(&self) -> Result<(), AppError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::Network("connection refused".to_string()))
        }
    }
}

#[async_trait]
impl MessageApi for FakeApi {
    async fn fetch_messages(&self, name_filter: Option<&str>) -> Result<Vec<Message>, AppError> {
        self.check_online()?;
        let needle = name_filter.unwrap_or_default().to_lowercase();
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn create_message(&self, message: &Message) -> Result<Message, AppError> {
        self.check_online()?;
        let mut acknowledged = message.clone();
        acknowledged.assign_server_id(self.next_id.fetch_add(1, Ordering::SeqCst))?;
        self.records.lock().unwrap().push(acknowledged.clone());
        Ok(acknowledged)
    }

    async fn update_message(&self, message: &Message) -> Result<Message, AppError> {
        self.check_online()?;
        let mut records = self.records.lock().unwrap();
        let existing = records
            .iter_mut()
            .find(|m| m.id == message.id)
            .ok_or(AppError::Remote { status: 404, body: "not found".to_string() })?;
        *existing = message.clone();
        Ok(message.clone())
    }

    async fn delete_message(&self, id: i64) -> Result<(), AppError> {
        self.deletes.lock().unwrap().push(id);
        self.check_online()?;
        self.records.lock().unwrap().retain(|m| m.id != Some(id));
        Ok(())
    }
}

pub fn request(name: &str) -> NewMessageRequest {
    NewMessageRequest {
        name: name.to_string(),
        description: format!("{} description", name),
        priority: None,
        alert_type: None,
    }
}

pub fn test_config(start_offline: bool) -> AppConfig {
    let mut config = AppConfig::for_base_url("http://127.0.0.1:9/api/v2/message/")
        .expect("Failed to build config");
    config.transition = Duration::ZERO;
    config.start_offline = start_offline;
    config
}

pub async fn test_state(api: Arc<dyn MessageApi>, start_offline: bool) -> AppState {
    let pool = db::connect_in_memory().await.expect("Failed to create test db");
    let (state, listener) = AppState::new(test_config(start_offline), pool, api);
    tokio::spawn(listener.run());
    state
}

pub fn names(messages: &[Message]) -> Vec<String> {
    let mut names: Vec<String> = messages.iter().map(|m| m.name.clone()).collect();
    names.sort();
    names
}
