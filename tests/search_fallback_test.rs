mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use message_mirror::collection::MessageCollection;
use message_mirror::db::{self, repository};
use message_mirror::error::AppError;
use message_mirror::models::{Message, MessageKey, UpdateMessageRequest};
use message_mirror::remote::MessageApi;
use message_mirror::services::{CreateOutcome, SearchCoordinator, SearchSource};
use message_mirror::state::Connectivity;
use tokio::sync::Notify;

use common::{FakeApi, names, request, test_state};

#[tokio::test]
async fn test_failed_search_with_key_filters_memory() {
    let api = FakeApi::with_records(&["Team Sync", "Lunch"]);
    let state = test_state(api.clone(), false).await;

    let outcome = state.search.refresh().await.expect("refresh failed");
    assert_eq!(outcome.source, SearchSource::Remote);
    assert_eq!(outcome.count, 2);

    api.set_online(false);
    let outcome = state.search.search("team").await.expect("search failed");
    assert_eq!(outcome.source, SearchSource::MemoryFilter);

    let messages = state.messages.list().await;
    assert_eq!(names(&messages), vec!["Team Sync".to_string()]);
    assert!(!state.connectivity.is_online());
}

#[tokio::test]
async fn test_failed_search_keeps_every_matching_record() {
    let api = FakeApi::with_records(&["Standup", "standup notes", "Retro", "STANDUP (moved)"]);
    let state = test_state(api.clone(), false).await;
    state.search.refresh().await.unwrap();

    api.set_online(false);
    state.search.search("StandUp").await.unwrap();

    let messages = state.messages.list().await;
    assert_eq!(messages.len(), 3);
    assert!(messages.iter().all(|m| m.name.to_lowercase().contains("standup")));
}

#[tokio::test]
async fn test_failed_empty_search_restores_mirror() {
    let api = FakeApi::with_records(&["Team Sync", "Lunch", "Retro"]);
    let state = test_state(api.clone(), false).await;
    state.search.refresh().await.unwrap();

    // Narrow the in-memory set first so the restore has to come from the mirror.
    api.set_online(false);
    state.search.search("lunch").await.unwrap();
    assert_eq!(state.messages.list().await.len(), 1);

    let outcome = state.search.search("").await.unwrap();
    assert_eq!(outcome.source, SearchSource::Mirror);

    let restored = state.messages.list().await;
    assert_eq!(
        names(&restored),
        vec!["Lunch".to_string(), "Retro".to_string(), "Team Sync".to_string()]
    );

    let index = repository::fetch_index(&state.db).await.unwrap();
    assert_eq!(index.len(), restored.len());
    for message in &restored {
        assert!(index.contains(&message.unique_id));
    }
}

#[tokio::test]
async fn test_successive_searches_do_not_duplicate_index_entries() {
    let api = FakeApi::with_records(&["abc"]);
    let state = test_state(api.clone(), false).await;

    let first = state.search.search("a").await.unwrap();
    let second = state.search.search("ab").await.unwrap();
    assert_eq!(first.mirrored, 1);
    assert_eq!(second.mirrored, 0);

    let index = repository::fetch_index(&state.db).await.unwrap();
    assert_eq!(index.len(), 1);
}

#[tokio::test]
async fn test_offline_create_is_mirrored() {
    let api = FakeApi::new();
    let state = test_state(api.clone(), true).await;

    let outcome = state.messages.create(request("Written offline")).await.unwrap();
    let message = match outcome {
        CreateOutcome::StoredLocally(message) => message,
        other => panic!("expected local store, got {:?}", other),
    };
    assert!(message.id.is_none());

    assert!(state.collection.read().await.get(&message.key()).is_some());
    let stored = repository::find_entry(&state.db, &message.unique_id)
        .await
        .unwrap()
        .expect("not mirrored");
    assert_eq!(stored, message);
    let index = repository::fetch_index(&state.db).await.unwrap();
    assert!(index.contains(&message.unique_id));

    // Nothing reached the server.
    assert!(api.records().is_empty());
}

#[tokio::test]
async fn test_online_create_waits_for_acknowledgment() {
    let api = FakeApi::new();
    let state = test_state(api.clone(), false).await;

    let outcome = state.messages.create(request("Team Sync")).await.unwrap();
    let message = match outcome {
        CreateOutcome::Acknowledged(message) => message,
        other => panic!("expected acknowledgment, got {:?}", other),
    };
    assert_eq!(message.id, Some(1));
    assert_eq!(state.messages.get(&MessageKey::Server(1)).await.unwrap(), message);
    assert!(repository::fetch_index(&state.db).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_create_falls_back_to_local() {
    let api = FakeApi::new();
    api.set_online(false);
    let state = test_state(api.clone(), false).await;
    assert!(state.connectivity.is_online());

    let outcome = state.messages.create(request("Team Sync")).await.unwrap();
    assert!(matches!(outcome, CreateOutcome::StoredLocally(_)));
    assert!(!state.connectivity.is_online());
}

#[tokio::test]
async fn test_delete_removes_record_even_when_server_is_unreachable() {
    let api = FakeApi::with_records(&["Team Sync", "Lunch"]);
    let state = test_state(api.clone(), false).await;
    state.search.refresh().await.unwrap();

    api.set_online(false);
    let outcome = state.messages.delete(&MessageKey::Server(1)).await.unwrap();
    assert!(!outcome.remote_acknowledged);
    assert_eq!(outcome.message.name, "Team Sync");
    assert_eq!(*api.deletes.lock().unwrap(), vec![1]);

    assert!(state.collection.read().await.get(&MessageKey::Server(1)).is_none());
    assert!(
        repository::find_entry(&state.db, &outcome.message.unique_id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_delete_of_unknown_record_is_not_found() {
    let state = test_state(FakeApi::new(), false).await;
    let err = state.messages.delete(&MessageKey::Server(99)).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound));
}

#[tokio::test]
async fn test_failed_update_leaves_collection_untouched() {
    let api = FakeApi::with_records(&["Team Sync"]);
    let state = test_state(api.clone(), false).await;
    state.search.refresh().await.unwrap();

    api.set_online(false);
    let req = UpdateMessageRequest {
        name: Some("Team Sync 3pm".to_string()),
        ..Default::default()
    };
    let err = state.messages.update(&MessageKey::Server(1), req).await.unwrap_err();
    assert!(err.is_network());
    assert_eq!(state.messages.get(&MessageKey::Server(1)).await.unwrap().name, "Team Sync");
}

#[tokio::test]
async fn test_update_reaches_server() {
    let api = FakeApi::with_records(&["Team Sync"]);
    let state = test_state(api.clone(), false).await;
    state.search.refresh().await.unwrap();

    let req = UpdateMessageRequest {
        description: Some("moved".to_string()),
        ..Default::default()
    };
    let updated = state.messages.update(&MessageKey::Server(1), req).await.unwrap();
    assert_eq!(updated.description, "moved");
    assert_eq!(api.records()[0].description, "moved");
}

#[tokio::test]
async fn test_reconcile_pushes_offline_records() {
    let api = FakeApi::new();
    let state = test_state(api.clone(), true).await;

    let first = state.messages.create(request("one")).await.unwrap().message().clone();
    let second = state.messages.create(request("two")).await.unwrap().message().clone();

    let stats = state.reconcile.push_pending().await.unwrap();
    assert_eq!(stats.pushed, 2);
    assert_eq!(stats.remaining, 0);
    assert!(state.connectivity.is_online());

    for local in [&first, &second] {
        let reconciled = state
            .messages
            .get(&MessageKey::Local(local.unique_id.clone()))
            .await
            .unwrap();
        assert!(reconciled.id.is_some());
        assert_eq!(reconciled.unique_id, local.unique_id);

        let stored = repository::find_entry(&state.db, &local.unique_id).await.unwrap().unwrap();
        assert_eq!(stored.id, reconciled.id);
    }
    assert_eq!(state.messages.list().await.len(), 2);

    // A second pass has nothing left to do.
    let stats = state.reconcile.push_pending().await.unwrap();
    assert_eq!(stats.pushed, 0);
}

#[tokio::test]
async fn test_reconcile_stops_when_server_unreachable() {
    let api = FakeApi::new();
    api.set_online(false);
    let state = test_state(api.clone(), true).await;
    state.messages.create(request("one")).await.unwrap();
    state.messages.create(request("two")).await.unwrap();

    let stats = state.reconcile.push_pending().await.unwrap();
    assert_eq!(stats.pushed, 0);
    assert_eq!(stats.remaining, 2);
}

#[tokio::test]
async fn test_online_update_refreshes_mirror_snapshot() {
    let api = FakeApi::with_records(&["Team Sync"]);
    let state = test_state(api.clone(), false).await;
    state.search.refresh().await.unwrap();

    let req = UpdateMessageRequest {
        description: Some("moved to 3pm".to_string()),
        ..Default::default()
    };
    state.messages.update(&MessageKey::Server(1), req).await.unwrap();

    api.set_online(false);
    let outcome = state.search.search("").await.unwrap();
    assert_eq!(outcome.source, SearchSource::Mirror);
    let restored = state.messages.get(&MessageKey::Server(1)).await.unwrap();
    assert_eq!(restored.description, "moved to 3pm");
}

#[tokio::test]
async fn test_concurrent_reconcile_passes_push_once() {
    let api = FakeApi::new();
    let state = test_state(api.clone(), true).await;
    state.messages.create(request("queued")).await.unwrap();

    let (first, second) = tokio::join!(state.reconcile.push_pending(), state.reconcile.push_pending());
    assert_eq!(first.unwrap().pushed + second.unwrap().pushed, 1);

    assert_eq!(api.records().len(), 1);
    assert_eq!(state.messages.list().await.len(), 1);
}

/// Acknowledges creates with id 41, but only once released.
struct GatedCreateApi {
    started: Notify,
    release: Notify,
    deletes: Mutex<Vec<i64>>,
}

#[async_trait]
impl MessageApi for GatedCreateApi {
    async fn fetch_messages(&self, _name_filter: Option<&str>) -> Result<Vec<Message>, AppError> {
        Ok(Vec::new())
    }

    async fn create_message(&self, message: &Message) -> Result<Message, AppError> {
        self.started.notify_one();
        self.release.notified().await;
        let mut acknowledged = message.clone();
        acknowledged.assign_server_id(41)?;
        Ok(acknowledged)
    }

    async fn update_message(&self, message: &Message) -> Result<Message, AppError> {
        Ok(message.clone())
    }

    async fn delete_message(&self, id: i64) -> Result<(), AppError> {
        self.deletes.lock().unwrap().push(id);
        Ok(())
    }
}

#[tokio::test]
async fn test_delete_during_reconcile_stays_deleted() {
    let api = Arc::new(GatedCreateApi {
        started: Notify::new(),
        release: Notify::new(),
        deletes: Mutex::new(Vec::new()),
    });
    let state = test_state(api.clone(), true).await;
    let local = state.messages.create(request("short lived")).await.unwrap().message().clone();

    let pass = {
        let reconcile = state.reconcile.clone();
        tokio::spawn(async move { reconcile.push_pending().await })
    };
    api.started.notified().await;

    let outcome = state
        .messages
        .delete(&MessageKey::Local(local.unique_id.clone()))
        .await
        .unwrap();
    assert!(!outcome.remote_acknowledged);

    api.release.notify_one();
    let stats = pass.await.unwrap().unwrap();
    assert_eq!(stats.pushed, 0);
    assert_eq!(stats.withdrawn, 1);

    assert!(state.messages.list().await.is_empty());
    assert!(repository::find_entry(&state.db, &local.unique_id).await.unwrap().is_none());
    assert!(repository::fetch_index(&state.db).await.unwrap().is_empty());
    // The server copy created by the pass was removed again.
    assert_eq!(*api.deletes.lock().unwrap(), vec![41]);
}

/// Holds the "old" query until released so a newer search can overtake it.
struct GatedApi {
    started: Notify,
    release: Notify,
}

#[async_trait]
impl MessageApi for GatedApi {
    async fn fetch_messages(&self, name_filter: Option<&str>) -> Result<Vec<Message>, AppError> {
        let name = name_filter.unwrap_or_default().to_string();
        if name == "old" {
            self.started.notify_one();
            self.release.notified().await;
        }
        let mut message = Message::new(request(&name));
        message.id = Some(if name == "old" { 1 } else { 2 });
        Ok(vec![message])
    }

    async fn create_message(&self, _message: &Message) -> Result<Message, AppError> {
        Err(AppError::InternalServerError)
    }

    async fn update_message(&self, _message: &Message) -> Result<Message, AppError> {
        Err(AppError::InternalServerError)
    }

    async fn delete_message(&self, _id: i64) -> Result<(), AppError> {
        Err(AppError::InternalServerError)
    }
}

#[tokio::test]
async fn test_newer_search_supersedes_in_flight_one() {
    let api = Arc::new(GatedApi {
        started: Notify::new(),
        release: Notify::new(),
    });
    let pool = db::connect_in_memory().await.unwrap();
    let collection = MessageCollection::shared();
    let coordinator = Arc::new(SearchCoordinator::new(
        pool,
        api.clone(),
        collection.clone(),
        Arc::new(Connectivity::new(true)),
    ));

    let old_search = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.search("old").await })
    };
    api.started.notified().await;

    let newer = coordinator.search("new").await.unwrap();
    assert_eq!(newer.source, SearchSource::Remote);

    api.release.notify_one();
    let stale = old_search.await.unwrap().unwrap();
    assert_eq!(stale.source, SearchSource::Superseded);

    let messages = collection.read().await.to_vec();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].name, "new");
}
