use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::post;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::*;
use crate::navigation::{NavigationState, Route, Transition};
use crate::push::PushEvent;
use crate::services::{CreateOutcome, DeleteOutcome, ReconcileStats, SearchOutcome};
use crate::state::AppState;

#[derive(Deserialize)]
struct ListQueryParams {
    #[serde(default)]
    q: Option<String>,
}

#[derive(Serialize)]
struct ListResponse {
    search: Option<SearchOutcome>,
    online: bool,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct DetailResponse {
    transition: Transition,
    message: Message,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/messages", get(list_messages).post(create_message))
        .route("/messages/add", get(add_page))
        .route(
            "/messages/{key}",
            get(message_detail).put(update_message).delete(delete_message),
        )
        .route("/push", post(receive_push))
        .route("/navigation", get(navigation_state))
        .route("/navigation/back", post(navigate_back))
        .route("/reconcile", post(reconcile_now))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn list_messages(
    State(state): State<AppState>,
    Query(params): Query<ListQueryParams>,
) -> Result<Json<ListResponse>, AppError> {
    state.navigate(Route::List).await?;

    // The first list view loads everything; later ones only run explicit searches.
    let first = state.take_first_list_view();
    let search = match params.q {
        Some(q) => Some(state.search.search(&q).await?),
        None if first => Some(state.search.refresh().await?),
        None => None,
    };

    Ok(Json(ListResponse {
        search,
        online: state.connectivity.is_online(),
        messages: state.messages.list().await,
    }))
}

async fn add_page(State(state): State<AppState>) -> Result<Json<Transition>, AppError> {
    let transition = state.navigate(Route::Add).await?;
    Ok(Json(transition))
}

async fn create_message(
    State(state): State<AppState>,
    Json(req): Json<NewMessageRequest>,
) -> Result<(StatusCode, Json<CreateOutcome>), AppError> {
    let outcome = state.messages.create(req).await?;
    state.navigate(Route::List).await?;

    let status = match outcome {
        CreateOutcome::Acknowledged(_) => StatusCode::CREATED,
        CreateOutcome::StoredLocally(_) => StatusCode::ACCEPTED,
    };
    Ok((status, Json(outcome)))
}

async fn message_detail(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DetailResponse>, AppError> {
    let key = MessageKey::parse(&key);
    let message = state.messages.get(&key).await?;
    let transition = state.navigate(Route::Detail(key)).await?;
    Ok(Json(DetailResponse { transition, message }))
}

async fn update_message(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<UpdateMessageRequest>,
) -> Result<Json<Message>, AppError> {
    let message = state.messages.update(&MessageKey::parse(&key), req).await?;
    Ok(Json(message))
}

async fn delete_message(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteOutcome>, AppError> {
    let outcome = state.messages.delete(&MessageKey::parse(&key)).await?;
    state.navigate(Route::List).await?;
    Ok(Json(outcome))
}

async fn receive_push(
    State(state): State<AppState>,
    Json(event): Json<PushEvent>,
) -> Result<StatusCode, AppError> {
    state
        .push
        .send(event)
        .await
        .map_err(|_| AppError::InternalServerError)?;
    Ok(StatusCode::ACCEPTED)
}

async fn navigation_state(State(state): State<AppState>) -> Json<NavigationState> {
    Json(state.navigator.lock().await.state())
}

async fn navigate_back(State(state): State<AppState>) -> Result<Json<Transition>, AppError> {
    let transition = state.navigate_back().await?;
    Ok(Json(transition))
}

async fn reconcile_now(State(state): State<AppState>) -> Result<Json<ReconcileStats>, AppError> {
    let stats = state.reconcile.push_pending().await?;
    Ok(Json(stats))
}
