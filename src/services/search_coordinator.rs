use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::collection::SharedCollection;
use crate::db::repository;
use crate::error::AppError;
use crate::models::Message;
use crate::remote::MessageApi;
use crate::state::Connectivity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    /// Server results, now mirrored locally.
    Remote,
    /// Remote failed on an empty query; rebuilt from the local mirror.
    Mirror,
    /// Remote failed on a non-empty query; filtered what was in memory.
    MemoryFilter,
    /// A newer search started before this one finished; nothing was applied.
    Superseded,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub query: String,
    pub source: SearchSource,
    pub count: usize,
    pub mirrored: usize,
}

pub struct SearchCoordinator {
    db: SqlitePool,
    api: Arc<dyn MessageApi>,
    collection: SharedCollection,
    connectivity: Arc<Connectivity>,
    generation: AtomicU64,
}

impl SearchCoordinator {
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
            generation: AtomicU64::new(0),
        }
    }

    /// Filtered fetch on `name__contains=query`, degrading to local data on failure.
    pub async fn search(&self, query: &str) -> Result<SearchOutcome, AppError> {
        info!("search: {:?}", query);
        self.run(query, Some(query)).await
    }

    /// Unfiltered fetch of the whole collection, as done for the first list view.
    pub async fn refresh(&self) -> Result<SearchOutcome, AppError> {
        info!("fetching entire collection");
        self.run("", None).await
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket
    }

    async fn run(&self, query: &str, name_filter: Option<&str>) -> Result<SearchOutcome, AppError> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let fetched = self.api.fetch_messages(name_filter).await;

        if !self.is_current(ticket) {
            debug!("discarding superseded search {:?} (ticket {})", query, ticket);
            return Ok(self.outcome(query, SearchSource::Superseded, 0, 0));
        }

        match fetched {
            Ok(messages) => self.apply_remote(query, ticket, messages).await,
            Err(e) => {
                warn!("Error on fetch attempt, falling back to local data: {}", e);
                if e.is_network() {
                    self.connectivity.mark_offline();
                }
                self.apply_fallback(query, ticket).await
            }
        }
    }

    async fn apply_remote(
        &self,
        query: &str,
        ticket: u64,
        messages: Vec<Message>,
    ) -> Result<SearchOutcome, AppError> {
        self.connectivity.mark_online();

        let mirrored = repository::mirror_all(&self.db, &messages).await?;

        let mut collection = self.collection.write().await;
        if !self.is_current(ticket) {
            return Ok(self.outcome(query, SearchSource::Superseded, 0, mirrored));
        }
        collection.reset(messages);
        let count = collection.len();
        info!("search {:?} fetched {} messages ({} new to mirror)", query, count, mirrored);

        Ok(self.outcome(query, SearchSource::Remote, count, mirrored))
    }

    async fn apply_fallback(&self, query: &str, ticket: u64) -> Result<SearchOutcome, AppError> {
        if query.is_empty() {
            let snapshot = repository::load_indexed(&self.db).await?;
            let skipped = snapshot.missing.len() + snapshot.corrupt.len();
            if skipped > 0 {
                warn!("{} mirror entries could not be read", skipped);
            }

            let mut collection = self.collection.write().await;
            if !self.is_current(ticket) {
                return Ok(self.outcome(query, SearchSource::Superseded, 0, 0));
            }
            collection.reset(snapshot.messages);
            let count = collection.len();
            info!("restored {} messages from local mirror", count);
            return Ok(self.outcome(query, SearchSource::Mirror, count, 0));
        }

        let mut collection = self.collection.write().await;
        if !self.is_current(ticket) {
            return Ok(self.outcome(query, SearchSource::Superseded, 0, 0));
        }
        let matches = collection.filter_by_name(query);
        collection.reset(matches);
        let count = collection.len();
        info!("filtered in-memory messages on {:?}: {} left", query, count);

        Ok(self.outcome(query, SearchSource::MemoryFilter, count, 0))
    }

    fn outcome(&self, query: &str, source: SearchSource, count: usize, mirrored: usize) -> SearchOutcome {
        SearchOutcome {
            query: query.to_string(),
            source,
            count,
            mirrored,
        }
    }
}
