use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::info;

use crate::collection::{MessageCollection, SharedCollection};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::navigation::{CreatePage, DetailPage, ListPage, Navigator, Page, Route, Transition};
use crate::push::{PushListener, PushSender};
use crate::remote::MessageApi;
use crate::services::{MessageService, ReconcileService, SearchCoordinator};

/// The client's belief about whether the remote is reachable.
#[derive(Debug)]
pub struct Connectivity {
    online: AtomicBool,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        Self { online: AtomicBool::new(online) }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn mark_online(&self) {
        if !self.online.swap(true, Ordering::SeqCst) {
            info!("remote reachable again, switching to online mode");
        }
    }

    pub fn mark_offline(&self) {
        if self.online.swap(false, Ordering::SeqCst) {
            info!("remote unreachable, switching to offline mode");
        }
    }
}

/// Everything the client shares, built once and handed to each component.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: SqlitePool,
    pub api: Arc<dyn MessageApi>,
    pub collection: SharedCollection,
    pub connectivity: Arc<Connectivity>,
    pub search: Arc<SearchCoordinator>,
    pub messages: Arc<MessageService>,
    pub reconcile: Arc<ReconcileService>,
    pub navigator: Arc<Mutex<Navigator>>,
    pub push: PushSender,
    first_list_view: Arc<AtomicBool>,
}

impl AppState {
    /// The returned listener must be spawned for push events to take effect.
    pub fn new(config: AppConfig, db: SqlitePool, api: Arc<dyn MessageApi>) -> (Self, PushListener) {
        let collection = MessageCollection::shared();
        let connectivity = Arc::new(Connectivity::new(!config.start_offline));

        let search = Arc::new(SearchCoordinator::new(
            db.clone(),
            api.clone(),
            collection.clone(),
            connectivity.clone(),
        ));
        let messages = Arc::new(MessageService::new(
            db.clone(),
            api.clone(),
            collection.clone(),
            connectivity.clone(),
        ));
        let reconcile = Arc::new(ReconcileService::new(
            db.clone(),
            api.clone(),
            collection.clone(),
            connectivity.clone(),
        ));
        let navigator = Arc::new(Mutex::new(Navigator::new(config.transition)));
        let (push, listener) = PushListener::channel(collection.clone(), config.push_buffer);

        let state = Self {
            config: Arc::new(config),
            db,
            api,
            collection,
            connectivity,
            search,
            messages,
            reconcile,
            navigator,
            push,
            first_list_view: Arc::new(AtomicBool::new(true)),
        };
        (state, listener)
    }

    /// True exactly once: for the first list view, which loads the whole collection.
    pub fn take_first_list_view(&self) -> bool {
        self.first_list_view.swap(false, Ordering::SeqCst)
    }

    async fn open_page(&self, route: &Route) -> Box<dyn Page> {
        match route {
            Route::List => Box::new(ListPage::new(self.collection.read().await.subscribe())),
            Route::Add => Box::new(CreatePage::new()),
            Route::Detail(key) => Box::new(DetailPage::new(
                key.clone(),
                self.collection.read().await.subscribe(),
            )),
        }
    }

    /// Shows `route`, waiting for a running transition to finish first.
    pub async fn navigate(&self, route: Route) -> Result<Transition, AppError> {
        let page = self.open_page(&route).await;
        let mut navigator = self.navigator.lock().await;
        if let Some(until) = navigator.busy_until(tokio::time::Instant::now()) {
            tokio::time::sleep_until(until).await;
        }
        navigator.change_page(page, tokio::time::Instant::now())
    }

    /// Header back button. Falls back to the list when there is no history.
    pub async fn navigate_back(&self) -> Result<Transition, AppError> {
        let route = self
            .navigator
            .lock()
            .await
            .take_back_route()
            .unwrap_or(Route::List);
        self.navigate(route).await
    }
}
