//! Page lifecycle and slide transitions.
//!
//! Exactly one page is current. Replacing it disposes the outgoing page's
//! bindings before the incoming page takes its place, and a transition that
//! is still running delays the next one instead of being cut short.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use crate::collection::CollectionChange;
use crate::error::AppError;
use crate::models::MessageKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "page", content = "key", rename_all = "snake_case")]
pub enum Route {
    List,
    Add,
    Detail(MessageKey),
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::List => write!(f, "#"),
            Route::Add => write!(f, "#add/"),
            Route::Detail(key) => write!(f, "#{}/", key),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Left,
    Center,
    Right,
}

impl Stage {
    pub fn class(self) -> &'static str {
        match self {
            Stage::Left => "page stage-left",
            Stage::Center => "page stage-center",
            Stage::Right => "page stage-right",
        }
    }

    fn opposite(self) -> Stage {
        match self {
            Stage::Left => Stage::Right,
            Stage::Center => Stage::Center,
            Stage::Right => Stage::Left,
        }
    }
}

/// Collection subscriptions held by a page. Dropping them on dispose is what
/// keeps a removed page from being kept alive by the collection.
#[derive(Debug, Default)]
pub struct Bindings {
    subscriptions: Vec<broadcast::Receiver<CollectionChange>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, subscription: broadcast::Receiver<CollectionChange>) {
        self.subscriptions.push(subscription);
    }

    fn release(&mut self) {
        self.subscriptions.clear();
    }
}

pub trait Page: Send {
    fn route(&self) -> Route;

    /// Side the next page slides in from when this page leaves.
    fn slide_from(&self) -> Stage;

    fn bindings_mut(&mut self) -> &mut Bindings;

    fn dispose(&mut self) {
        debug!("unbinding events for page {}", self.route());
        self.bindings_mut().release();
    }
}

/// Search page with the message list. Re-renders on every collection change.
pub struct ListPage {
    bindings: Bindings,
}

impl ListPage {
    pub fn new(changes: broadcast::Receiver<CollectionChange>) -> Self {
        let mut bindings = Bindings::new();
        bindings.bind(changes);
        Self { bindings }
    }
}

impl Page for ListPage {
    fn route(&self) -> Route {
        Route::List
    }

    fn slide_from(&self) -> Stage {
        Stage::Right
    }

    fn bindings_mut(&mut self) -> &mut Bindings {
        &mut self.bindings
    }
}

pub struct CreatePage {
    bindings: Bindings,
}

impl CreatePage {
    pub fn new() -> Self {
        Self { bindings: Bindings::new() }
    }
}

impl Default for CreatePage {
    fn default() -> Self {
        Self::new()
    }
}

impl Page for CreatePage {
    fn route(&self) -> Route {
        Route::Add
    }

    fn slide_from(&self) -> Stage {
        Stage::Left
    }

    fn bindings_mut(&mut self) -> &mut Bindings {
        &mut self.bindings
    }
}

/// Detail page; watches the collection so it can close when its record goes away.
pub struct DetailPage {
    key: MessageKey,
    bindings: Bindings,
}

impl DetailPage {
    pub fn new(key: MessageKey, changes: broadcast::Receiver<CollectionChange>) -> Self {
        let mut bindings = Bindings::new();
        bindings.bind(changes);
        Self { key, bindings }
    }
}

impl Page for DetailPage {
    fn route(&self) -> Route {
        Route::Detail(self.key.clone())
    }

    fn slide_from(&self) -> Stage {
        Stage::Left
    }

    fn bindings_mut(&mut self) -> &mut Bindings {
        &mut self.bindings
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub from: Option<Route>,
    pub to: Route,
    /// Where the incoming page starts; it always ends at center stage.
    pub incoming_from: Stage,
    /// Where the outgoing page ends up, if there was one.
    pub outgoing_to: Option<Stage>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl Transition {
    pub fn is_center_stage(&self) -> bool {
        self.from.is_none()
    }

    /// Class pair applied while the transition runs: (incoming, outgoing).
    pub fn classes(&self) -> (String, Option<String>) {
        if self.is_center_stage() {
            return (Stage::Center.class().to_string(), None);
        }
        let incoming = format!("{} transition", Stage::Center.class());
        let outgoing = self.outgoing_to.map(|stage| format!("{} transition", stage.class()));
        (incoming, outgoing)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NavigationState {
    pub current: Option<Route>,
    pub history: Vec<Route>,
    pub transitions: u64,
}

pub struct Navigator {
    current: Option<Box<dyn Page>>,
    history: Vec<Route>,
    transition: Duration,
    busy_until: Option<Instant>,
    transitions: u64,
}

impl Navigator {
    pub fn new(transition: Duration) -> Self {
        Self {
            current: None,
            history: Vec::new(),
            transition,
            busy_until: None,
            transitions: 0,
        }
    }

    pub fn current_route(&self) -> Option<Route> {
        self.current.as_ref().map(|page| page.route())
    }

    pub fn history(&self) -> &[Route] {
        &self.history
    }

    /// The route a back navigation leads to.
    pub fn previous_route(&self) -> Option<&Route> {
        self.history.iter().rev().nth(1)
    }

    pub fn state(&self) -> NavigationState {
        NavigationState {
            current: self.current_route(),
            history: self.history.clone(),
            transitions: self.transitions,
        }
    }

    /// When the running transition finishes, if one is running at `now`.
    pub fn busy_until(&self, now: Instant) -> Option<Instant> {
        self.busy_until.filter(|until| *until > now)
    }

    pub fn change_page(&mut self, page: Box<dyn Page>, now: Instant) -> Result<Transition, AppError> {
        if let Some(until) = self.busy_until(now) {
            return Err(AppError::Conflict(format!(
                "page transition still running for {:?}",
                until - now
            )));
        }

        let to = page.route();
        let transition = match self.current.take() {
            None => Transition {
                from: None,
                to: to.clone(),
                incoming_from: Stage::Center,
                outgoing_to: None,
                duration: Duration::ZERO,
            },
            Some(mut outgoing) => {
                outgoing.dispose();
                let direction = outgoing.slide_from();
                Transition {
                    from: Some(outgoing.route()),
                    to: to.clone(),
                    incoming_from: direction,
                    outgoing_to: Some(direction.opposite()),
                    duration: self.transition,
                }
            }
        };

        if transition.duration > Duration::ZERO {
            self.busy_until = Some(now + transition.duration);
        }
        // Revisiting a route drops everything after its earlier entry.
        match self.history.iter().position(|route| *route == to) {
            Some(position) => self.history.truncate(position + 1),
            None => self.history.push(to),
        }
        self.transitions += 1;
        self.current = Some(page);

        debug!("changed page {:?} -> {}", transition.from, transition.to);
        Ok(transition)
    }

    /// Pops the current route off the history for a back navigation.
    pub fn take_back_route(&mut self) -> Option<Route> {
        if self.history.len() < 2 {
            return None;
        }
        self.history.pop();
        self.history.pop()
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::MessageCollection;

    #[tokio::test]
    async fn test_first_page_is_center_stage() {
        let collection = MessageCollection::new();
        let mut navigator = Navigator::new(Duration::from_millis(300));

        let transition = navigator
            .change_page(Box::new(ListPage::new(collection.subscribe())), Instant::now())
            .unwrap();

        assert!(transition.is_center_stage());
        assert_eq!(transition.duration, Duration::ZERO);
        assert_eq!(transition.classes(), ("page stage-center".to_string(), None));
        assert_eq!(navigator.current_route(), Some(Route::List));
        assert!(navigator.busy_until(Instant::now()).is_none());
    }

    #[tokio::test]
    async fn test_slide_uses_outgoing_preference_and_disposes() {
        let collection = MessageCollection::new();
        let mut navigator = Navigator::new(Duration::from_millis(300));
        let start = Instant::now();

        navigator
            .change_page(Box::new(ListPage::new(collection.subscribe())), start)
            .unwrap();
        assert_eq!(collection.subscriber_count(), 1);

        let transition = navigator.change_page(Box::new(CreatePage::new()), start).unwrap();
        assert_eq!(transition.from, Some(Route::List));
        assert_eq!(transition.incoming_from, Stage::Right);
        assert_eq!(transition.outgoing_to, Some(Stage::Left));
        assert_eq!(
            transition.classes(),
            (
                "page stage-center transition".to_string(),
                Some("page stage-left transition".to_string())
            )
        );
        // The list page's subscription went away with it.
        assert_eq!(collection.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_running_transition_is_not_interrupted() {
        let collection = MessageCollection::new();
        let mut navigator = Navigator::new(Duration::from_millis(300));
        let start = Instant::now();

        navigator.change_page(Box::new(CreatePage::new()), start).unwrap();
        navigator
            .change_page(Box::new(ListPage::new(collection.subscribe())), start)
            .unwrap();

        let err = navigator
            .change_page(Box::new(CreatePage::new()), start + Duration::from_millis(100))
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(navigator.current_route(), Some(Route::List));

        let later = start + Duration::from_millis(300);
        assert!(navigator.busy_until(later).is_none());
        navigator.change_page(Box::new(CreatePage::new()), later).unwrap();
        assert_eq!(navigator.current_route(), Some(Route::Add));
    }

    #[tokio::test]
    async fn test_history_does_not_grow_when_alternating() {
        let collection = MessageCollection::new();
        let mut navigator = Navigator::new(Duration::ZERO);
        let now = Instant::now();

        for _ in 0..10 {
            navigator
                .change_page(Box::new(ListPage::new(collection.subscribe())), now)
                .unwrap();
            navigator.change_page(Box::new(CreatePage::new()), now).unwrap();
        }
        assert_eq!(navigator.history(), &[Route::List, Route::Add]);

        navigator
            .change_page(
                Box::new(DetailPage::new(MessageKey::Server(3), collection.subscribe())),
                now,
            )
            .unwrap();
        navigator
            .change_page(Box::new(ListPage::new(collection.subscribe())), now)
            .unwrap();
        assert_eq!(navigator.history(), &[Route::List]);
        assert_eq!(navigator.state().transitions, 22);
    }

    #[tokio::test]
    async fn test_back_route() {
        let collection = MessageCollection::new();
        let mut navigator = Navigator::new(Duration::ZERO);
        let now = Instant::now();

        navigator
            .change_page(Box::new(ListPage::new(collection.subscribe())), now)
            .unwrap();
        navigator
            .change_page(
                Box::new(DetailPage::new(MessageKey::Server(3), collection.subscribe())),
                now,
            )
            .unwrap();

        assert_eq!(navigator.previous_route(), Some(&Route::List));
        assert_eq!(navigator.take_back_route(), Some(Route::List));
        assert!(navigator.history().is_empty());
        assert_eq!(navigator.take_back_route(), None);
    }
}
