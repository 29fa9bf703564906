pub mod message_service;
pub mod reconcile;
pub mod scheduler;
pub mod search_coordinator;

pub use message_service::{CreateOutcome, DeleteOutcome, MessageService};
pub use reconcile::{ReconcileService, ReconcileStats};
pub use scheduler::ReconcileScheduler;
pub use search_coordinator::{SearchCoordinator, SearchOutcome, SearchSource};
