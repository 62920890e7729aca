//! Sync core for a multi-list task board.
//! This crate owns the owner-scoped cache, write dispatch, drag reassignment
//! and board projection; rendering and sign-in UI live elsewhere.

pub mod board;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod drag;
pub mod identity;
pub mod logging;
pub mod model;
pub mod projection;
pub mod retry;
pub mod store;
pub mod sync;

pub use board::TaskBoard;
pub use config::{ConfigError, LoggingConfig, RetryPolicy, SyncConfig};
pub use dispatch::{MutationDispatcher, MutationError};
pub use drag::{DragController, DragError, DragState, DropOutcome};
pub use identity::{IdentityError, IdentityProvider, LocalIdentity};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::board::{
    BucketKey, ListId, OwnerId, Priority, Task, TaskDraft, TaskId, TaskList, TaskPatch,
    ValidationError,
};
pub use projection::{orphaned_tasks, project_board, BoardView, ListColumn};
pub use store::{
    Collection, Document, DocumentId, DocumentRef, FieldFilter, Fields, RemoteStore,
    SnapshotEvent, SqliteDocumentStore, StoreError, StoreResult, Subscription, SubscriptionId,
};
pub use sync::cache::LocalCache;
pub use sync::engine::{PumpReport, SyncEngine, SyncError, SyncStatus};
pub use sync::pending::{MutationStatus, PendingMutation};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
