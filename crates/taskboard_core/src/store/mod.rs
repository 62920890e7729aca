//! Remote document store contract.
//!
//! # Responsibility
//! - Define the create/update/delete/batch/query/subscribe surface the sync
//!   core talks to.
//! - Model live subscriptions as per-subscription channels of full snapshots.
//!
//! # Invariants
//! - Document ids are assigned by the store and never reused.
//! - Every `SnapshotEvent::Snapshot` carries the complete filtered result set,
//!   never a diff.
//! - `batch_delete` is all-or-nothing.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::{Receiver, TryRecvError};
use uuid::Uuid;

pub mod sqlite;

pub use sqlite::SqliteDocumentStore;

static FIELD_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]{0,63}$").expect("valid field name regex"));

/// Store-assigned document identifier.
pub type DocumentId = Uuid;

/// JSON object payload of one document.
pub type Fields = serde_json::Map<String, Value>;

/// Handle id returned by `RemoteStore::subscribe`.
pub type SubscriptionId = u64;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a remote store.
#[derive(Debug)]
pub enum StoreError {
    /// Backing database failure.
    Sqlite(rusqlite::Error),
    /// Database was written by a newer schema than this binary supports.
    SchemaTooNew { found: u32, supported: u32 },
    /// Target document does not exist.
    NotFound {
        collection: Collection,
        id: DocumentId,
    },
    /// Filter field name is not a plain top-level field.
    InvalidFilter(String),
    /// Persisted document cannot be read back.
    InvalidDocument(String),
    /// Store is unreachable; safe to retry.
    Unavailable(String),
    /// Store refused the write; retrying will not help.
    Rejected(String),
}

impl StoreError {
    /// Whether a bounded retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "document store schema version {found} is newer than supported {supported}"
            ),
            Self::NotFound { collection, id } => {
                write!(f, "document not found: {collection}/{id}")
            }
            Self::InvalidFilter(field) => write!(f, "invalid filter field `{field}`"),
            Self::InvalidDocument(message) => write!(f, "invalid stored document: {message}"),
            Self::Unavailable(reason) => write!(f, "store unavailable: {reason}"),
            Self::Rejected(reason) => write!(f, "store rejected write: {reason}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Document collections used by the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    Lists,
    Tasks,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lists => "lists",
            Self::Tasks => "tasks",
        }
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub fields: Fields,
}

/// Address of one document, used by batch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentRef {
    pub collection: Collection,
    pub id: DocumentId,
}

impl DocumentRef {
    pub fn new(collection: Collection, id: DocumentId) -> Self {
        Self { collection, id }
    }
}

/// Equality filter on one top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    field: String,
    value: Value,
}

impl FieldFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Rejects field names that are not plain snake_case identifiers.
    pub fn validate(&self) -> StoreResult<()> {
        if FIELD_NAME_RE.is_match(&self.field) {
            Ok(())
        } else {
            Err(StoreError::InvalidFilter(self.field.clone()))
        }
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        fields.get(&self.field) == Some(&self.value)
    }
}

/// Event delivered on a live subscription.
#[derive(Debug)]
pub enum SnapshotEvent {
    /// Complete, ordered result set after a change.
    Snapshot(Vec<Document>),
    /// Subscription terminated by the store. No further events follow.
    Failed(StoreError),
}

/// Receiving side of one live subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    collection: Collection,
    events: Receiver<SnapshotEvent>,
}

impl Subscription {
    pub fn new(id: SubscriptionId, collection: Collection, events: Receiver<SnapshotEvent>) -> Self {
        Self {
            id,
            collection,
            events,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Returns the next queued event without blocking.
    ///
    /// `Err(TryRecvError::Disconnected)` means the store dropped the sender
    /// without a `Failed` event.
    pub fn try_next(&self) -> Result<SnapshotEvent, TryRecvError> {
        self.events.try_recv()
    }
}

/// Multi-collection document store with filtered live subscriptions.
///
/// Writes follow last-write-wins semantics; no merge beyond field-level
/// replacement is attempted.
pub trait RemoteStore {
    /// Creates a document and returns its store-assigned id.
    fn create(&self, collection: Collection, fields: Fields) -> StoreResult<DocumentId>;
    /// Merges `fields` into an existing document.
    fn update(&self, collection: Collection, id: DocumentId, fields: Fields) -> StoreResult<()>;
    /// Deletes one document. Deleting a missing document succeeds.
    fn delete(&self, collection: Collection, id: DocumentId) -> StoreResult<()>;
    /// Deletes every target or none of them.
    fn batch_delete(&self, targets: &[DocumentRef]) -> StoreResult<()>;
    /// One-shot read of the filtered result set.
    fn query(&self, collection: Collection, filter: &FieldFilter) -> StoreResult<Vec<Document>>;
    /// Opens a live subscription. The current result set is queued immediately.
    fn subscribe(&self, collection: Collection, filter: FieldFilter) -> StoreResult<Subscription>;
    /// Cancels a live subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}
