//! SQLite-backed reference implementation of `RemoteStore`.
//!
//! # Responsibility
//! - Persist list/task documents as JSON rows in one `documents` table.
//! - Push full filtered snapshots to live subscribers after each commit.
//!
//! # Invariants
//! - Subscribers are notified only after the write transaction committed, so
//!   no snapshot ever observes a partially applied batch.
//! - Snapshots are ordered by insertion sequence.
//! - While offline every call fails with `StoreError::Unavailable`.

use crate::db::{open_db, open_db_in_memory};
use crate::store::{
    Collection, Document, DocumentId, DocumentRef, FieldFilter, Fields, RemoteStore,
    SnapshotEvent, StoreError, StoreResult, Subscription, SubscriptionId,
};
use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::mpsc::{self, Sender};
use uuid::Uuid;

struct Subscriber {
    collection: Collection,
    filter: FieldFilter,
    sender: Sender<SnapshotEvent>,
}

/// Document store over one SQLite connection.
///
/// Single-threaded: the connection and subscriber registry are owned by the
/// event loop that drives the board.
pub struct SqliteDocumentStore {
    conn: Connection,
    subscribers: RefCell<BTreeMap<SubscriptionId, Subscriber>>,
    next_subscription_id: Cell<SubscriptionId>,
    online: Cell<bool>,
}

impl SqliteDocumentStore {
    /// Wraps a migrated connection (see `db::open_db`).
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            subscribers: RefCell::new(BTreeMap::new()),
            next_subscription_id: Cell::new(1),
            online: Cell::new(true),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Toggles reachability. Going offline terminates every live subscription.
    pub fn set_online(&self, online: bool) {
        let was_online = self.online.replace(online);
        if was_online && !online {
            self.interrupt_subscriptions("connection lost");
        }
        info!("event=store_connectivity module=store status=ok online={online}");
    }

    /// Terminates all live subscriptions with a `Failed(Unavailable)` event.
    ///
    /// Returns the number of subscriptions terminated.
    pub fn interrupt_subscriptions(&self, reason: &str) -> usize {
        let dropped = std::mem::take(&mut *self.subscribers.borrow_mut());
        for subscriber in dropped.values() {
            let _ = subscriber
                .sender
                .send(SnapshotEvent::Failed(StoreError::Unavailable(
                    reason.to_string(),
                )));
        }
        warn!(
            "event=subscriptions_interrupted module=store status=error count={}",
            dropped.len()
        );
        dropped.len()
    }

    fn ensure_online(&self) -> StoreResult<()> {
        if self.online.get() {
            Ok(())
        } else {
            Err(StoreError::Unavailable("store is offline".to_string()))
        }
    }

    fn load(&self, collection: Collection, filter: &FieldFilter) -> StoreResult<Vec<Document>> {
        filter.validate()?;
        let filter_value = serde_json::to_string(filter.value())
            .map_err(|err| StoreError::InvalidDocument(err.to_string()))?;

        let mut stmt = self.conn.prepare_cached(
            "SELECT doc_id, fields
             FROM documents
             WHERE collection = ?1
               AND json_extract(fields, ?2) = json_extract(?3, '$')
             ORDER BY seq ASC;",
        )?;
        let mut rows = stmt.query(params![
            collection.as_str(),
            format!("$.{}", filter.field()),
            filter_value,
        ])?;

        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get(0)?;
            let fields_text: String = row.get(1)?;
            documents.push(parse_document(&id_text, &fields_text)?);
        }
        Ok(documents)
    }

    fn load_fields(&self, collection: Collection, id: DocumentId) -> StoreResult<Option<Fields>> {
        let fields_text: Option<String> = self
            .conn
            .query_row(
                "SELECT fields FROM documents WHERE collection = ?1 AND doc_id = ?2;",
                params![collection.as_str(), id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match fields_text {
            Some(text) => Ok(Some(parse_fields(&id.to_string(), &text)?)),
            None => Ok(None),
        }
    }

    /// Pushes a fresh snapshot to every subscriber of `collection`.
    fn broadcast(&self, collection: Collection) {
        let mut subscribers = self.subscribers.borrow_mut();
        let mut closed = Vec::new();

        for (id, subscriber) in subscribers.iter() {
            if subscriber.collection != collection {
                continue;
            }
            let event = match self.load(collection, &subscriber.filter) {
                Ok(documents) => SnapshotEvent::Snapshot(documents),
                Err(err) => {
                    warn!(
                        "event=snapshot_push module=store status=error subscription={id} error={err}"
                    );
                    closed.push(*id);
                    SnapshotEvent::Failed(err)
                }
            };
            if subscriber.sender.send(event).is_err() {
                closed.push(*id);
            }
        }

        for id in closed {
            subscribers.remove(&id);
            debug!("event=subscription_pruned module=store status=ok subscription={id}");
        }
    }
}

impl RemoteStore for SqliteDocumentStore {
    fn create(&self, collection: Collection, fields: Fields) -> StoreResult<DocumentId> {
        self.ensure_online()?;
        let id = Uuid::new_v4();
        let fields_text = serde_json::to_string(&fields)
            .map_err(|err| StoreError::Rejected(err.to_string()))?;

        self.conn.execute(
            "INSERT INTO documents (collection, doc_id, fields) VALUES (?1, ?2, ?3);",
            params![collection.as_str(), id.to_string(), fields_text],
        )?;
        debug!("event=doc_create module=store status=ok collection={collection} doc_id={id}");

        self.broadcast(collection);
        Ok(id)
    }

    fn update(&self, collection: Collection, id: DocumentId, fields: Fields) -> StoreResult<()> {
        self.ensure_online()?;
        let tx = self.conn.unchecked_transaction()?;
        let mut merged = self
            .load_fields(collection, id)?
            .ok_or(StoreError::NotFound { collection, id })?;
        let changed_fields = fields.len();
        merged.extend(fields);
        let merged_text = serde_json::to_string(&merged)
            .map_err(|err| StoreError::Rejected(err.to_string()))?;

        tx.execute(
            "UPDATE documents
             SET
                fields = ?1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE collection = ?2 AND doc_id = ?3;",
            params![merged_text, collection.as_str(), id.to_string()],
        )?;
        tx.commit()?;
        debug!(
            "event=doc_update module=store status=ok collection={collection} doc_id={id} fields={changed_fields}"
        );

        self.broadcast(collection);
        Ok(())
    }

    fn delete(&self, collection: Collection, id: DocumentId) -> StoreResult<()> {
        self.ensure_online()?;
        let changed = self.conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND doc_id = ?2;",
            params![collection.as_str(), id.to_string()],
        )?;
        debug!(
            "event=doc_delete module=store status=ok collection={collection} doc_id={id} changed={changed}"
        );

        if changed > 0 {
            self.broadcast(collection);
        }
        Ok(())
    }

    fn batch_delete(&self, targets: &[DocumentRef]) -> StoreResult<()> {
        self.ensure_online()?;
        let tx = self.conn.unchecked_transaction()?;
        let mut touched = BTreeSet::new();
        for target in targets {
            let changed = tx.execute(
                "DELETE FROM documents WHERE collection = ?1 AND doc_id = ?2;",
                params![target.collection.as_str(), target.id.to_string()],
            )?;
            if changed > 0 {
                touched.insert(target.collection);
            }
        }
        tx.commit()?;
        debug!(
            "event=doc_batch_delete module=store status=ok targets={}",
            targets.len()
        );

        for collection in touched {
            self.broadcast(collection);
        }
        Ok(())
    }

    fn query(&self, collection: Collection, filter: &FieldFilter) -> StoreResult<Vec<Document>> {
        self.ensure_online()?;
        self.load(collection, filter)
    }

    fn subscribe(&self, collection: Collection, filter: FieldFilter) -> StoreResult<Subscription> {
        self.ensure_online()?;
        let initial = self.load(collection, &filter)?;

        let (sender, receiver) = mpsc::channel();
        let _ = sender.send(SnapshotEvent::Snapshot(initial));

        let id = self.next_subscription_id.get();
        self.next_subscription_id.set(id + 1);
        self.subscribers.borrow_mut().insert(
            id,
            Subscriber {
                collection,
                filter,
                sender,
            },
        );
        debug!("event=subscribe module=store status=ok collection={collection} subscription={id}");

        Ok(Subscription::new(id, collection, receiver))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if self.subscribers.borrow_mut().remove(&id).is_some() {
            debug!("event=unsubscribe module=store status=ok subscription={id}");
        }
    }
}

fn parse_document(id_text: &str, fields_text: &str) -> StoreResult<Document> {
    let id = Uuid::parse_str(id_text).map_err(|_| {
        StoreError::InvalidDocument(format!("invalid uuid value `{id_text}` in documents.doc_id"))
    })?;
    Ok(Document {
        id,
        fields: parse_fields(id_text, fields_text)?,
    })
}

fn parse_fields(id_text: &str, fields_text: &str) -> StoreResult<Fields> {
    serde_json::from_str(fields_text).map_err(|err| {
        StoreError::InvalidDocument(format!("document `{id_text}` has invalid fields: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::SqliteDocumentStore;
    use crate::store::{
        Collection, DocumentRef, FieldFilter, Fields, RemoteStore, SnapshotEvent, StoreError,
    };
    use serde_json::json;
    use uuid::Uuid;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn next_snapshot(subscription: &crate::store::Subscription) -> Vec<crate::store::Document> {
        match subscription.try_next().unwrap() {
            SnapshotEvent::Snapshot(documents) => documents,
            SnapshotEvent::Failed(err) => panic!("unexpected failure: {err}"),
        }
    }

    #[test]
    fn create_then_query_filters_by_field() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let a = store
            .create(Collection::Lists, fields(json!({"name": "a", "owner_id": "u1"})))
            .unwrap();
        store
            .create(Collection::Lists, fields(json!({"name": "b", "owner_id": "u2"})))
            .unwrap();

        let docs = store
            .query(Collection::Lists, &FieldFilter::eq("owner_id", "u1"))
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, a);
        assert_eq!(docs[0].fields["name"], json!("a"));
    }

    #[test]
    fn update_merges_fields_and_reports_missing_documents() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let id = store
            .create(Collection::Tasks, fields(json!({"title": "t", "priority": "Low", "owner_id": "u1"})))
            .unwrap();
        store
            .update(Collection::Tasks, id, fields(json!({"priority": "High"})))
            .unwrap();

        let docs = store
            .query(Collection::Tasks, &FieldFilter::eq("owner_id", "u1"))
            .unwrap();
        assert_eq!(docs[0].fields["priority"], json!("High"));
        assert_eq!(docs[0].fields["title"], json!("t"));

        let missing = Uuid::new_v4();
        let err = store
            .update(Collection::Tasks, missing, fields(json!({"priority": "Low"})))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id, .. } if id == missing));
    }

    #[test]
    fn subscription_receives_initial_and_post_write_snapshots() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let subscription = store
            .subscribe(Collection::Lists, FieldFilter::eq("owner_id", "u1"))
            .unwrap();
        assert!(next_snapshot(&subscription).is_empty());

        store
            .create(Collection::Lists, fields(json!({"name": "a", "owner_id": "u1"})))
            .unwrap();
        assert_eq!(next_snapshot(&subscription).len(), 1);

        store
            .create(Collection::Lists, fields(json!({"name": "x", "owner_id": "u2"})))
            .unwrap();
        assert_eq!(next_snapshot(&subscription).len(), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let subscription = store
            .subscribe(Collection::Lists, FieldFilter::eq("owner_id", "u1"))
            .unwrap();
        next_snapshot(&subscription);
        store.unsubscribe(subscription.id());
        assert_eq!(store.subscriber_count(), 0);

        store
            .create(Collection::Lists, fields(json!({"name": "a", "owner_id": "u1"})))
            .unwrap();
        assert!(subscription.try_next().is_err());
    }

    #[test]
    fn batch_delete_publishes_one_snapshot_per_collection() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let list = store
            .create(Collection::Lists, fields(json!({"name": "a", "owner_id": "u1"})))
            .unwrap();
        let task = store
            .create(
                Collection::Tasks,
                fields(json!({"title": "t", "list_id": list.to_string(), "owner_id": "u1"})),
            )
            .unwrap();
        let tasks = store
            .subscribe(Collection::Tasks, FieldFilter::eq("owner_id", "u1"))
            .unwrap();
        assert_eq!(next_snapshot(&tasks).len(), 1);

        store
            .batch_delete(&[
                DocumentRef::new(Collection::Tasks, task),
                DocumentRef::new(Collection::Lists, list),
            ])
            .unwrap();
        assert!(next_snapshot(&tasks).is_empty());
        assert!(tasks.try_next().is_err());
    }

    #[test]
    fn delete_of_missing_document_is_idempotent() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.delete(Collection::Tasks, Uuid::new_v4()).unwrap();
    }

    #[test]
    fn going_offline_fails_calls_and_terminates_subscriptions() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let subscription = store
            .subscribe(Collection::Lists, FieldFilter::eq("owner_id", "u1"))
            .unwrap();
        next_snapshot(&subscription);

        store.set_online(false);
        assert!(matches!(
            subscription.try_next().unwrap(),
            SnapshotEvent::Failed(StoreError::Unavailable(_))
        ));
        assert_eq!(store.subscriber_count(), 0);

        let err = store
            .create(Collection::Lists, fields(json!({"name": "a", "owner_id": "u1"})))
            .unwrap_err();
        assert!(err.is_transient());

        store.set_online(true);
        store
            .create(Collection::Lists, fields(json!({"name": "a", "owner_id": "u1"})))
            .unwrap();
    }
}
