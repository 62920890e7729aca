#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;
use taskboard_core::{
    Collection, Document, DocumentId, DocumentRef, FieldFilter, Fields, OwnerId, RemoteStore,
    RetryPolicy, SqliteDocumentStore, StoreError, StoreResult, Subscription, SubscriptionId,
    SyncEngine,
};

pub fn owner(value: &str) -> OwnerId {
    OwnerId::new(value).unwrap()
}

pub fn memory_store() -> Rc<SqliteDocumentStore> {
    Rc::new(SqliteDocumentStore::open_in_memory().unwrap())
}

/// Engine signed in as `owner` with its first snapshots applied.
pub fn live_engine<S: RemoteStore>(store: Rc<S>, owner_id: &str) -> SyncEngine<S> {
    let mut engine = SyncEngine::new(store, RetryPolicy::immediate(3));
    engine.set_owner(Some(owner(owner_id))).unwrap();
    engine.pump();
    engine
}

/// Store decorator that counts calls and injects failures.
pub struct FaultyStore<S> {
    inner: Rc<S>,
    transient_failures: Cell<u32>,
    reject_batches: Cell<bool>,
    pub creates: Cell<usize>,
    pub updates: Cell<usize>,
    pub deletes: Cell<usize>,
    pub batches: Cell<usize>,
}

impl<S: RemoteStore> FaultyStore<S> {
    pub fn new(inner: Rc<S>) -> Self {
        Self {
            inner,
            transient_failures: Cell::new(0),
            reject_batches: Cell::new(false),
            creates: Cell::new(0),
            updates: Cell::new(0),
            deletes: Cell::new(0),
            batches: Cell::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// The next `count` writes fail with `Unavailable`.
    pub fn fail_next_writes(&self, count: u32) {
        self.transient_failures.set(count);
    }

    pub fn reject_batches(&self, reject: bool) {
        self.reject_batches.set(reject);
    }

    fn write_gate(&self) -> StoreResult<()> {
        let remaining = self.transient_failures.get();
        if remaining > 0 {
            self.transient_failures.set(remaining - 1);
            return Err(StoreError::Unavailable("injected".to_string()));
        }
        Ok(())
    }
}

impl<S: RemoteStore> RemoteStore for FaultyStore<S> {
    fn create(&self, collection: Collection, fields: Fields) -> StoreResult<DocumentId> {
        self.creates.set(self.creates.get() + 1);
        self.write_gate()?;
        self.inner.create(collection, fields)
    }

    fn update(&self, collection: Collection, id: DocumentId, fields: Fields) -> StoreResult<()> {
        self.updates.set(self.updates.get() + 1);
        self.write_gate()?;
        self.inner.update(collection, id, fields)
    }

    fn delete(&self, collection: Collection, id: DocumentId) -> StoreResult<()> {
        self.deletes.set(self.deletes.get() + 1);
        self.write_gate()?;
        self.inner.delete(collection, id)
    }

    fn batch_delete(&self, targets: &[DocumentRef]) -> StoreResult<()> {
        self.batches.set(self.batches.get() + 1);
        if self.reject_batches.get() {
            return Err(StoreError::Rejected("injected".to_string()));
        }
        self.write_gate()?;
        self.inner.batch_delete(targets)
    }

    fn query(&self, collection: Collection, filter: &FieldFilter) -> StoreResult<Vec<Document>> {
        self.inner.query(collection, filter)
    }

    fn subscribe(&self, collection: Collection, filter: FieldFilter) -> StoreResult<Subscription> {
        self.inner.subscribe(collection, filter)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.unsubscribe(id);
    }
}
