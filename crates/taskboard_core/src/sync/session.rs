//! Owner-scoped session context.
//!
//! # Invariants
//! - A session belongs to exactly one owner for its whole life.
//! - `close` cancels every subscription before returning.

use crate::model::board::{OwnerId, OWNER_FIELD};
use crate::store::{Collection, FieldFilter, RemoteStore, StoreResult, Subscription};
use log::{debug, info};

/// Live subscriptions and identity of one signed-in owner.
#[derive(Debug)]
pub struct SessionContext {
    owner: OwnerId,
    subscriptions: Vec<Subscription>,
}

impl SessionContext {
    /// Opens a detached session; call `attach` to start receiving snapshots.
    pub fn open(owner: OwnerId) -> Self {
        info!("event=session_open module=sync status=ok");
        Self {
            owner,
            subscriptions: Vec::new(),
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn is_attached(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    /// Subscribes to the owner's lists and tasks.
    ///
    /// All-or-nothing: when the second subscription fails the first one is
    /// cancelled again.
    pub fn attach<S: RemoteStore + ?Sized>(&mut self, store: &S) -> StoreResult<()> {
        self.detach(store);
        for collection in [Collection::Lists, Collection::Tasks] {
            let filter = FieldFilter::eq(OWNER_FIELD, self.owner.as_str());
            match store.subscribe(collection, filter) {
                Ok(subscription) => self.subscriptions.push(subscription),
                Err(err) => {
                    self.detach(store);
                    return Err(err);
                }
            }
        }
        debug!(
            "event=session_attach module=sync status=ok subscriptions={}",
            self.subscriptions.len()
        );
        Ok(())
    }

    /// Cancels all subscriptions; queued events are discarded with them.
    pub fn detach<S: RemoteStore + ?Sized>(&mut self, store: &S) {
        for subscription in self.subscriptions.drain(..) {
            store.unsubscribe(subscription.id());
        }
    }

    pub fn close<S: RemoteStore + ?Sized>(mut self, store: &S) {
        self.detach(store);
        info!("event=session_close module=sync status=ok");
    }
}
