//! Snapshot-folding sync engine.
//!
//! # Responsibility
//! - Follow owner transitions from the identity provider.
//! - Fold list/task snapshots into the local cache by full replacement.
//! - Re-establish failed subscriptions with bounded backoff.
//!
//! # Invariants
//! - Owner change tears the old session down (unsubscribe + cache clear)
//!   before the new one opens.
//! - Documents owned by anyone but the session owner never enter the cache.
//! - A snapshot arriving after an optimistic edit replaces it, even when the
//!   snapshot predates the edit. The next snapshot is the convergence point.

use crate::config::RetryPolicy;
use crate::identity::IdentityProvider;
use crate::model::board::{OwnerId, Task, TaskList};
use crate::store::{Collection, Document, RemoteStore, SnapshotEvent, StoreError};
use crate::sync::cache::LocalCache;
use crate::sync::session::SessionContext;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Instant;

/// Subscription-side failures reported by the engine.
#[derive(Debug)]
pub enum SyncError {
    /// Subscribing failed or a live subscription was dropped.
    Subscription(StoreError),
    /// Resubscription gave up; `reconnect` is required.
    RetriesExhausted { attempts: u32 },
    /// `reconnect` called without a signed-in owner.
    NotSignedIn,
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subscription(err) => write!(f, "subscription failed: {err}"),
            Self::RetriesExhausted { attempts } => {
                write!(f, "subscription retry gave up after {attempts} attempts")
            }
            Self::NotSignedIn => write!(f, "no owner is signed in"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Subscription(err) => Some(err),
            _ => None,
        }
    }
}

/// Externally visible sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// No owner; cache empty, no subscriptions.
    SignedOut,
    /// Subscribed, waiting for the first snapshot of each collection.
    Connecting,
    /// Cache mirrors the latest snapshots.
    Live,
    /// Subscription lost; resubscribe attempt `next_attempt` is scheduled.
    Stale { next_attempt: u32 },
    /// Resubscription budget exhausted.
    Stalled,
}

/// What one `pump` call did.
#[derive(Debug, Default)]
pub struct PumpReport {
    pub owner_changed: bool,
    pub snapshots_applied: usize,
    pub errors: Vec<SyncError>,
}

#[derive(Debug, Clone, Copy)]
struct Resubscribe {
    attempt: u32,
    due_at: Instant,
}

#[derive(Debug, Clone, Copy, Default)]
struct Freshness {
    lists: bool,
    tasks: bool,
}

impl Freshness {
    fn mark(&mut self, collection: Collection) {
        match collection {
            Collection::Lists => self.lists = true,
            Collection::Tasks => self.tasks = true,
        }
    }

    fn complete(&self) -> bool {
        self.lists && self.tasks
    }
}

/// Owns the local cache and the subscription lifecycle of one client.
pub struct SyncEngine<S: RemoteStore> {
    store: Rc<S>,
    retry: RetryPolicy,
    session: Option<SessionContext>,
    cache: LocalCache,
    identity_events: Option<Receiver<Option<OwnerId>>>,
    freshness: Freshness,
    stale: bool,
    resubscribe: Option<Resubscribe>,
    stalled: bool,
}

impl<S: RemoteStore> SyncEngine<S> {
    pub fn new(store: Rc<S>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            session: None,
            cache: LocalCache::default(),
            identity_events: None,
            freshness: Freshness::default(),
            stale: false,
            resubscribe: None,
            stalled: false,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub(crate) fn cache_mut(&mut self) -> &mut LocalCache {
        &mut self.cache
    }

    pub fn owner(&self) -> Option<&OwnerId> {
        self.session.as_ref().map(SessionContext::owner)
    }

    /// Whether the cache may lag behind the store.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn status(&self) -> SyncStatus {
        let Some(session) = &self.session else {
            return SyncStatus::SignedOut;
        };
        if self.stalled {
            return SyncStatus::Stalled;
        }
        if let Some(resubscribe) = self.resubscribe {
            return SyncStatus::Stale {
                next_attempt: resubscribe.attempt,
            };
        }
        if session.is_attached() && self.freshness.complete() {
            SyncStatus::Live
        } else {
            SyncStatus::Connecting
        }
    }

    /// Follows `identity` from now on, starting with its current owner.
    pub fn bind_identity(&mut self, identity: &dyn IdentityProvider) -> Result<(), SyncError> {
        self.identity_events = Some(identity.changes());
        self.set_owner(identity.current_owner())
    }

    /// Switches the session to `owner` (`None` signs out).
    ///
    /// The previous session is closed synchronously first. Setting the
    /// current owner again is a no-op.
    pub fn set_owner(&mut self, owner: Option<OwnerId>) -> Result<(), SyncError> {
        if self.owner() == owner.as_ref() {
            return Ok(());
        }

        self.close_session();
        let Some(owner) = owner else {
            return Ok(());
        };

        self.session = Some(SessionContext::open(owner));
        self.attach_now()
    }

    /// Drains identity transitions, snapshot events and due retries.
    pub fn pump(&mut self) -> PumpReport {
        self.pump_at(Instant::now())
    }

    /// `pump` with an explicit clock reading for due-retry checks.
    pub fn pump_at(&mut self, now: Instant) -> PumpReport {
        // Only retries scheduled by an earlier pump may run in this one.
        let mut due = self
            .resubscribe
            .filter(|resubscribe| now >= resubscribe.due_at);

        let mut report = self.sync_identity();
        if report.owner_changed {
            due = None;
        }

        self.drain_snapshots(now, &mut report);

        if let Some(resubscribe) = due {
            self.retry_attach(resubscribe.attempt, now, &mut report);
            self.drain_snapshots(now, &mut report);
        }

        report
    }

    /// Applies queued owner transitions from the bound identity provider.
    ///
    /// Snapshots are left queued. Callers about to write must run this first
    /// so the write targets the provider's current owner.
    pub fn sync_identity(&mut self) -> PumpReport {
        let mut report = PumpReport::default();
        for owner in self.drain_identity_events() {
            let before = self.owner().cloned();
            if let Err(err) = self.set_owner(owner) {
                report.errors.push(err);
            }
            if self.owner() != before.as_ref() {
                report.owner_changed = true;
            }
        }
        report
    }

    /// Immediately resubscribes, resetting the retry budget.
    pub fn reconnect(&mut self) -> Result<(), SyncError> {
        if self.session.is_none() {
            return Err(SyncError::NotSignedIn);
        }
        self.attach_now()
    }

    fn attach_now(&mut self) -> Result<(), SyncError> {
        self.resubscribe = None;
        self.stalled = false;
        self.freshness = Freshness::default();

        let store = Rc::clone(&self.store);
        let Some(session) = self.session.as_mut() else {
            return Err(SyncError::NotSignedIn);
        };
        match session.attach(store.as_ref()) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("event=subscribe module=sync status=error attempt=0 error={err}");
                self.schedule_resubscribe(1, Instant::now());
                Err(SyncError::Subscription(err))
            }
        }
    }

    fn retry_attach(&mut self, attempt: u32, now: Instant, report: &mut PumpReport) {
        self.resubscribe = None;
        self.freshness = Freshness::default();

        let store = Rc::clone(&self.store);
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.attach(store.as_ref()) {
            Ok(()) => {
                info!("event=resubscribe module=sync status=ok attempt={attempt}");
            }
            Err(err) => {
                warn!("event=resubscribe module=sync status=error attempt={attempt} error={err}");
                report.errors.push(SyncError::Subscription(err));
                if attempt >= self.retry.max_attempts {
                    self.stalled = true;
                    report
                        .errors
                        .push(SyncError::RetriesExhausted { attempts: attempt });
                } else {
                    self.schedule_resubscribe(attempt + 1, now);
                }
            }
        }
    }

    fn schedule_resubscribe(&mut self, attempt: u32, now: Instant) {
        self.stale = true;
        self.resubscribe = Some(Resubscribe {
            attempt,
            due_at: now + self.retry.delay_for(attempt),
        });
    }

    fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.close(self.store.as_ref());
        }
        self.cache.clear();
        self.freshness = Freshness::default();
        self.stale = false;
        self.resubscribe = None;
        self.stalled = false;
    }

    fn drain_identity_events(&mut self) -> Vec<Option<OwnerId>> {
        let mut owners = Vec::new();
        let Some(events) = &self.identity_events else {
            return owners;
        };
        let disconnected = loop {
            match events.try_recv() {
                Ok(owner) => owners.push(owner),
                Err(TryRecvError::Empty) => break false,
                Err(TryRecvError::Disconnected) => break true,
            }
        };
        if disconnected {
            self.identity_events = None;
        }
        owners
    }

    fn drain_snapshots(&mut self, now: Instant, report: &mut PumpReport) {
        let mut events = Vec::new();
        if let Some(session) = &self.session {
            for subscription in session.subscriptions() {
                loop {
                    match subscription.try_next() {
                        Ok(event) => events.push((subscription.collection(), event)),
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            events.push((
                                subscription.collection(),
                                SnapshotEvent::Failed(StoreError::Unavailable(
                                    "subscription closed".to_string(),
                                )),
                            ));
                            break;
                        }
                    }
                }
            }
        }

        for (collection, event) in events {
            match event {
                SnapshotEvent::Snapshot(documents) => {
                    self.apply_snapshot(collection, &documents);
                    report.snapshots_applied += 1;
                }
                SnapshotEvent::Failed(err) => {
                    if self.resubscribe.is_some() {
                        continue;
                    }
                    warn!(
                        "event=subscription_lost module=sync status=error collection={collection} error={err}"
                    );
                    let store = Rc::clone(&self.store);
                    if let Some(session) = self.session.as_mut() {
                        session.detach(store.as_ref());
                    }
                    self.schedule_resubscribe(1, now);
                    report.errors.push(SyncError::Subscription(err));
                }
            }
        }
    }

    fn apply_snapshot(&mut self, collection: Collection, documents: &[Document]) {
        let Some(owner) = self.owner().cloned() else {
            return;
        };
        match collection {
            Collection::Lists => {
                let lists = decode_owned(
                    documents,
                    &owner,
                    TaskList::from_document,
                    |list: &TaskList| &list.owner_id,
                );
                self.cache.replace_lists(lists);
            }
            Collection::Tasks => {
                let tasks = decode_owned(
                    documents,
                    &owner,
                    Task::from_document,
                    |task: &Task| &task.owner_id,
                );
                self.cache.replace_tasks(tasks);
            }
        }

        self.freshness.mark(collection);
        if self.freshness.complete() && self.resubscribe.is_none() {
            self.stale = false;
        }
    }
}

fn decode_owned<T, E: Display>(
    documents: &[Document],
    owner: &OwnerId,
    decode: impl Fn(&Document) -> Result<T, E>,
    owner_of: impl Fn(&T) -> &OwnerId,
) -> Vec<T> {
    let mut records = Vec::with_capacity(documents.len());
    for document in documents {
        match decode(document) {
            Ok(record) if owner_of(&record) == owner => records.push(record),
            Ok(_) => {
                warn!(
                    "event=snapshot_apply module=sync status=skip reason=foreign_owner doc_id={}",
                    document.id
                );
            }
            Err(err) => {
                warn!(
                    "event=snapshot_apply module=sync status=skip reason=invalid_document error={err}"
                );
            }
        }
    }
    records
}
