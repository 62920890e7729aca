//! One client session over a remote store.
//!
//! # Responsibility
//! - Wire the sync engine, mutation dispatcher and drag controller together.
//! - Reset per-owner form and gesture state on owner change.
//!
//! # Invariants
//! - Form state never outlives the owner it was typed under.
//! - Every write and drag entry point applies pending owner changes before
//!   touching the store.
//! - `view()` is always a fresh projection of the current cache.

use crate::config::SyncConfig;
use crate::dispatch::{MutationDispatcher, MutationError};
use crate::drag::{DragController, DragError, DragState, DropOutcome};
use crate::identity::IdentityProvider;
use crate::model::board::{BucketKey, ListId, TaskDraft, TaskId, TaskPatch};
use crate::projection::{project_board, BoardView};
use crate::store::RemoteStore;
use crate::sync::engine::{PumpReport, SyncEngine, SyncError, SyncStatus};
use crate::sync::pending::PendingMutation;
use log::{info, warn};
use std::rc::Rc;

/// Board client: cache, forms and drag state for the signed-in owner.
pub struct TaskBoard<S: RemoteStore> {
    engine: SyncEngine<S>,
    dispatcher: MutationDispatcher,
    drag: DragController,
}

impl<S: RemoteStore> TaskBoard<S> {
    pub fn new(store: Rc<S>, config: &SyncConfig) -> Self {
        Self {
            engine: SyncEngine::new(store, config.retry),
            dispatcher: MutationDispatcher::new(),
            drag: DragController::new(),
        }
    }

    pub fn engine(&self) -> &SyncEngine<S> {
        &self.engine
    }

    pub fn dispatcher(&self) -> &MutationDispatcher {
        &self.dispatcher
    }

    pub fn status(&self) -> SyncStatus {
        self.engine.status()
    }

    /// Follows `identity` and opens a session for its current owner.
    pub fn connect(&mut self, identity: &dyn IdentityProvider) -> Result<(), SyncError> {
        self.reset_forms();
        self.engine.bind_identity(identity)
    }

    /// Signs out through `identity` and closes the session immediately.
    ///
    /// Provider failures are logged and leave the session open.
    pub fn sign_out(&mut self, identity: &dyn IdentityProvider) {
        match identity.sign_out() {
            Ok(()) => {
                // Cannot fail: signing out never subscribes.
                let _ = self.engine.set_owner(None);
                self.reset_forms();
                info!("event=board_sign_out module=board status=ok");
            }
            Err(err) => {
                warn!("event=board_sign_out module=board status=error error={err}");
            }
        }
    }

    /// Applies pending identity and snapshot events.
    pub fn pump(&mut self) -> PumpReport {
        let report = self.engine.pump();
        if report.owner_changed {
            self.reset_forms();
        }
        if self.engine.status() == SyncStatus::Live {
            self.dispatcher.retain_drafts(self.engine.cache().lists());
        }
        report
    }

    pub fn reconnect(&mut self) -> Result<(), SyncError> {
        self.engine.reconnect()
    }

    pub fn view(&self) -> BoardView<'_> {
        let cache = self.engine.cache();
        project_board(cache.lists(), cache.tasks())
    }

    pub fn set_list_name(&mut self, name: impl Into<String>) {
        self.sync_identity();
        self.dispatcher.set_list_name_input(name);
    }

    /// Creates a list from the list-name input. Blank input is a no-op.
    pub fn add_list(&mut self) -> Result<Option<ListId>, MutationError> {
        self.sync_identity();
        self.dispatcher.add_list(&self.engine)
    }

    pub fn draft_mut(&mut self, list_id: ListId) -> &mut TaskDraft {
        self.sync_identity();
        self.dispatcher.draft_mut(list_id)
    }

    pub fn add_task(&mut self, list_id: ListId) -> Result<Option<TaskId>, MutationError> {
        self.sync_identity();
        self.dispatcher.add_task(&self.engine, list_id)
    }

    pub fn update_task(
        &mut self,
        task_id: TaskId,
        patch: &TaskPatch,
    ) -> Result<Option<PendingMutation>, MutationError> {
        self.sync_identity();
        self.dispatcher.update_task(&mut self.engine, task_id, patch)
    }

    pub fn delete_task(&mut self, task_id: TaskId) -> Result<(), MutationError> {
        self.sync_identity();
        self.dispatcher.delete_task(&self.engine, task_id)
    }

    pub fn delete_list(&mut self, list_id: ListId) -> Result<usize, MutationError> {
        self.sync_identity();
        self.dispatcher.delete_list(&self.engine, list_id)
    }

    pub fn drag_state(&self) -> &DragState {
        self.drag.state()
    }

    pub fn begin_drag(&mut self, task_id: TaskId) -> Result<BucketKey, DragError> {
        self.sync_identity();
        self.drag.begin(&self.engine, task_id)
    }

    pub fn cancel_drag(&mut self) {
        self.drag.cancel();
    }

    pub fn drop_on(&mut self, destination: Option<BucketKey>) -> Result<DropOutcome, DragError> {
        self.sync_identity();
        self.drag.drop_on(&mut self.engine, destination)
    }

    pub fn drop_on_target(&mut self, target: Option<&str>) -> Result<DropOutcome, DragError> {
        self.sync_identity();
        self.drag.drop_on_target(&mut self.engine, target)
    }

    /// Catches up with owner changes the engine has not pumped yet.
    fn sync_identity(&mut self) {
        let report = self.engine.sync_identity();
        for err in &report.errors {
            warn!("event=identity_sync module=board status=error error={err}");
        }
        if report.owner_changed {
            self.reset_forms();
        }
    }

    fn reset_forms(&mut self) {
        self.dispatcher.reset();
        self.drag = DragController::new();
    }
}

#[cfg(test)]
mod tests {
    use super::TaskBoard;
    use crate::config::SyncConfig;
    use crate::identity::{IdentityProvider, LocalIdentity};
    use crate::model::board::OwnerId;
    use crate::store::SqliteDocumentStore;
    use crate::sync::engine::SyncStatus;
    use std::rc::Rc;

    fn board() -> TaskBoard<SqliteDocumentStore> {
        let store = Rc::new(SqliteDocumentStore::open_in_memory().unwrap());
        TaskBoard::new(store, &SyncConfig::default())
    }

    #[test]
    fn owner_change_resets_form_state() {
        let identity = LocalIdentity::signed_in(OwnerId::new("u1").unwrap());
        let mut board = board();
        board.connect(&identity).unwrap();
        board.pump();

        board.set_list_name("Inbox");
        identity.sign_in(OwnerId::new("u2").unwrap());
        let report = board.pump();
        assert!(report.owner_changed);
        assert_eq!(board.dispatcher().list_name_input(), "");
        assert_eq!(board.engine().owner().unwrap().as_str(), "u2");
    }

    #[test]
    fn sign_out_closes_session_synchronously() {
        let identity = LocalIdentity::signed_in(OwnerId::new("u1").unwrap());
        let mut board = board();
        board.connect(&identity).unwrap();
        board.pump();
        assert_eq!(board.status(), SyncStatus::Live);

        board.sign_out(&identity);
        assert_eq!(board.status(), SyncStatus::SignedOut);
        assert_eq!(board.engine().store().subscriber_count(), 0);
        assert!(identity.current_owner().is_none());
    }

    #[test]
    fn failed_sign_out_keeps_state() {
        let identity = LocalIdentity::new();
        let mut board = board();
        board.connect(&identity).unwrap();
        board.sign_out(&identity);
        assert_eq!(board.status(), SyncStatus::SignedOut);
    }
}
