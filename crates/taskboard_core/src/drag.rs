//! Drag-and-drop reassignment of tasks between buckets.
//!
//! # Responsibility
//! - Track one drag gesture: `Idle -> Dragging -> Dropped -> Committed | Reverted`.
//!   `Dropped` lasts only for the blocking store write inside `drop_on`.
//! - Turn a drop into a list/priority update of the dragged task.
//!
//! # Invariants
//! - Dropping onto the task's own bucket issues nothing and changes nothing.
//! - Only `list_id` and `priority` of the dragged task are written.
//! - No rank within a bucket is stored; bucket order is cache order.
//! - A failed write restores the prior bucket locally unless a newer
//!   snapshot already replaced the task.

use crate::model::board::{BucketKey, Task, TaskId};
use crate::retry::with_retry;
use crate::store::{Collection, RemoteStore, StoreError};
use crate::sync::engine::SyncEngine;
use crate::sync::pending::PendingMutation;
use log::{debug, error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Gesture state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Dragging {
        task_id: TaskId,
        source: BucketKey,
    },
    /// Optimistic move applied, store write in flight.
    ///
    /// Held only while `drop_on` waits on the store. `drop_on` always
    /// returns in `Committed` or `Reverted`, so callers never observe it.
    Dropped {
        task_id: TaskId,
        source: BucketKey,
        destination: BucketKey,
    },
    Committed(PendingMutation),
    Reverted(PendingMutation),
}

impl DragState {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dragging { .. } => "dragging",
            Self::Dropped { .. } => "dropped",
            Self::Committed(_) => "committed",
            Self::Reverted(_) => "reverted",
        }
    }

    /// Whether a new gesture may start from this state.
    fn is_settled(&self) -> bool {
        matches!(self, Self::Idle | Self::Committed(_) | Self::Reverted(_))
    }
}

/// Result of a drop that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// Released outside every drop target.
    Cancelled,
    /// Released on the task's own bucket.
    Unchanged,
    /// Moved and acknowledged by the store.
    Committed(PendingMutation),
}

#[derive(Debug)]
pub enum DragError {
    NotSignedIn,
    UnknownTask(TaskId),
    UnknownDestination(BucketKey),
    /// Drop target id could not be parsed as a bucket key.
    InvalidTarget(String),
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },
    /// Store write failed; the move was rolled back locally.
    Reverted {
        mutation: Box<PendingMutation>,
        source: StoreError,
    },
}

impl Display for DragError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotSignedIn => write!(f, "no owner is signed in"),
            Self::UnknownTask(id) => write!(f, "task not found: {id}"),
            Self::UnknownDestination(bucket) => write!(f, "drop target not found: {bucket}"),
            Self::InvalidTarget(value) => write!(f, "invalid drop target `{value}`"),
            Self::InvalidTransition { from, action } => {
                write!(f, "cannot {action} while drag is {from}")
            }
            Self::Reverted { mutation, source } => write!(
                f,
                "move of task {} reverted: {source}",
                mutation.task_id()
            ),
        }
    }
}

impl Error for DragError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Reverted { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Drag gesture state machine for one client.
#[derive(Debug)]
pub struct DragController {
    state: DragState,
}

impl Default for DragController {
    fn default() -> Self {
        Self::new()
    }
}

impl DragController {
    pub fn new() -> Self {
        Self {
            state: DragState::Idle,
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    /// Picks up `task_id`. Returns the bucket it was lifted from.
    pub fn begin<S: RemoteStore>(
        &mut self,
        engine: &SyncEngine<S>,
        task_id: TaskId,
    ) -> Result<BucketKey, DragError> {
        if !self.state.is_settled() {
            return Err(DragError::InvalidTransition {
                from: self.state.name(),
                action: "begin",
            });
        }
        if engine.owner().is_none() {
            return Err(DragError::NotSignedIn);
        }
        let source = engine
            .cache()
            .task(task_id)
            .map(Task::bucket)
            .ok_or(DragError::UnknownTask(task_id))?;

        self.state = DragState::Dragging { task_id, source };
        debug!("event=drag_begin module=drag status=ok task_id={task_id}");
        Ok(source)
    }

    /// Abandons the current gesture without any mutation.
    pub fn cancel(&mut self) {
        if matches!(self.state, DragState::Dragging { .. }) {
            self.state = DragState::Idle;
        }
    }

    /// Drops on a rendered target id (see `BucketKey`'s `Display`).
    pub fn drop_on_target<S: RemoteStore>(
        &mut self,
        engine: &mut SyncEngine<S>,
        target: Option<&str>,
    ) -> Result<DropOutcome, DragError> {
        let destination = match target {
            Some(raw) => match BucketKey::parse(raw) {
                Some(bucket) => Some(bucket),
                None => {
                    self.cancel();
                    return Err(DragError::InvalidTarget(raw.to_string()));
                }
            },
            None => None,
        };
        self.drop_on(engine, destination)
    }

    /// Completes the gesture on `destination` (`None` = outside any target).
    pub fn drop_on<S: RemoteStore>(
        &mut self,
        engine: &mut SyncEngine<S>,
        destination: Option<BucketKey>,
    ) -> Result<DropOutcome, DragError> {
        let DragState::Dragging { task_id, source } = self.state else {
            return Err(DragError::InvalidTransition {
                from: self.state.name(),
                action: "drop",
            });
        };
        self.state = DragState::Idle;

        let Some(destination) = destination else {
            debug!("event=drag_drop module=drag status=skip reason=no_target task_id={task_id}");
            return Ok(DropOutcome::Cancelled);
        };
        if engine.owner().is_none() {
            return Err(DragError::NotSignedIn);
        }
        let prior = engine
            .cache()
            .task(task_id)
            .cloned()
            .ok_or(DragError::UnknownTask(task_id))?;
        if prior.bucket() == destination {
            debug!("event=drag_drop module=drag status=skip reason=same_bucket task_id={task_id}");
            return Ok(DropOutcome::Unchanged);
        }
        if engine.cache().list(destination.list_id).is_none() {
            return Err(DragError::UnknownDestination(destination));
        }

        let target = Task {
            list_id: destination.list_id,
            priority: destination.priority,
            ..prior.clone()
        };
        let mut mutation = PendingMutation::new(prior, target.clone());
        engine.cache_mut().apply_task(target);
        self.state = DragState::Dropped {
            task_id,
            source,
            destination,
        };

        let fields = Task::bucket_fields(destination);
        let result = with_retry(engine.retry_policy(), "task_move", || {
            engine.store().update(Collection::Tasks, task_id, fields.clone())
        });

        match result {
            Ok(()) => {
                mutation.mark_committed();
                self.state = DragState::Committed(mutation.clone());
                info!(
                    "event=task_move module=drag status=ok task_id={task_id} list_id={} priority={}",
                    destination.list_id, destination.priority
                );
                Ok(DropOutcome::Committed(mutation))
            }
            Err(source) => {
                let restored = engine.cache_mut().revert(&mutation);
                mutation.mark_reverted();
                self.state = DragState::Reverted(mutation.clone());
                error!(
                    "event=task_move module=drag status=error task_id={task_id} restored={restored} error={source}"
                );
                Err(DragError::Reverted {
                    mutation: Box::new(mutation),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DragController, DragError, DragState, DropOutcome};
    use crate::config::RetryPolicy;
    use crate::model::board::{BucketKey, OwnerId, Priority, TaskDraft, TaskList};
    use crate::store::{Collection, RemoteStore, SqliteDocumentStore};
    use crate::sync::engine::SyncEngine;
    use crate::sync::pending::MutationStatus;
    use std::rc::Rc;
    use uuid::Uuid;

    struct Fixture {
        engine: SyncEngine<SqliteDocumentStore>,
        list_a: Uuid,
        list_b: Uuid,
        task: Uuid,
    }

    fn fixture() -> Fixture {
        let store = Rc::new(SqliteDocumentStore::open_in_memory().unwrap());
        let owner = OwnerId::new("u1").unwrap();
        let list_a = store
            .create(Collection::Lists, TaskList::new_fields("A", &owner))
            .unwrap();
        let list_b = store
            .create(Collection::Lists, TaskList::new_fields("B", &owner))
            .unwrap();
        let draft = TaskDraft {
            title: "T1".to_string(),
            priority: Some(Priority::Low),
            ..TaskDraft::default()
        };
        let task = store
            .create(Collection::Tasks, draft.to_fields(list_a, &owner).unwrap())
            .unwrap();

        let mut engine = SyncEngine::new(store, RetryPolicy::no_retry());
        engine.set_owner(Some(owner)).unwrap();
        engine.pump();
        Fixture {
            engine,
            list_a,
            list_b,
            task,
        }
    }

    #[test]
    fn drop_on_other_bucket_moves_task_optimistically_and_commits() {
        let mut f = fixture();
        let mut drag = DragController::new();
        drag.begin(&f.engine, f.task).unwrap();

        let destination = BucketKey::new(f.list_b, Priority::High);
        let outcome = drag.drop_on(&mut f.engine, Some(destination)).unwrap();
        let DropOutcome::Committed(mutation) = outcome else {
            panic!("expected committed move");
        };
        assert_eq!(mutation.status, MutationStatus::Committed);
        assert_eq!(f.engine.cache().task(f.task).unwrap().bucket(), destination);
        assert!(matches!(drag.state(), DragState::Committed(_)));

        f.engine.pump();
        let task = f.engine.cache().task(f.task).unwrap();
        assert_eq!(task.list_id, f.list_b);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.title, "T1");
    }

    #[test]
    fn drop_returns_in_settled_state_whether_write_lands_or_not() {
        let mut f = fixture();
        let mut drag = DragController::new();
        drag.begin(&f.engine, f.task).unwrap();
        drag.drop_on(&mut f.engine, Some(BucketKey::new(f.list_b, Priority::Medium)))
            .unwrap();
        assert!(matches!(drag.state(), DragState::Committed(_)));
        assert!(drag.state().is_settled());
        f.engine.pump();

        drag.begin(&f.engine, f.task).unwrap();
        f.engine.store().delete(Collection::Tasks, f.task).unwrap();
        assert!(drag
            .drop_on(&mut f.engine, Some(BucketKey::new(f.list_a, Priority::High)))
            .is_err());
        assert!(matches!(drag.state(), DragState::Reverted(_)));
        assert!(drag.state().is_settled());
    }

    #[test]
    fn drop_on_own_bucket_is_unchanged() {
        let mut f = fixture();
        let mut drag = DragController::new();
        let source = drag.begin(&f.engine, f.task).unwrap();
        assert_eq!(source, BucketKey::new(f.list_a, Priority::Low));

        let outcome = drag.drop_on(&mut f.engine, Some(source)).unwrap();
        assert_eq!(outcome, DropOutcome::Unchanged);
        assert_eq!(drag.state(), &DragState::Idle);
    }

    #[test]
    fn drop_outside_targets_cancels() {
        let mut f = fixture();
        let mut drag = DragController::new();
        drag.begin(&f.engine, f.task).unwrap();
        assert_eq!(
            drag.drop_on(&mut f.engine, None).unwrap(),
            DropOutcome::Cancelled
        );
        assert_eq!(drag.state(), &DragState::Idle);
    }

    #[test]
    fn drop_without_begin_is_invalid_transition() {
        let mut f = fixture();
        let mut drag = DragController::new();
        let err = drag
            .drop_on(&mut f.engine, Some(BucketKey::new(f.list_b, Priority::Low)))
            .unwrap_err();
        assert!(matches!(err, DragError::InvalidTransition { from: "idle", .. }));
    }

    #[test]
    fn begin_twice_is_invalid_transition() {
        let f = fixture();
        let mut drag = DragController::new();
        drag.begin(&f.engine, f.task).unwrap();
        let err = drag.begin(&f.engine, f.task).unwrap_err();
        assert!(matches!(
            err,
            DragError::InvalidTransition {
                from: "dragging",
                ..
            }
        ));
    }

    #[test]
    fn unknown_task_and_destination_are_rejected() {
        let mut f = fixture();
        let mut drag = DragController::new();
        assert!(matches!(
            drag.begin(&f.engine, Uuid::new_v4()),
            Err(DragError::UnknownTask(_))
        ));

        drag.begin(&f.engine, f.task).unwrap();
        let missing = BucketKey::new(Uuid::new_v4(), Priority::High);
        assert!(matches!(
            drag.drop_on(&mut f.engine, Some(missing)),
            Err(DragError::UnknownDestination(bucket)) if bucket == missing
        ));
        assert_eq!(
            f.engine.cache().task(f.task).unwrap().bucket(),
            BucketKey::new(f.list_a, Priority::Low)
        );
    }

    #[test]
    fn malformed_target_id_cancels_the_gesture() {
        let mut f = fixture();
        let mut drag = DragController::new();
        drag.begin(&f.engine, f.task).unwrap();
        assert!(matches!(
            drag.drop_on_target(&mut f.engine, Some("lane-7")),
            Err(DragError::InvalidTarget(_))
        ));
        assert_eq!(drag.state(), &DragState::Idle);
    }

    #[test]
    fn drop_on_target_accepts_rendered_bucket_ids() {
        let mut f = fixture();
        let mut drag = DragController::new();
        drag.begin(&f.engine, f.task).unwrap();
        let target = BucketKey::new(f.list_a, Priority::Medium).to_string();
        let outcome = drag.drop_on_target(&mut f.engine, Some(&target)).unwrap();
        assert!(matches!(outcome, DropOutcome::Committed(_)));
        assert_eq!(
            f.engine.cache().task(f.task).unwrap().priority,
            Priority::Medium
        );
    }

    #[test]
    fn failed_write_restores_prior_bucket() {
        let mut f = fixture();
        let mut drag = DragController::new();
        drag.begin(&f.engine, f.task).unwrap();
        f.engine.store().delete(Collection::Tasks, f.task).unwrap();

        let err = drag
            .drop_on(&mut f.engine, Some(BucketKey::new(f.list_b, Priority::High)))
            .unwrap_err();
        let DragError::Reverted { mutation, .. } = err else {
            panic!("expected reverted move");
        };
        assert_eq!(mutation.status, MutationStatus::Reverted);
        assert_eq!(
            f.engine.cache().task(f.task).unwrap().bucket(),
            BucketKey::new(f.list_a, Priority::Low)
        );
        assert!(matches!(drag.state(), DragState::Reverted(_)));

        f.engine.pump();
        assert!(f.engine.cache().task(f.task).is_none());
    }

    #[test]
    fn new_gesture_may_start_after_settled_drop() {
        let mut f = fixture();
        let mut drag = DragController::new();
        drag.begin(&f.engine, f.task).unwrap();
        drag.drop_on(&mut f.engine, Some(BucketKey::new(f.list_b, Priority::Low)))
            .unwrap();
        assert_eq!(
            drag.begin(&f.engine, f.task).unwrap(),
            BucketKey::new(f.list_b, Priority::Low)
        );
    }
}
