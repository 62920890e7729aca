//! Mutation dispatcher for list and task writes.
//!
//! # Responsibility
//! - Hold form state: the list-name input and one task draft per list.
//! - Validate user input and issue create/update/delete calls to the store.
//! - Apply optimistic task edits and revert them when the store refuses.
//!
//! # Invariants
//! - Blank list names and task titles never reach the store.
//! - Submitting a draft clears that list's draft only.
//! - `delete_list` removes the list and all its tasks in one atomic batch;
//!   on failure nothing is removed.
//! - Task deletes are not applied locally; the next snapshot removes the task.

use crate::model::board::{ListId, TaskDraft, TaskId, TaskList, TaskPatch, LIST_FIELD};
use crate::retry::with_retry;
use crate::store::{Collection, DocumentRef, FieldFilter, RemoteStore, StoreError};
use crate::sync::engine::SyncEngine;
use crate::sync::pending::PendingMutation;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors surfaced by dispatcher operations.
///
/// Blank input is not an error: those operations return `Ok(None)`.
#[derive(Debug)]
pub enum MutationError {
    /// No session is open.
    NotSignedIn,
    /// Target list is not in the current owner's cache.
    UnknownList(ListId),
    /// Target task is not in the current owner's cache.
    UnknownTask(TaskId),
    /// Store refused or failed a single-document write.
    Persistence {
        operation: &'static str,
        source: StoreError,
    },
    /// Optimistic task edit was rolled back after the store failed.
    Reverted {
        mutation: Box<PendingMutation>,
        source: StoreError,
    },
    /// Cascading list delete failed; neither the list nor any task was removed.
    CascadeFailed { list_id: ListId, source: StoreError },
}

impl Display for MutationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotSignedIn => write!(f, "no owner is signed in"),
            Self::UnknownList(id) => write!(f, "list not found: {id}"),
            Self::UnknownTask(id) => write!(f, "task not found: {id}"),
            Self::Persistence { operation, source } => {
                write!(f, "{operation} failed: {source}")
            }
            Self::Reverted { mutation, source } => write!(
                f,
                "edit of task {} reverted: {source}",
                mutation.task_id()
            ),
            Self::CascadeFailed { list_id, source } => {
                write!(f, "delete of list {list_id} failed, nothing removed: {source}")
            }
        }
    }
}

impl Error for MutationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Persistence { source, .. }
            | Self::Reverted { source, .. }
            | Self::CascadeFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Form state plus write entry points for one client.
#[derive(Debug, Default)]
pub struct MutationDispatcher {
    list_name_input: String,
    drafts: HashMap<ListId, TaskDraft>,
}

impl MutationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list_name_input(&self) -> &str {
        &self.list_name_input
    }

    pub fn set_list_name_input(&mut self, value: impl Into<String>) {
        self.list_name_input = value.into();
    }

    pub fn draft(&self, list_id: ListId) -> Option<&TaskDraft> {
        self.drafts.get(&list_id)
    }

    /// Draft for `list_id`, created empty on first access.
    pub fn draft_mut(&mut self, list_id: ListId) -> &mut TaskDraft {
        self.drafts.entry(list_id).or_default()
    }

    /// Drops drafts whose list is gone from `lists`.
    pub fn retain_drafts(&mut self, lists: &[TaskList]) {
        self.drafts
            .retain(|list_id, _| lists.iter().any(|list| list.id == *list_id));
    }

    /// Drops all form state, e.g. on owner change.
    pub fn reset(&mut self) {
        self.list_name_input.clear();
        self.drafts.clear();
    }

    /// Creates a list named after the list-name input.
    ///
    /// Returns `Ok(None)` without calling the store when the input is blank.
    /// Clears the input on success.
    pub fn add_list<S: RemoteStore>(
        &mut self,
        engine: &SyncEngine<S>,
    ) -> Result<Option<ListId>, MutationError> {
        let owner = engine.owner().ok_or(MutationError::NotSignedIn)?;
        let name = self.list_name_input.trim();
        if name.is_empty() {
            debug!("event=list_add module=dispatch status=skip reason=blank_name");
            return Ok(None);
        }

        let fields = TaskList::new_fields(name, owner);
        let list_id = with_retry(engine.retry_policy(), "list_add", || {
            engine.store().create(Collection::Lists, fields.clone())
        })
        .map_err(|source| persistence_failure("list_add", source))?;

        self.list_name_input.clear();
        info!("event=list_add module=dispatch status=ok list_id={list_id}");
        Ok(Some(list_id))
    }

    /// Creates a task from the draft of `list_id`.
    ///
    /// Returns `Ok(None)` without calling the store when the draft title is
    /// blank. Clears only this list's draft on success.
    pub fn add_task<S: RemoteStore>(
        &mut self,
        engine: &SyncEngine<S>,
        list_id: ListId,
    ) -> Result<Option<TaskId>, MutationError> {
        let owner = engine.owner().ok_or(MutationError::NotSignedIn)?;
        let draft_fields = self
            .drafts
            .get(&list_id)
            .map(|draft| draft.to_fields(list_id, owner));
        let Some(Ok(fields)) = draft_fields else {
            debug!(
                "event=task_add module=dispatch status=skip reason=blank_title list_id={list_id}"
            );
            return Ok(None);
        };
        if engine.cache().list(list_id).is_none() {
            return Err(MutationError::UnknownList(list_id));
        }

        let task_id = with_retry(engine.retry_policy(), "task_add", || {
            engine.store().create(Collection::Tasks, fields.clone())
        })
        .map_err(|source| persistence_failure("task_add", source))?;

        self.drafts.remove(&list_id);
        info!("event=task_add module=dispatch status=ok list_id={list_id} task_id={task_id}");
        Ok(Some(task_id))
    }

    /// Edits a task optimistically.
    ///
    /// The patched task is visible in the cache before the store answers; a
    /// failed write puts the prior task back and returns `Reverted`. Empty
    /// patches and patches that blank the title return `Ok(None)`.
    pub fn update_task<S: RemoteStore>(
        &self,
        engine: &mut SyncEngine<S>,
        task_id: TaskId,
        patch: &TaskPatch,
    ) -> Result<Option<PendingMutation>, MutationError> {
        if engine.owner().is_none() {
            return Err(MutationError::NotSignedIn);
        }
        let prior = engine
            .cache()
            .task(task_id)
            .cloned()
            .ok_or(MutationError::UnknownTask(task_id))?;
        if patch.is_empty() {
            return Ok(None);
        }
        let Ok(target) = patch.apply_to(&prior) else {
            debug!("event=task_update module=dispatch status=skip reason=blank_title task_id={task_id}");
            return Ok(None);
        };
        let mut mutation = PendingMutation::new(prior, target.clone());

        engine.cache_mut().apply_task(target.clone());
        let fields = patch.to_fields(&target);
        let result = with_retry(engine.retry_policy(), "task_update", || {
            engine.store().update(Collection::Tasks, task_id, fields.clone())
        });

        match result {
            Ok(()) => {
                mutation.mark_committed();
                info!("event=task_update module=dispatch status=ok task_id={task_id}");
                Ok(Some(mutation))
            }
            Err(source) => {
                let restored = engine.cache_mut().revert(&mutation);
                mutation.mark_reverted();
                error!(
                    "event=task_update module=dispatch status=error task_id={task_id} restored={restored} error={source}"
                );
                Err(MutationError::Reverted {
                    mutation: Box::new(mutation),
                    source,
                })
            }
        }
    }

    /// Deletes one task in the store. The cache is left untouched.
    pub fn delete_task<S: RemoteStore>(
        &self,
        engine: &SyncEngine<S>,
        task_id: TaskId,
    ) -> Result<(), MutationError> {
        if engine.owner().is_none() {
            return Err(MutationError::NotSignedIn);
        }
        if engine.cache().task(task_id).is_none() {
            return Err(MutationError::UnknownTask(task_id));
        }

        with_retry(engine.retry_policy(), "task_delete", || {
            engine.store().delete(Collection::Tasks, task_id)
        })
        .map_err(|source| persistence_failure("task_delete", source))?;

        info!("event=task_delete module=dispatch status=ok task_id={task_id}");
        Ok(())
    }

    /// Deletes a list together with every task that references it.
    ///
    /// Returns the number of tasks removed with the list. Safe to call again
    /// after a failure.
    pub fn delete_list<S: RemoteStore>(
        &mut self,
        engine: &SyncEngine<S>,
        list_id: ListId,
    ) -> Result<usize, MutationError> {
        if engine.owner().is_none() {
            return Err(MutationError::NotSignedIn);
        }
        if engine.cache().list(list_id).is_none() {
            return Err(MutationError::UnknownList(list_id));
        }

        let cascade = |source: StoreError| {
            error!(
                "event=list_delete module=dispatch status=error list_id={list_id} error={source}"
            );
            MutationError::CascadeFailed { list_id, source }
        };

        let filter = FieldFilter::eq(LIST_FIELD, list_id.to_string());
        let tasks = with_retry(engine.retry_policy(), "list_delete_query", || {
            engine.store().query(Collection::Tasks, &filter)
        })
        .map_err(cascade)?;

        let mut targets: Vec<DocumentRef> = tasks
            .iter()
            .map(|task| DocumentRef::new(Collection::Tasks, task.id))
            .collect();
        targets.push(DocumentRef::new(Collection::Lists, list_id));

        with_retry(engine.retry_policy(), "list_delete", || {
            engine.store().batch_delete(&targets)
        })
        .map_err(cascade)?;

        self.drafts.remove(&list_id);
        info!(
            "event=list_delete module=dispatch status=ok list_id={list_id} tasks={}",
            tasks.len()
        );
        Ok(tasks.len())
    }
}

fn persistence_failure(operation: &'static str, source: StoreError) -> MutationError {
    warn!("event={operation} module=dispatch status=error error={source}");
    MutationError::Persistence { operation, source }
}
