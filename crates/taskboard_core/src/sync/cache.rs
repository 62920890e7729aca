//! Local list/task cache for one owner.
//!
//! # Invariants
//! - Collection order is the order of the latest snapshot.
//! - Optimistic edits replace a task in place; they never reorder.

use crate::model::board::{ListId, Task, TaskId, TaskList};
use crate::sync::pending::PendingMutation;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalCache {
    lists: Vec<TaskList>,
    tasks: Vec<Task>,
}

impl LocalCache {
    pub fn lists(&self) -> &[TaskList] {
        &self.lists
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn list(&self, id: ListId) -> Option<&TaskList> {
        self.lists.iter().find(|list| list.id == id)
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty() && self.tasks.is_empty()
    }

    pub(crate) fn replace_lists(&mut self, lists: Vec<TaskList>) {
        self.lists = lists;
    }

    pub(crate) fn replace_tasks(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
    }

    pub(crate) fn clear(&mut self) {
        self.lists.clear();
        self.tasks.clear();
    }

    /// Replaces the cached task with the same id. Returns the previous value.
    pub(crate) fn apply_task(&mut self, next: Task) -> Option<Task> {
        let slot = self.tasks.iter_mut().find(|task| task.id == next.id)?;
        Some(std::mem::replace(slot, next))
    }

    /// Puts `mutation.prior` back if the cache still holds `mutation.target`.
    ///
    /// Returns `false` when a newer snapshot already replaced the task; the
    /// snapshot wins in that case.
    pub(crate) fn revert(&mut self, mutation: &PendingMutation) -> bool {
        match self.tasks.iter_mut().find(|task| task.id == mutation.task_id()) {
            Some(slot) if *slot == mutation.target => {
                *slot = mutation.prior.clone();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LocalCache;
    use crate::model::board::{OwnerId, Priority, Task};
    use crate::sync::pending::PendingMutation;
    use uuid::Uuid;

    fn task(priority: Priority) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: "t".to_string(),
            description: String::new(),
            due_date: None,
            priority,
            list_id: Uuid::new_v4(),
            owner_id: OwnerId::new("u1").unwrap(),
        }
    }

    #[test]
    fn apply_then_revert_restores_prior() {
        let prior = task(Priority::Low);
        let mut cache = LocalCache::default();
        cache.replace_tasks(vec![prior.clone()]);

        let target = Task {
            priority: Priority::High,
            ..prior.clone()
        };
        assert_eq!(cache.apply_task(target.clone()), Some(prior.clone()));

        let mutation = PendingMutation::new(prior.clone(), target);
        assert!(cache.revert(&mutation));
        assert_eq!(cache.task(prior.id), Some(&prior));
    }

    #[test]
    fn revert_yields_to_newer_snapshot() {
        let prior = task(Priority::Low);
        let target = Task {
            priority: Priority::High,
            ..prior.clone()
        };
        let from_snapshot = Task {
            priority: Priority::Medium,
            ..prior.clone()
        };
        let mut cache = LocalCache::default();
        cache.replace_tasks(vec![from_snapshot.clone()]);

        assert!(!cache.revert(&PendingMutation::new(prior.clone(), target)));
        assert_eq!(cache.task(prior.id), Some(&from_snapshot));
    }

    #[test]
    fn apply_to_missing_task_is_ignored() {
        let mut cache = LocalCache::default();
        assert_eq!(cache.apply_task(task(Priority::Low)), None);
        assert!(cache.is_empty());
    }
}
