//! Board projection: lists x priorities -> ordered task buckets.
//!
//! # Responsibility
//! - Derive the renderable board from cached lists and tasks.
//!
//! # Invariants
//! - Pure: same input, same output; inputs are only borrowed.
//! - Columns follow list order, bucket contents follow task order.
//! - Tasks whose list is absent or owned by someone else are left out.

use crate::model::board::{BucketKey, ListId, Priority, Task, TaskId, TaskList};
use std::collections::HashMap;

/// One list column with its three priority buckets (Low, Medium, High).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListColumn<'a> {
    pub list: &'a TaskList,
    buckets: [Vec<&'a Task>; 3],
}

impl<'a> ListColumn<'a> {
    fn new(list: &'a TaskList) -> Self {
        Self {
            list,
            buckets: [Vec::new(), Vec::new(), Vec::new()],
        }
    }

    pub fn bucket(&self, priority: Priority) -> &[&'a Task] {
        &self.buckets[slot(priority)]
    }

    pub fn task_count(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }
}

/// Renderable board for one owner.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BoardView<'a> {
    pub columns: Vec<ListColumn<'a>>,
}

impl<'a> BoardView<'a> {
    pub fn column(&self, list_id: ListId) -> Option<&ListColumn<'a>> {
        self.columns.iter().find(|column| column.list.id == list_id)
    }

    pub fn bucket(&self, key: BucketKey) -> &[&'a Task] {
        self.column(key.list_id)
            .map(|column| column.bucket(key.priority))
            .unwrap_or(&[])
    }

    /// Task ids in `key`, in display order.
    pub fn task_ids(&self, key: BucketKey) -> Vec<TaskId> {
        self.bucket(key).iter().map(|task| task.id).collect()
    }
}

/// Groups `tasks` under `lists` by priority.
pub fn project_board<'a>(lists: &'a [TaskList], tasks: &'a [Task]) -> BoardView<'a> {
    let mut columns: Vec<ListColumn<'a>> = lists.iter().map(ListColumn::new).collect();
    let index: HashMap<ListId, usize> = lists
        .iter()
        .enumerate()
        .map(|(position, list)| (list.id, position))
        .collect();

    for task in tasks {
        let Some(&position) = index.get(&task.list_id) else {
            continue;
        };
        let column = &mut columns[position];
        if column.list.owner_id != task.owner_id {
            continue;
        }
        column.buckets[slot(task.priority)].push(task);
    }

    BoardView { columns }
}

/// Tasks the projection leaves out, in task order.
pub fn orphaned_tasks<'a>(lists: &[TaskList], tasks: &'a [Task]) -> Vec<&'a Task> {
    tasks
        .iter()
        .filter(|task| {
            !lists
                .iter()
                .any(|list| list.id == task.list_id && list.owner_id == task.owner_id)
        })
        .collect()
}

fn slot(priority: Priority) -> usize {
    match priority {
        Priority::Low => 0,
        Priority::Medium => 1,
        Priority::High => 2,
    }
}
