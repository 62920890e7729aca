//! Pending optimistic mutation records.

use crate::model::board::{Task, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    Pending,
    Committed,
    Reverted,
}

/// One optimistic task edit: the state before, the state applied locally, and
/// how the store answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    pub prior: Task,
    pub target: Task,
    pub status: MutationStatus,
}

impl PendingMutation {
    pub fn new(prior: Task, target: Task) -> Self {
        Self {
            prior,
            target,
            status: MutationStatus::Pending,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.target.id
    }

    pub fn mark_committed(&mut self) {
        self.status = MutationStatus::Committed;
    }

    pub fn mark_reverted(&mut self) {
        self.status = MutationStatus::Reverted;
    }
}
