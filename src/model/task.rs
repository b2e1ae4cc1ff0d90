use serde::{Deserialize, Serialize};

use super::entity::{Category, EntityBase, TaskStatus};

/// Second-level entity, owned by exactly one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(flatten)]
    pub base: EntityBase,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub child_subtasks: Vec<ChildTask>,
}

impl Task {
    pub fn new(id: String, name: String, category: Category) -> Self {
        Task {
            base: EntityBase::new(id, name),
            category,
            status: TaskStatus::NotStarted,
            child_subtasks: Vec::new(),
        }
    }

    /// Child tasks that are not soft-deleted
    pub fn live_children(&self) -> impl Iterator<Item = &ChildTask> {
        self.child_subtasks.iter().filter(|c| !c.base.is_deleted)
    }

    /// Completion percentage derived from live child tasks, or from the
    /// task's own status when it has none.
    pub fn derived_progress(&self) -> u8 {
        let (total, done) = self.live_children().fold((0usize, 0usize), |(t, d), c| {
            (t + 1, d + usize::from(c.status == TaskStatus::Done))
        });
        if total == 0 {
            return if self.status == TaskStatus::Done { 100 } else { 0 };
        }
        ((done * 100) / total) as u8
    }
}

/// Third-level, terminal entity, owned by exactly one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildTask {
    #[serde(flatten)]
    pub base: EntityBase,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub status: TaskStatus,
    /// Id of the task this child was created under
    #[serde(default)]
    pub parent_id: String,
}

impl ChildTask {
    pub fn new(id: String, name: String, category: Category, parent_id: String) -> Self {
        ChildTask {
            base: EntityBase::new(id, name),
            category,
            status: TaskStatus::NotStarted,
            parent_id,
        }
    }
}
