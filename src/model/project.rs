use serde::{Deserialize, Serialize};

use super::entity::{EntityBase, ProjectStatus};
use super::task::Task;

/// Top-level schedulable entity; the unit of persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(flatten)]
    pub base: EntityBase,
    #[serde(default)]
    pub status: ProjectStatus,
    /// 0-100, derived from task progress
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub subtasks: Vec<Task>,
}

impl Project {
    pub fn new(id: String, reference_number: String, name: String) -> Self {
        let mut base = EntityBase::new(id, name);
        base.reference_number = reference_number;
        Project {
            base,
            status: ProjectStatus::Pending,
            progress: 0,
            pinned: false,
            subtasks: Vec::new(),
        }
    }

    /// Tasks that are not soft-deleted
    pub fn live_tasks(&self) -> impl Iterator<Item = &Task> {
        self.subtasks.iter().filter(|t| !t.base.is_deleted)
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.subtasks.iter().find(|t| t.base.id == task_id)
    }

    pub fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.subtasks.iter_mut().find(|t| t.base.id == task_id)
    }
}
