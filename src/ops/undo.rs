//! Soft-delete batches with a timed recovery window.
//!
//! Deletion routing is part of this module's contract:
//! - project-level ids are **not** soft-deleted; they come back in
//!   [`DeleteOutcome::remote`] for an immediate, non-undoable gateway delete;
//! - task and child-task ids are soft-deleted locally and become the single
//!   recoverable batch.
//!
//! Deleting the last unfinished child can complete its ancestors through
//! the status roll-up; the batch records their statuses from before the
//! delete and restoring puts them back.
//!
//! Only the most recent batch can be restored. Expiry hides the prompt and
//! nothing more: expired items stay soft-deleted until purged explicitly.
//!
//! Time is passed in by the caller so the countdown can be driven by a UI
//! timer, by a one-shot CLI reading wall-clock time, or by tests.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::entity::{Level, ProjectStatus, TaskStatus};
use crate::model::project::Project;
use crate::model::tree::{self, EntityMut, EntityRef};
use crate::ops::tree_ops::{self, DeletedRef};

/// The recoverable deletion batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoBatch {
    /// Identifies the batch to timer callbacks
    pub generation: u64,
    pub items: Vec<DeletedRef>,
    pub deleted_at: DateTime<Utc>,
    /// When the window closes; `None` while paused
    pub deadline: Option<DateTime<Utc>>,
    /// Time left when paused, in milliseconds
    pub remaining_ms: i64,
    /// Ancestors of the items, with their statuses before the delete
    #[serde(default)]
    pub ancestors: Vec<AncestorStatus>,
}

/// Status of a project or task that owns a deleted item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "kebab-case")]
pub enum AncestorStatus {
    Project { id: String, status: ProjectStatus },
    Task { id: String, status: TaskStatus },
}

impl AncestorStatus {
    fn id(&self) -> &str {
        match self {
            AncestorStatus::Project { id, .. } | AncestorStatus::Task { id, .. } => id,
        }
    }
}

/// Statuses of every project and task above the given items
fn ancestor_statuses(projects: &[Project], items: &[DeletedRef]) -> Vec<AncestorStatus> {
    let mut out: Vec<AncestorStatus> = Vec::new();
    for item in items {
        let mut parent = tree::locate(projects, &item.id).and_then(|loc| loc.parent());
        while let Some(loc) = parent {
            let status = match tree::entity_at(projects, loc) {
                Some(EntityRef::Project(p)) => AncestorStatus::Project {
                    id: p.base.id.clone(),
                    status: p.status,
                },
                Some(EntityRef::Task(t)) => AncestorStatus::Task {
                    id: t.base.id.clone(),
                    status: t.status,
                },
                Some(EntityRef::ChildTask(_)) | None => break,
            };
            if !out.iter().any(|a| a.id() == status.id()) {
                out.push(status);
            }
            parent = loc.parent();
        }
    }
    out
}

fn put_back_statuses(projects: &mut [Project], ancestors: &[AncestorStatus]) {
    for ancestor in ancestors {
        match (tree::find_entity_mut(projects, ancestor.id()), ancestor) {
            (Some(EntityMut::Project(p)), AncestorStatus::Project { status, .. }) => {
                p.status = *status;
            }
            (Some(EntityMut::Task(t)), AncestorStatus::Task { status, .. }) => {
                t.status = *status;
            }
            _ => tracing::debug!(id = ancestor.id(), "ancestor gone; status not restored"),
        }
    }
}

impl UndoBatch {
    fn ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.id.clone()).collect()
    }

    /// The level shared by every item, if they all share one
    pub fn item_type(&self) -> Option<Level> {
        let first = self.items.first()?.level;
        self.items
            .iter()
            .all(|i| i.level == first)
            .then_some(first)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "batch", rename_all = "lowercase")]
pub enum UndoState {
    #[default]
    Idle,
    Showing(UndoBatch),
}

/// Result of routing a delete request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Tasks and child tasks now soft-deleted and recoverable
    pub soft_deleted: Vec<DeletedRef>,
    /// Project ids the caller must delete through the gateway
    pub remote: Vec<String>,
    /// Ids that matched nothing (or were already deleted)
    pub skipped: Vec<String>,
}

/// What a recovery prompt should show
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoPrompt {
    pub is_visible: bool,
    pub message: String,
    pub item_type: Option<Level>,
    pub count: usize,
}

/// Longest undo window honoured; longer settings are cut to this
pub const MAX_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

fn window_millis(window: std::time::Duration) -> i64 {
    i64::try_from(window.as_millis()).map_or(MAX_WINDOW_MS, |ms| ms.min(MAX_WINDOW_MS))
}

/// `now` plus `ms`, saturating at the latest representable instant
fn deadline_after(now: DateTime<Utc>, ms: i64) -> DateTime<Utc> {
    Duration::try_milliseconds(ms.clamp(0, MAX_WINDOW_MS))
        .and_then(|window| now.checked_add_signed(window))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoManager {
    state: UndoState,
    window_ms: i64,
    next_generation: u64,
}

impl Default for UndoManager {
    fn default() -> Self {
        UndoManager::new(std::time::Duration::from_secs(5))
    }
}

impl UndoManager {
    pub fn new(window: std::time::Duration) -> Self {
        UndoManager {
            state: UndoState::Idle,
            window_ms: window_millis(window),
            next_generation: 1,
        }
    }

    /// Window for batches created from now on; a showing batch keeps its deadline
    pub fn set_window(&mut self, window: std::time::Duration) {
        self.window_ms = window_millis(window);
    }

    pub fn state(&self) -> &UndoState {
        &self.state
    }

    pub fn batch(&self) -> Option<&UndoBatch> {
        match &self.state {
            UndoState::Showing(batch) => Some(batch),
            UndoState::Idle => None,
        }
    }

    pub fn is_showing(&self) -> bool {
        matches!(self.state, UndoState::Showing(_))
    }

    /// Route and apply a delete request. A non-empty soft-delete replaces
    /// whatever batch was showing; the replaced batch is no longer
    /// recoverable and its timer generation goes stale.
    pub fn delete(
        &mut self,
        projects: &mut [Project],
        ids: &[String],
        now: DateTime<Utc>,
    ) -> DeleteOutcome {
        let mut outcome = DeleteOutcome::default();
        let mut local = Vec::new();
        for id in ids {
            match tree::locate(projects, id) {
                Some(loc) if loc.level() == Level::Project => {
                    if !outcome.remote.contains(id) {
                        outcome.remote.push(id.clone());
                    }
                }
                Some(_) => local.push(id.clone()),
                None => outcome.skipped.push(id.clone()),
            }
        }

        let marked = tree_ops::soft_delete(projects, &local, now);
        for id in &local {
            if !marked.iter().any(|m| &m.id == id) {
                outcome.skipped.push(id.clone());
            }
        }
        if !marked.is_empty() {
            let generation = self.next_generation;
            self.next_generation += 1;
            self.state = UndoState::Showing(UndoBatch {
                generation,
                items: marked.clone(),
                deleted_at: now,
                deadline: Some(deadline_after(now, self.window_ms)),
                remaining_ms: self.window_ms,
                ancestors: ancestor_statuses(projects, &marked),
            });
        }
        outcome.soft_deleted = marked;
        outcome
    }

    /// Restore the showing batch, wherever its items now live. Returns how
    /// many items were restored; 0 when idle.
    pub fn restore(&mut self, projects: &mut [Project]) -> usize {
        match std::mem::take(&mut self.state) {
            UndoState::Showing(batch) => {
                let restored = tree_ops::restore(projects, &batch.ids());
                put_back_statuses(projects, &batch.ancestors);
                restored
            }
            UndoState::Idle => 0,
        }
    }

    /// Close the prompt; items stay soft-deleted.
    pub fn dismiss(&mut self) {
        self.state = UndoState::Idle;
    }

    /// Freeze the countdown (prompt hovered or focused)
    pub fn pause(&mut self, now: DateTime<Utc>) {
        if let UndoState::Showing(batch) = &mut self.state
            && let Some(deadline) = batch.deadline.take()
        {
            batch.remaining_ms = (deadline - now).num_milliseconds().max(0);
        }
    }

    /// Continue the countdown with the time left at pause
    pub fn resume(&mut self, now: DateTime<Utc>) {
        if let UndoState::Showing(batch) = &mut self.state
            && batch.deadline.is_none()
        {
            batch.deadline = Some(deadline_after(now, batch.remaining_ms));
        }
    }

    pub fn is_paused(&self) -> bool {
        self.batch().is_some_and(|b| b.deadline.is_none())
    }

    /// Expire the batch if its window has closed. Returns true on expiry.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        let expired = self
            .batch()
            .and_then(|b| b.deadline)
            .is_some_and(|deadline| now >= deadline);
        if expired {
            self.state = UndoState::Idle;
        }
        expired
    }

    /// Timer callback for the batch `generation`. Callbacks from replaced
    /// or finished batches are ignored.
    pub fn on_timer(&mut self, generation: u64, now: DateTime<Utc>) -> bool {
        match self.batch() {
            Some(batch) if batch.generation == generation => self.tick(now),
            _ => false,
        }
    }

    pub fn prompt(&self) -> UndoPrompt {
        match self.batch() {
            None => UndoPrompt {
                is_visible: false,
                message: String::new(),
                item_type: None,
                count: 0,
            },
            Some(batch) => {
                let count = batch.items.len();
                let item_type = batch.item_type();
                let noun = match item_type {
                    Some(level) => level.noun(count),
                    None if count == 1 => "item",
                    None => "items",
                };
                UndoPrompt {
                    is_visible: true,
                    message: format!("{} {} deleted", count, noun),
                    item_type,
                    count,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::Category;
    use crate::model::task::{ChildTask, Task};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn secs(n: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(n)
    }

    fn sample() -> Vec<Project> {
        let mut p = Project::new("P".into(), "PRJ-1".into(), "P".into());
        let mut a = Task::new("A".into(), "A".into(), Category::Design);
        a.child_subtasks.push(ChildTask::new(
            "A1".into(),
            "A1".into(),
            Category::Design,
            "A".into(),
        ));
        p.subtasks.push(a);
        p.subtasks.push(Task::new("B".into(), "B".into(), Category::Testing));
        vec![p]
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn delete_then_restore_reproduces_tree() {
        let mut tree = sample();
        let before = tree.clone();
        let mut undo = UndoManager::default();

        let outcome = undo.delete(&mut tree, &ids(&["B", "A1"]), t0());
        assert_eq!(outcome.soft_deleted.len(), 2);
        assert!(tree::active_view(&tree)[0].subtasks.len() == 1);

        assert_eq!(undo.restore(&mut tree), 2);
        assert_eq!(tree, before);
        assert!(!undo.is_showing());
    }

    #[test]
    fn project_ids_are_routed_remote() {
        let mut tree = sample();
        let mut undo = UndoManager::default();
        let outcome = undo.delete(&mut tree, &ids(&["P"]), t0());
        assert_eq!(outcome.remote, ids(&["P"]));
        assert!(outcome.soft_deleted.is_empty());
        assert!(!tree[0].base.is_deleted);
        assert!(!undo.is_showing());
    }

    #[test]
    fn new_delete_replaces_batch() {
        let mut tree = sample();
        let mut undo = UndoManager::default();
        undo.delete(&mut tree, &ids(&["A"]), t0());
        let first_gen = undo.batch().unwrap().generation;
        undo.delete(&mut tree, &ids(&["B"]), secs(1));
        assert_ne!(undo.batch().unwrap().generation, first_gen);

        assert_eq!(undo.restore(&mut tree), 1);
        assert!(tree[0].subtasks[0].base.is_deleted, "first batch is not recoverable");
        assert!(!tree[0].subtasks[1].base.is_deleted);
    }

    #[test]
    fn stale_timer_is_ignored() {
        let mut tree = sample();
        let mut undo = UndoManager::default();
        undo.delete(&mut tree, &ids(&["A"]), t0());
        let stale = undo.batch().unwrap().generation;
        undo.delete(&mut tree, &ids(&["B"]), secs(4));
        assert!(!undo.on_timer(stale, secs(6)));
        assert!(undo.is_showing());
        let live = undo.batch().unwrap().generation;
        assert!(undo.on_timer(live, secs(9)));
        assert!(!undo.is_showing());
    }

    #[test]
    fn expiry_keeps_items_deleted() {
        let mut tree = sample();
        let mut undo = UndoManager::default();
        undo.delete(&mut tree, &ids(&["B"]), t0());
        assert!(!undo.tick(secs(4)));
        assert!(undo.tick(secs(5)));
        assert_eq!(undo.restore(&mut tree), 0);
        assert!(tree[0].subtasks[1].base.is_deleted);
    }

    #[test]
    fn pause_freezes_countdown() {
        let mut tree = sample();
        let mut undo = UndoManager::default();
        undo.delete(&mut tree, &ids(&["B"]), t0());
        undo.pause(secs(2));
        assert!(undo.is_paused());
        assert!(!undo.tick(secs(60)));

        undo.resume(secs(60));
        assert!(!undo.tick(secs(62)));
        assert!(undo.tick(secs(63)));
    }

    #[test]
    fn dismiss_leaves_items_deleted() {
        let mut tree = sample();
        let mut undo = UndoManager::default();
        undo.delete(&mut tree, &ids(&["A"]), t0());
        undo.dismiss();
        assert_eq!(undo.restore(&mut tree), 0);
        assert!(tree[0].subtasks[0].base.is_deleted);
    }

    #[test]
    fn restore_relocates_moved_items() {
        let mut tree = sample();
        let mut undo = UndoManager::default();
        undo.delete(&mut tree, &ids(&["B"]), t0());
        tree[0].subtasks.swap(0, 1);
        tree[0].base.name = "Renamed".into();
        assert_eq!(undo.restore(&mut tree), 1);
        assert!(!tree[0].subtasks[0].base.is_deleted);
    }

    #[test]
    fn prompt_describes_batch() {
        let mut tree = sample();
        let mut undo = UndoManager::default();
        assert!(!undo.prompt().is_visible);

        undo.delete(&mut tree, &ids(&["A", "B", "missing"]), t0());
        let prompt = undo.prompt();
        assert_eq!(
            prompt,
            UndoPrompt {
                is_visible: true,
                message: "2 tasks deleted".into(),
                item_type: Some(Level::Task),
                count: 2,
            }
        );

        undo.delete(&mut tree, &ids(&["A1"]), t0());
        assert_eq!(undo.prompt().message, "1 child task deleted");
    }

    #[test]
    fn state_survives_serialization() {
        let mut tree = sample();
        let mut undo = UndoManager::default();
        undo.delete(&mut tree, &ids(&["B"]), t0());
        let json = serde_json::to_string(&undo).unwrap();
        let mut back: UndoManager = serde_json::from_str(&json).unwrap();
        assert_eq!(back, undo);
        assert_eq!(back.restore(&mut tree), 1);
    }

    #[test]
    fn restore_puts_back_rolled_up_statuses() {
        use crate::model::entity::{ProjectStatus, TaskStatus};
        use crate::ops::aggregate::aggregate;

        let mut tree = sample();
        tree[0].subtasks.truncate(1);
        let a = &mut tree[0].subtasks[0];
        a.status = TaskStatus::Stuck;
        a.child_subtasks[0].status = TaskStatus::Done;
        let mut a2 = ChildTask::new("A2".into(), "A2".into(), Category::Design, "A".into());
        a2.status = TaskStatus::Working;
        a.child_subtasks.push(a2);
        aggregate(&mut tree);
        let before = tree.clone();

        let mut undo = UndoManager::default();
        undo.delete(&mut tree, &ids(&["A2"]), t0());
        assert_eq!(
            undo.batch().unwrap().ancestors,
            vec![
                AncestorStatus::Task { id: "A".into(), status: TaskStatus::Stuck },
                AncestorStatus::Project { id: "P".into(), status: ProjectStatus::Pending },
            ]
        );
        aggregate(&mut tree);
        assert_eq!(tree[0].subtasks[0].status, TaskStatus::Done);
        assert_eq!(tree[0].status, ProjectStatus::Done);

        undo.restore(&mut tree);
        aggregate(&mut tree);
        assert_eq!(tree, before);
    }

    #[test]
    fn oversized_window_is_clamped() {
        let mut tree = sample();
        let mut undo = UndoManager::new(std::time::Duration::from_secs(u64::MAX));
        undo.delete(&mut tree, &ids(&["B"]), t0());
        let batch = undo.batch().unwrap();
        assert_eq!(batch.remaining_ms, MAX_WINDOW_MS);
        assert_eq!(batch.deadline, Some(t0() + Duration::milliseconds(MAX_WINDOW_MS)));

        undo.pause(secs(1));
        undo.resume(DateTime::<Utc>::MAX_UTC);
        assert_eq!(undo.batch().unwrap().deadline, Some(DateTime::<Utc>::MAX_UTC));
        assert!(!undo.tick(secs(2)));
    }
}
