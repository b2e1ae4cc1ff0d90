//! Copy/paste of mixed selections with regenerated identities.
//!
//! A [`Clipboard`] is a by-value snapshot of selected projects, tasks and
//! child tasks. Pasting mints fresh ids and reference numbers for every
//! clone, so a clipboard is single-use: it is cleared after a successful
//! paste.
//!
//! Pasting takes `&mut self`, so one clipboard cannot be replayed twice at
//! once. Separate `pb` processes sharing a board are kept apart by the
//! `.paste.lock` guard in the paste command.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::entity::new_id;
use crate::model::project::Project;
use crate::model::task::{ChildTask, Task};
use crate::model::tree::{self, EntityRef};
use crate::ops::refnum::{self, ReferenceAllocator};
use crate::ops::tree_ops::normalize_predecessors;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PasteError {
    #[error("nothing to paste")]
    NothingToPaste,
    #[error("target project required to paste tasks")]
    TargetRequired,
    #[error("target project not found: {0}")]
    TargetNotFound(String),
    /// Another process holds the board's paste guard
    #[error("a paste is already in progress")]
    InProgress,
}

/// A copied task and the project it was copied from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClippedTask {
    pub project_id: String,
    pub task: Task,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Clipboard {
    #[serde(default)]
    projects: Vec<Project>,
    #[serde(default)]
    tasks: Vec<ClippedTask>,
    /// `parent_id` on each entry is the task it was copied from
    #[serde(default)]
    child_tasks: Vec<ChildTask>,
}

/// Ids minted by a paste
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PasteOutcome {
    pub projects: Vec<String>,
    pub tasks: Vec<String>,
    pub child_tasks: Vec<String>,
    /// Original ids of child tasks that found no parent to land under
    pub dropped: Vec<String>,
}

impl Clipboard {
    /// Snapshot the selection. Ids are deduplicated per category; unknown,
    /// soft-deleted or wrong-level ids are ignored. Soft-deleted descendants
    /// are left out of the snapshot.
    pub fn copy(
        projects: &[Project],
        project_ids: &[String],
        task_ids: &[String],
        child_ids: &[String],
    ) -> Clipboard {
        let mut clip = Clipboard::default();

        for id in dedup(project_ids) {
            match tree::find_entity(projects, id) {
                Some(EntityRef::Project(p)) if !p.base.is_deleted => {
                    clip.projects.push(strip_deleted_project(p));
                }
                _ => tracing::debug!(id, "copy: not a live project"),
            }
        }
        for id in dedup(task_ids) {
            let found = tree::locate(projects, id).and_then(|loc| {
                match tree::entity_at(projects, loc) {
                    Some(EntityRef::Task(t)) if !t.base.is_deleted => {
                        Some((projects[loc.project].base.id.clone(), strip_deleted_task(t)))
                    }
                    _ => None,
                }
            });
            match found {
                Some((project_id, task)) => clip.tasks.push(ClippedTask { project_id, task }),
                None => tracing::debug!(id, "copy: not a live task"),
            }
        }
        for id in dedup(child_ids) {
            let found = tree::locate(projects, id).and_then(|loc| {
                let ti = loc.task?;
                match tree::entity_at(projects, loc) {
                    Some(EntityRef::ChildTask(c)) if !c.base.is_deleted => {
                        let mut c = c.clone();
                        c.parent_id = projects[loc.project].subtasks[ti].base.id.clone();
                        Some(c)
                    }
                    _ => None,
                }
            });
            match found {
                Some(child) => clip.child_tasks.push(child),
                None => tracing::debug!(id, "copy: not a live child task"),
            }
        }
        clip
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty() && self.tasks.is_empty() && self.child_tasks.is_empty()
    }

    /// (projects, tasks, child tasks) held
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.projects.len(), self.tasks.len(), self.child_tasks.len())
    }

    pub fn clear(&mut self) {
        self.projects.clear();
        self.tasks.clear();
        self.child_tasks.clear();
    }

    /// Replay the clipboard into `projects`.
    ///
    /// With projects on the clipboard, every project is cloned and the
    /// clones are prepended; `target` is ignored. Otherwise the tasks and
    /// child tasks are cloned into the `target` project.
    pub fn paste(
        &mut self,
        projects: &mut Vec<Project>,
        target: Option<&str>,
        allocator: &mut ReferenceAllocator,
        name_suffix: &str,
    ) -> Result<PasteOutcome, PasteError> {
        if self.is_empty() {
            return Err(PasteError::NothingToPaste);
        }
        let result = if self.projects.is_empty() {
            self.paste_into_target(projects, target, allocator, name_suffix)
        } else {
            Ok(self.paste_projects(projects, allocator, name_suffix))
        };
        if result.is_ok() {
            self.clear();
        }
        result
    }

    fn paste_projects(
        &self,
        projects: &mut Vec<Project>,
        allocator: &mut ReferenceAllocator,
        suffix: &str,
    ) -> PasteOutcome {
        let mut outcome = PasteOutcome::default();
        let mut ids = IdMap::default();
        let mut taken: Vec<String> = projects
            .iter()
            .map(|p| p.base.reference_number.clone())
            .collect();

        let mut clones = Vec::with_capacity(self.projects.len());
        for original in &self.projects {
            let mut clone = original.clone();
            clone.base.id = ids.mint(&original.base.id);
            clone.base.reference_number =
                refnum::copy_reference(&original.base.reference_number, &taken);
            taken.push(clone.base.reference_number.clone());
            clone.base.name.push_str(suffix);
            clone.subtasks.clear();
            for task in &original.subtasks {
                let t = clone_task(task, &clone, allocator, &mut ids, "");
                outcome.tasks.push(t.base.id.clone());
                clone.subtasks.push(t);
            }
            outcome.projects.push(clone.base.id.clone());
            clones.push(clone);
        }

        // Loose tasks land in the front-most clone unless already copied
        // as part of one of the projects.
        for clipped in &self.tasks {
            if ids.contains(&clipped.task.base.id) {
                continue;
            }
            let front = &mut clones[0];
            let t = clone_task(&clipped.task, front, allocator, &mut ids, suffix);
            outcome.tasks.push(t.base.id.clone());
            front.subtasks.push(t);
        }

        for child in &self.child_tasks {
            if ids.contains(&child.base.id) {
                continue;
            }
            let home = ids.get(&child.parent_id).and_then(|new_parent| {
                clones
                    .iter_mut()
                    .flat_map(|p| p.subtasks.iter_mut())
                    .find(|t| t.base.id == new_parent)
            });
            match home {
                Some(task) => {
                    let c = clone_child(child, task, allocator, &mut ids, suffix);
                    outcome.child_tasks.push(c.base.id.clone());
                    task.child_subtasks.push(c);
                }
                None => {
                    tracing::warn!(id = %child.base.id, parent = %child.parent_id, "paste: no parent task for child; dropped");
                    outcome.dropped.push(child.base.id.clone());
                }
            }
        }

        for clone in &mut clones {
            remap_project(clone, &ids);
        }
        projects.splice(0..0, clones);
        outcome
    }

    fn paste_into_target(
        &self,
        projects: &mut [Project],
        target: Option<&str>,
        allocator: &mut ReferenceAllocator,
        suffix: &str,
    ) -> Result<PasteOutcome, PasteError> {
        let target = target.ok_or(PasteError::TargetRequired)?;
        let project = projects
            .iter_mut()
            .find(|p| p.base.id == target && !p.base.is_deleted)
            .ok_or_else(|| PasteError::TargetNotFound(target.to_string()))?;

        let mut outcome = PasteOutcome::default();
        let mut ids = IdMap::default();
        let first_new = project.subtasks.len();

        for clipped in &self.tasks {
            let t = clone_task(&clipped.task, project, allocator, &mut ids, suffix);
            outcome.tasks.push(t.base.id.clone());
            project.subtasks.push(t);
        }

        let copied_tasks: HashSet<&str> =
            self.tasks.iter().map(|c| c.task.base.id.as_str()).collect();
        for child in &self.child_tasks {
            let home = project.subtasks[..first_new]
                .iter()
                .position(|t| t.base.id == child.parent_id && !t.base.is_deleted);
            match home {
                Some(ti) => {
                    let c = clone_child(child, &project.subtasks[ti], allocator, &mut ids, suffix);
                    outcome.child_tasks.push(c.base.id.clone());
                    project.subtasks[ti].child_subtasks.push(c);
                }
                // Its parent's clone already carries a copy
                None if copied_tasks.contains(child.parent_id.as_str()) => {}
                None => {
                    tracing::warn!(id = %child.base.id, parent = %child.parent_id, project = target, "paste: parent task not in target; dropped");
                    outcome.dropped.push(child.base.id.clone());
                }
            }
        }

        for task in &mut project.subtasks[first_new..] {
            remap_task(task, &ids);
        }
        for task in &mut project.subtasks[..first_new] {
            for child in &mut task.child_subtasks {
                if ids.is_minted(&child.base.id) {
                    remap_base(&mut child.base.predecessors, &ids);
                }
            }
        }
        Ok(outcome)
    }
}

/// Original id → clone id for one paste
#[derive(Debug, Default)]
struct IdMap {
    forward: HashMap<String, String>,
    minted: HashSet<String>,
}

impl IdMap {
    fn mint(&mut self, original: &str) -> String {
        let id = new_id();
        self.forward.insert(original.to_string(), id.clone());
        self.minted.insert(id.clone());
        id
    }

    fn get(&self, original: &str) -> Option<&str> {
        self.forward.get(original).map(String::as_str)
    }

    fn contains(&self, original: &str) -> bool {
        self.forward.contains_key(original)
    }

    fn is_minted(&self, id: &str) -> bool {
        self.minted.contains(id)
    }
}

fn dedup(ids: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(String::as_str)
        .filter(|id| seen.insert(*id))
        .collect()
}

fn strip_deleted_task(task: &Task) -> Task {
    let mut t = task.clone();
    t.child_subtasks.retain(|c| !c.base.is_deleted);
    t
}

fn strip_deleted_project(project: &Project) -> Project {
    let mut p = project.clone();
    p.subtasks.retain(|t| !t.base.is_deleted);
    for t in &mut p.subtasks {
        t.child_subtasks.retain(|c| !c.base.is_deleted);
    }
    p
}

/// Clone `task` (and its children) for placement under `owner`
fn clone_task(
    task: &Task,
    owner: &Project,
    allocator: &mut ReferenceAllocator,
    ids: &mut IdMap,
    suffix: &str,
) -> Task {
    let siblings: Vec<String> = owner
        .subtasks
        .iter()
        .map(|t| t.base.reference_number.clone())
        .collect();
    let mut clone = task.clone();
    clone.base.id = ids.mint(&task.base.id);
    clone.base.reference_number =
        allocator.allocate(&owner.base.reference_number, task.category, &siblings);
    clone.base.name.push_str(suffix);
    clone.base.clear_deleted();
    clone.child_subtasks.clear();
    for child in &task.child_subtasks {
        let c = clone_child(child, &clone, allocator, ids, "");
        clone.child_subtasks.push(c);
    }
    clone
}

/// Clone `child` for placement under `owner`
fn clone_child(
    child: &ChildTask,
    owner: &Task,
    allocator: &mut ReferenceAllocator,
    ids: &mut IdMap,
    suffix: &str,
) -> ChildTask {
    let siblings: Vec<String> = owner
        .child_subtasks
        .iter()
        .map(|c| c.base.reference_number.clone())
        .collect();
    let mut clone = child.clone();
    clone.base.id = ids.mint(&child.base.id);
    clone.base.reference_number =
        allocator.allocate(&owner.base.reference_number, child.category, &siblings);
    clone.base.name.push_str(suffix);
    clone.base.clear_deleted();
    clone.parent_id = owner.base.id.clone();
    clone
}

fn remap_project(project: &mut Project, ids: &IdMap) {
    remap_base(&mut project.base.predecessors, ids);
    for task in &mut project.subtasks {
        remap_task(task, ids);
    }
}

fn remap_task(task: &mut Task, ids: &IdMap) {
    remap_base(&mut task.base.predecessors, ids);
    for child in &mut task.child_subtasks {
        remap_base(&mut child.base.predecessors, ids);
    }
}

/// Point predecessor ids that were copied in this paste at their clones
fn remap_base(predecessors: &mut String, ids: &IdMap) {
    if predecessors.is_empty() {
        return;
    }
    let remapped: Vec<&str> = crate::model::entity::parse_predecessors(predecessors.as_str())
        .into_iter()
        .map(|id| ids.get(id).unwrap_or(id))
        .collect();
    *predecessors = normalize_predecessors(&remapped.join(","));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::Category;
    use pretty_assertions::assert_eq;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn sample() -> Vec<Project> {
        let mut p = Project::new("P".into(), "PRJ-1".into(), "Alpha".into());
        let mut a = Task::new("A".into(), "Design".into(), Category::Design);
        a.base.reference_number = "PRJ-1.DES-01".into();
        let mut a1 = ChildTask::new("A1".into(), "Sketch".into(), Category::Design, "A".into());
        a1.base.reference_number = "PRJ-1.DES-01.DES-01".into();
        a.child_subtasks.push(a1);
        let mut b = Task::new("B".into(), "Build".into(), Category::Development);
        b.base.reference_number = "PRJ-1.DEV-01".into();
        b.base.predecessors = "A".into();
        p.subtasks.push(a);
        p.subtasks.push(b);
        let q = Project::new("Q".into(), "PRJ-2".into(), "Beta".into());
        vec![p, q]
    }

    fn all_ids(tree: &[Project]) -> Vec<String> {
        let mut out = Vec::new();
        tree::for_each_entity(tree, &mut |_, e| out.push(e.base().id.clone()));
        out
    }

    #[test]
    fn project_paste_prepends_clone_with_fresh_ids() {
        let mut tree = sample();
        let original = tree[0].clone();
        let mut alloc = ReferenceAllocator::from_tree(&tree);
        let mut clip = Clipboard::copy(&tree, &ids(&["P", "P"]), &[], &[]);
        assert_eq!(clip.counts(), (1, 0, 0));

        let outcome = clip.paste(&mut tree, Some("Q"), &mut alloc, " (Copy)").unwrap();
        assert_eq!(tree.len(), 3);
        let clone = &tree[0];
        assert_eq!(outcome.projects, vec![clone.base.id.clone()]);
        assert_ne!(clone.base.id, "P");
        assert_eq!(clone.base.name, "Alpha (Copy)");
        assert_eq!(clone.base.reference_number, "PRJ-1-COPY");
        assert_eq!(tree[1], original);

        let clone_ids: Vec<&str> = clone.subtasks.iter().map(|t| t.base.id.as_str()).collect();
        assert_eq!(clone_ids.len(), 2);
        assert_ne!(clone_ids[0], clone_ids[1]);
        assert!(!clone_ids.contains(&"A") && !clone_ids.contains(&"B"));
        assert_eq!(clone.subtasks[0].base.reference_number, "PRJ-1-COPY.DES-01");
        assert_eq!(clone.subtasks[0].child_subtasks[0].parent_id, clone_ids[0]);
        // predecessor inside the copy follows the copy
        assert_eq!(clone.subtasks[1].base.predecessors, clone_ids[0]);
        assert!(clip.is_empty());
    }

    #[test]
    fn every_id_is_unique_after_paste() {
        let mut tree = sample();
        let mut alloc = ReferenceAllocator::from_tree(&tree);
        let mut clip = Clipboard::copy(&tree, &ids(&["P"]), &[], &[]);
        clip.paste(&mut tree, None, &mut alloc, " (Copy)").unwrap();
        let all = all_ids(&tree);
        let unique: HashSet<&String> = all.iter().collect();
        assert_eq!(all.len(), unique.len());
    }

    #[test]
    fn task_paste_requires_target() {
        let mut tree = sample();
        let before = tree.clone();
        let mut alloc = ReferenceAllocator::from_tree(&tree);
        let mut clip = Clipboard::copy(&tree, &[], &ids(&["B"]), &[]);
        assert_eq!(
            clip.paste(&mut tree, None, &mut alloc, " (Copy)"),
            Err(PasteError::TargetRequired)
        );
        assert_eq!(tree, before);
        assert!(!clip.is_empty(), "failed paste keeps the clipboard");
        assert_eq!(
            clip.paste(&mut tree, Some("nope"), &mut alloc, " (Copy)"),
            Err(PasteError::TargetNotFound("nope".into()))
        );
    }

    #[test]
    fn task_paste_appends_to_target() {
        let mut tree = sample();
        let mut alloc = ReferenceAllocator::from_tree(&tree);
        let mut clip = Clipboard::copy(&tree, &[], &ids(&["A"]), &[]);
        let outcome = clip.paste(&mut tree, Some("Q"), &mut alloc, " (Copy)").unwrap();
        let pasted = &tree[1].subtasks[0];
        assert_eq!(outcome.tasks, vec![pasted.base.id.clone()]);
        assert_eq!(pasted.base.name, "Design (Copy)");
        assert_eq!(pasted.base.reference_number, "PRJ-2.DES-01");
        assert_eq!(pasted.child_subtasks.len(), 1);
        assert_ne!(pasted.child_subtasks[0].base.id, "A1");
        assert_eq!(pasted.child_subtasks[0].parent_id, pasted.base.id);
    }

    #[test]
    fn child_paste_lands_under_original_parent_in_target() {
        let mut tree = sample();
        let mut alloc = ReferenceAllocator::from_tree(&tree);
        let mut clip = Clipboard::copy(&tree, &[], &[], &ids(&["A1"]));
        let outcome = clip.paste(&mut tree, Some("P"), &mut alloc, " (Copy)").unwrap();
        let children = &tree[0].subtasks[0].child_subtasks;
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].base.name, "Sketch (Copy)");
        assert_eq!(children[1].base.reference_number, "PRJ-1.DES-01.DES-02");
        assert_eq!(outcome.child_tasks.len(), 1);
    }

    #[test]
    fn child_without_parent_in_target_is_dropped() {
        let mut tree = sample();
        let mut alloc = ReferenceAllocator::from_tree(&tree);
        let mut clip = Clipboard::copy(&tree, &[], &[], &ids(&["A1"]));
        let outcome = clip.paste(&mut tree, Some("Q"), &mut alloc, " (Copy)").unwrap();
        assert_eq!(outcome.dropped, ids(&["A1"]));
        assert!(tree[1].subtasks.is_empty());
        assert!(clip.is_empty());
    }

    #[test]
    fn empty_clipboard_reports_nothing_to_paste() {
        let mut tree = sample();
        let mut alloc = ReferenceAllocator::new();
        let mut clip = Clipboard::default();
        assert_eq!(
            clip.paste(&mut tree, Some("P"), &mut alloc, ""),
            Err(PasteError::NothingToPaste)
        );
    }

    #[test]
    fn second_paste_after_success_is_nothing() {
        let mut tree = sample();
        let mut alloc = ReferenceAllocator::from_tree(&tree);
        let mut clip = Clipboard::copy(&tree, &[], &ids(&["B"]), &[]);
        clip.paste(&mut tree, Some("Q"), &mut alloc, "").unwrap();
        assert_eq!(
            clip.paste(&mut tree, Some("Q"), &mut alloc, ""),
            Err(PasteError::NothingToPaste)
        );
        assert_eq!(tree[1].subtasks.len(), 1);
    }

    #[test]
    fn child_copied_with_its_parent_also_lands_under_the_original() {
        let mut tree = sample();
        let mut alloc = ReferenceAllocator::from_tree(&tree);
        let mut clip = Clipboard::copy(&tree, &[], &ids(&["A"]), &ids(&["A1"]));
        assert_eq!(clip.counts(), (0, 1, 1));

        let outcome = clip.paste(&mut tree, Some("P"), &mut alloc, " (Copy)").unwrap();
        assert!(outcome.dropped.is_empty());
        assert_eq!(outcome.child_tasks.len(), 1);

        let original = &tree[0].subtasks[0];
        assert_eq!(original.base.id, "A");
        assert_eq!(original.child_subtasks.len(), 2);
        assert_eq!(original.child_subtasks[1].base.name, "Sketch (Copy)");
        assert_eq!(original.child_subtasks[1].parent_id, "A");

        let clone = &tree[0].subtasks[2];
        assert_eq!(clone.base.name, "Design (Copy)");
        assert_eq!(clone.child_subtasks.len(), 1);
        assert_eq!(clone.child_subtasks[0].parent_id, clone.base.id);
    }

    #[test]
    fn child_copied_with_its_parent_rides_the_clone_elsewhere() {
        let mut tree = sample();
        let mut alloc = ReferenceAllocator::from_tree(&tree);
        let mut clip = Clipboard::copy(&tree, &[], &ids(&["A"]), &ids(&["A1"]));
        let outcome = clip.paste(&mut tree, Some("Q"), &mut alloc, "").unwrap();
        assert!(outcome.dropped.is_empty());
        assert!(outcome.child_tasks.is_empty());
        assert_eq!(tree[1].subtasks.len(), 1);
        assert_eq!(tree[1].subtasks[0].child_subtasks.len(), 1);
    }

    #[test]
    fn copy_skips_deleted_and_wrong_levels() {
        let mut tree = sample();
        tree[0].subtasks[0].child_subtasks[0].base.is_deleted = true;
        let clip = Clipboard::copy(&tree, &ids(&["A"]), &ids(&["A", "P"]), &ids(&["A1"]));
        assert_eq!(clip.counts(), (0, 1, 0));
        assert!(clip.tasks[0].task.child_subtasks.is_empty());
        assert_eq!(clip.tasks[0].project_id, "P");
    }

    #[test]
    fn loose_tasks_join_front_clone_in_project_mode() {
        let mut tree = sample();
        let mut alloc = ReferenceAllocator::from_tree(&tree);
        let mut clip = Clipboard::copy(&tree, &ids(&["Q"]), &ids(&["B"]), &[]);
        let outcome = clip.paste(&mut tree, None, &mut alloc, " (Copy)").unwrap();
        assert_eq!(outcome.projects.len(), 1);
        assert_eq!(tree[0].base.name, "Beta (Copy)");
        assert_eq!(tree[0].subtasks.len(), 1);
        assert_eq!(tree[0].subtasks[0].base.name, "Build (Copy)");
        // predecessor outside the copied set stays pointed at the original
        assert_eq!(tree[0].subtasks[0].base.predecessors, "A");
    }
}
