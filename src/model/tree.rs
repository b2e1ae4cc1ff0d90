//! Addressing and traversal over the three-level project tree.
//!
//! The tree is a plain `[Project]`; entities are addressed either by their
//! opaque id or by a [`Locator`] (index path). Locators are only valid until
//! the next structural mutation, so long-lived references (undo batches,
//! clipboard records) hold ids and re-locate on use.

use super::entity::{Category, EntityBase, Level};
use super::project::Project;
use super::task::{ChildTask, Task};

/// Index path to an entity inside the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Locator {
    pub project: usize,
    pub task: Option<usize>,
    pub child: Option<usize>,
}

impl Locator {
    pub fn project(project: usize) -> Self {
        Locator { project, task: None, child: None }
    }

    pub fn task(project: usize, task: usize) -> Self {
        Locator { project, task: Some(task), child: None }
    }

    pub fn child(project: usize, task: usize, child: usize) -> Self {
        Locator { project, task: Some(task), child: Some(child) }
    }

    pub fn level(&self) -> Level {
        match (self.task, self.child) {
            (None, _) => Level::Project,
            (Some(_), None) => Level::Task,
            (Some(_), Some(_)) => Level::ChildTask,
        }
    }

    /// Locator of the owning entity, if any
    pub fn parent(&self) -> Option<Locator> {
        match (self.task, self.child) {
            (None, _) => None,
            (Some(_), None) => Some(Locator::project(self.project)),
            (Some(t), Some(_)) => Some(Locator::task(self.project, t)),
        }
    }
}

/// Borrowed view of an entity at any level
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    Project(&'a Project),
    Task(&'a Task),
    ChildTask(&'a ChildTask),
}

impl<'a> EntityRef<'a> {
    pub fn base(&self) -> &'a EntityBase {
        match self {
            EntityRef::Project(p) => &p.base,
            EntityRef::Task(t) => &t.base,
            EntityRef::ChildTask(c) => &c.base,
        }
    }

    pub fn level(&self) -> Level {
        match self {
            EntityRef::Project(_) => Level::Project,
            EntityRef::Task(_) => Level::Task,
            EntityRef::ChildTask(_) => Level::ChildTask,
        }
    }

    /// Category, for the levels that carry one
    pub fn category(&self) -> Option<Category> {
        match self {
            EntityRef::Project(_) => None,
            EntityRef::Task(t) => Some(t.category),
            EntityRef::ChildTask(c) => Some(c.category),
        }
    }
}

/// Mutable view of an entity at any level
#[derive(Debug)]
pub enum EntityMut<'a> {
    Project(&'a mut Project),
    Task(&'a mut Task),
    ChildTask(&'a mut ChildTask),
}

impl EntityMut<'_> {
    pub fn base(&self) -> &EntityBase {
        match self {
            EntityMut::Project(p) => &p.base,
            EntityMut::Task(t) => &t.base,
            EntityMut::ChildTask(c) => &c.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut EntityBase {
        match self {
            EntityMut::Project(p) => &mut p.base,
            EntityMut::Task(t) => &mut t.base,
            EntityMut::ChildTask(c) => &mut c.base,
        }
    }

    pub fn level(&self) -> Level {
        match self {
            EntityMut::Project(_) => Level::Project,
            EntityMut::Task(_) => Level::Task,
            EntityMut::ChildTask(_) => Level::ChildTask,
        }
    }
}

/// Find the locator of the entity with `id`, searching all levels
pub fn locate(projects: &[Project], id: &str) -> Option<Locator> {
    for (pi, project) in projects.iter().enumerate() {
        if project.base.id == id {
            return Some(Locator::project(pi));
        }
        for (ti, task) in project.subtasks.iter().enumerate() {
            if task.base.id == id {
                return Some(Locator::task(pi, ti));
            }
            for (ci, child) in task.child_subtasks.iter().enumerate() {
                if child.base.id == id {
                    return Some(Locator::child(pi, ti, ci));
                }
            }
        }
    }
    None
}

pub fn entity_at(projects: &[Project], loc: Locator) -> Option<EntityRef<'_>> {
    let project = projects.get(loc.project)?;
    let Some(ti) = loc.task else {
        return Some(EntityRef::Project(project));
    };
    let task = project.subtasks.get(ti)?;
    match loc.child {
        None => Some(EntityRef::Task(task)),
        Some(ci) => task.child_subtasks.get(ci).map(EntityRef::ChildTask),
    }
}

pub fn entity_at_mut(projects: &mut [Project], loc: Locator) -> Option<EntityMut<'_>> {
    let project = projects.get_mut(loc.project)?;
    let Some(ti) = loc.task else {
        return Some(EntityMut::Project(project));
    };
    let task = project.subtasks.get_mut(ti)?;
    match loc.child {
        None => Some(EntityMut::Task(task)),
        Some(ci) => task.child_subtasks.get_mut(ci).map(EntityMut::ChildTask),
    }
}

/// Find an entity by id anywhere in the tree
pub fn find_entity<'a>(projects: &'a [Project], id: &str) -> Option<EntityRef<'a>> {
    locate(projects, id).and_then(|loc| entity_at(projects, loc))
}

/// Find an entity by id anywhere in the tree, mutably
pub fn find_entity_mut<'a>(projects: &'a mut [Project], id: &str) -> Option<EntityMut<'a>> {
    let loc = locate(projects, id)?;
    entity_at_mut(projects, loc)
}

/// All entity locators in tree-walk order (project, its tasks, each task's children)
pub fn walk(projects: &[Project]) -> Vec<Locator> {
    let mut out = Vec::new();
    for (pi, project) in projects.iter().enumerate() {
        out.push(Locator::project(pi));
        for (ti, task) in project.subtasks.iter().enumerate() {
            out.push(Locator::task(pi, ti));
            for ci in 0..task.child_subtasks.len() {
                out.push(Locator::child(pi, ti, ci));
            }
        }
    }
    out
}

/// Visit every entity in walk order
pub fn for_each_entity<'a>(projects: &'a [Project], f: &mut dyn FnMut(Locator, EntityRef<'a>)) {
    for (pi, project) in projects.iter().enumerate() {
        f(Locator::project(pi), EntityRef::Project(project));
        for (ti, task) in project.subtasks.iter().enumerate() {
            f(Locator::task(pi, ti), EntityRef::Task(task));
            for (ci, child) in task.child_subtasks.iter().enumerate() {
                f(Locator::child(pi, ti, ci), EntityRef::ChildTask(child));
            }
        }
    }
}

/// Whether the entity or any of its owners is soft-deleted
pub fn is_hidden(projects: &[Project], loc: Locator) -> bool {
    let mut cursor = Some(loc);
    while let Some(l) = cursor {
        match entity_at(projects, l) {
            Some(e) if e.base().is_deleted => return true,
            Some(_) => cursor = l.parent(),
            None => return true,
        }
    }
    false
}

/// The active-view projection: the tree with every soft-deleted entity
/// (and everything it owns) removed.
pub fn active_view(projects: &[Project]) -> Vec<Project> {
    projects
        .iter()
        .filter(|p| !p.base.is_deleted)
        .map(|p| {
            let mut p = p.clone();
            p.subtasks.retain(|t| !t.base.is_deleted);
            for task in &mut p.subtasks {
                task.child_subtasks.retain(|c| !c.base.is_deleted);
            }
            p
        })
        .collect()
}

/// Reference number of the entity owning `loc`, if any
pub fn parent_reference(projects: &[Project], loc: Locator) -> Option<&str> {
    let parent = loc.parent()?;
    entity_at(projects, parent).map(|e| e.base().reference_number.as_str())
}

/// Reference numbers of the same-level siblings of `loc` (excluding itself)
pub fn sibling_references(projects: &[Project], loc: Locator) -> Vec<String> {
    let Some(project) = projects.get(loc.project) else {
        return Vec::new();
    };
    match (loc.task, loc.child) {
        (None, _) => projects
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != loc.project)
            .map(|(_, p)| p.base.reference_number.clone())
            .collect(),
        (Some(ti), None) => project
            .subtasks
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != ti)
            .map(|(_, t)| t.base.reference_number.clone())
            .collect(),
        (Some(ti), Some(ci)) => project
            .subtasks
            .get(ti)
            .map(|task| {
                task.child_subtasks
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != ci)
                    .map(|(_, c)| c.base.reference_number.clone())
                    .collect()
            })
            .unwrap_or_default(),
    }
}
