use chrono::{DateTime, NaiveDate, Utc};

use crate::model::entity::{
    Category, EntityBase, Level, ProjectStatus, TaskStatus, Timeline, new_id,
};
use crate::model::project::Project;
use crate::model::task::{ChildTask, Task};
use crate::model::tree::{self, EntityMut, Locator};
use crate::ops::refnum::{self, ReferenceAllocator};

/// Error type for tree store operations. Every variant is raised before the
/// tree is touched.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("reference number is required")]
    MissingReference,
    #[error("reference number already in use: {0}")]
    DuplicateReference(String),
    #[error("reference number {0} is reserved for unnumbered tasks")]
    ReservedReference(String),
    #[error("cannot add below a child task: maximum depth (3) reached")]
    MaxDepthReached,
    #[error("field `{field}` does not apply to a {level}")]
    FieldNotApplicable { field: &'static str, level: Level },
    #[error("invalid value for `{field}`: {value}")]
    InvalidValue { field: String, value: String },
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("invalid position: {0}")]
    InvalidPosition(String),
    #[error("{0} is not deleted; only deleted items can be purged")]
    NotDeleted(String),
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

/// Add a project at the end of the tree. Returns its id.
pub fn add_project(
    projects: &mut Vec<Project>,
    reference_number: &str,
    name: String,
) -> Result<String, TreeError> {
    let reference_number = reference_number.trim();
    if reference_number.is_empty() {
        return Err(TreeError::MissingReference);
    }
    if refnum::is_reserved_project_reference(reference_number) {
        return Err(TreeError::ReservedReference(reference_number.to_string()));
    }
    if projects
        .iter()
        .any(|p| p.base.reference_number == reference_number)
    {
        return Err(TreeError::DuplicateReference(reference_number.to_string()));
    }
    let id = new_id();
    projects.push(Project::new(id.clone(), reference_number.to_string(), name));
    Ok(id)
}

/// Add a task to the project `project_id`. Returns its id.
pub fn add_task(
    projects: &mut [Project],
    project_id: &str,
    name: String,
    category: Category,
    allocator: &mut ReferenceAllocator,
) -> Result<String, TreeError> {
    let project = projects
        .iter_mut()
        .find(|p| p.base.id == project_id)
        .ok_or_else(|| TreeError::NotFound(project_id.to_string()))?;

    let siblings: Vec<String> = project
        .subtasks
        .iter()
        .map(|t| t.base.reference_number.clone())
        .collect();
    let id = new_id();
    let mut task = Task::new(id.clone(), name, category);
    task.base.reference_number =
        allocator.allocate(&project.base.reference_number, category, &siblings);
    project.subtasks.push(task);
    Ok(id)
}

/// Add a child task under the task `task_id`. Returns its id.
pub fn add_child(
    projects: &mut [Project],
    task_id: &str,
    name: String,
    category: Category,
    allocator: &mut ReferenceAllocator,
) -> Result<String, TreeError> {
    let loc = tree::locate(projects, task_id)
        .ok_or_else(|| TreeError::NotFound(task_id.to_string()))?;
    let task = match tree::entity_at_mut(projects, loc) {
        Some(EntityMut::Task(task)) => task,
        Some(EntityMut::ChildTask(_)) => return Err(TreeError::MaxDepthReached),
        _ => return Err(TreeError::NotFound(task_id.to_string())),
    };

    let siblings: Vec<String> = task
        .child_subtasks
        .iter()
        .map(|c| c.base.reference_number.clone())
        .collect();
    let id = new_id();
    let mut child = ChildTask::new(id.clone(), name, category, task.base.id.clone());
    child.base.reference_number =
        allocator.allocate(&task.base.reference_number, category, &siblings);
    task.child_subtasks.push(child);
    Ok(id)
}

// ---------------------------------------------------------------------------
// Field edits
// ---------------------------------------------------------------------------

/// A single-field edit. Every user edit goes through [`edit_field`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEdit {
    Name(String),
    ReferenceNumber(String),
    Category(Category),
    Timeline(Timeline),
    Start(Option<NaiveDate>),
    End(Option<NaiveDate>),
    PlanDays(u32),
    Predecessors(String),
    ProjectStatus(ProjectStatus),
    TaskStatus(TaskStatus),
    Pinned(bool),
}

impl FieldEdit {
    /// The field name as used on the command line
    pub fn field_name(&self) -> &'static str {
        match self {
            FieldEdit::Name(_) => "name",
            FieldEdit::ReferenceNumber(_) => "ref",
            FieldEdit::Category(_) => "category",
            FieldEdit::Timeline(_) => "timeline",
            FieldEdit::Start(_) => "start",
            FieldEdit::End(_) => "end",
            FieldEdit::PlanDays(_) => "plan-days",
            FieldEdit::Predecessors(_) => "predecessors",
            FieldEdit::ProjectStatus(_) | FieldEdit::TaskStatus(_) => "status",
            FieldEdit::Pinned(_) => "pinned",
        }
    }

    /// Parse a `field value` pair for an entity at `level`.
    ///
    /// Dates are `YYYY-MM-DD`; `none` or an empty value clears a date.
    /// A timeline is `START..END`.
    pub fn parse(level: Level, field: &str, value: &str) -> Result<FieldEdit, TreeError> {
        let invalid = || TreeError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        };
        let edit = match field {
            "name" | "title" => FieldEdit::Name(value.to_string()),
            "ref" | "reference" | "reference-number" => {
                FieldEdit::ReferenceNumber(value.trim().to_string())
            }
            "category" => FieldEdit::Category(Category::parse(value).ok_or_else(invalid)?),
            "start" => FieldEdit::Start(parse_optional_date(value).ok_or_else(invalid)?),
            "end" => FieldEdit::End(parse_optional_date(value).ok_or_else(invalid)?),
            "timeline" => {
                let (start, end) = value.split_once("..").ok_or_else(invalid)?;
                FieldEdit::Timeline(Timeline::new(
                    parse_optional_date(start).ok_or_else(invalid)?,
                    parse_optional_date(end).ok_or_else(invalid)?,
                ))
            }
            "plan-days" | "plan_days" | "days" => {
                FieldEdit::PlanDays(value.trim().parse().map_err(|_| invalid())?)
            }
            "predecessors" | "deps" => FieldEdit::Predecessors(normalize_predecessors(value)),
            "status" => match level {
                Level::Project => {
                    FieldEdit::ProjectStatus(ProjectStatus::parse(value).ok_or_else(invalid)?)
                }
                _ => FieldEdit::TaskStatus(TaskStatus::parse(value).ok_or_else(invalid)?),
            },
            "pinned" => FieldEdit::Pinned(match value.trim() {
                "true" | "yes" | "1" => true,
                "false" | "no" | "0" => false,
                _ => return Err(invalid()),
            }),
            other => return Err(TreeError::UnknownField(other.to_string())),
        };
        Ok(edit)
    }

    /// Whether this edit changes scheduling inputs
    fn touches_schedule(&self) -> bool {
        matches!(
            self,
            FieldEdit::Timeline(_)
                | FieldEdit::Start(_)
                | FieldEdit::End(_)
                | FieldEdit::PlanDays(_)
                | FieldEdit::Predecessors(_)
        )
    }
}

/// Follow-up work an edit requires from the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditEffect {
    /// Full-tree reschedule
    pub reschedule: bool,
    /// Re-derive the edited entity's reference number (category change)
    pub rereference: bool,
    /// Replace placeholder numbers below the edited entity
    pub reconcile: bool,
    /// Re-run status/progress roll-up
    pub reaggregate: bool,
}

/// Apply one field edit to the entity `id`, anywhere in the tree.
pub fn edit_field(
    projects: &mut [Project],
    id: &str,
    edit: FieldEdit,
) -> Result<EditEffect, TreeError> {
    let loc = tree::locate(projects, id).ok_or_else(|| TreeError::NotFound(id.to_string()))?;
    let level = loc.level();
    validate_edit(projects, loc, &edit)?;

    let mut effect = EditEffect {
        reschedule: edit.touches_schedule(),
        ..EditEffect::default()
    };
    // Plan-days at the root only stores the value
    if level == Level::Project && matches!(edit, FieldEdit::PlanDays(_)) {
        effect.reschedule = false;
    }

    let Some(mut entity) = tree::entity_at_mut(projects, loc) else {
        return Err(TreeError::NotFound(id.to_string()));
    };
    match edit {
        FieldEdit::Name(name) => entity.base_mut().name = name,
        FieldEdit::ReferenceNumber(reference) => {
            entity.base_mut().reference_number = reference;
            effect.reconcile = level != Level::ChildTask;
        }
        FieldEdit::Category(category) => {
            let changed = match &mut entity {
                EntityMut::Task(t) => std::mem::replace(&mut t.category, category) != category,
                EntityMut::ChildTask(c) => std::mem::replace(&mut c.category, category) != category,
                EntityMut::Project(_) => false,
            };
            effect.rereference = changed;
        }
        FieldEdit::Timeline(timeline) => set_timeline(entity.base_mut(), timeline),
        FieldEdit::Start(start) => {
            let end = entity.base().timeline.end;
            set_timeline(entity.base_mut(), Timeline::new(start, end));
        }
        FieldEdit::End(end) => {
            let start = entity.base().timeline.start;
            set_timeline(entity.base_mut(), Timeline::new(start, end));
        }
        FieldEdit::PlanDays(days) => entity.base_mut().plan_days = days,
        FieldEdit::Predecessors(preds) => entity.base_mut().predecessors = preds,
        FieldEdit::ProjectStatus(status) => {
            if let EntityMut::Project(p) = &mut entity {
                p.status = status;
            }
            effect.reaggregate = true;
        }
        FieldEdit::TaskStatus(status) => {
            match &mut entity {
                EntityMut::Task(t) => t.status = status,
                EntityMut::ChildTask(c) => c.status = status,
                EntityMut::Project(_) => {}
            }
            effect.reaggregate = true;
        }
        FieldEdit::Pinned(pinned) => {
            if let EntityMut::Project(p) = &mut entity {
                p.pinned = pinned;
            }
        }
    }
    Ok(effect)
}

fn set_timeline(base: &mut EntityBase, timeline: Timeline) {
    base.timeline = timeline;
    base.sync_plan_days();
}

fn validate_edit(projects: &[Project], loc: Locator, edit: &FieldEdit) -> Result<(), TreeError> {
    let level = loc.level();
    let not_applicable = || TreeError::FieldNotApplicable {
        field: edit.field_name(),
        level,
    };
    match edit {
        FieldEdit::ReferenceNumber(reference) => {
            if reference.is_empty() {
                return Err(TreeError::MissingReference);
            }
            if level == Level::Project && refnum::is_reserved_project_reference(reference) {
                return Err(TreeError::ReservedReference(reference.clone()));
            }
            if tree::sibling_references(projects, loc)
                .iter()
                .any(|r| r == reference)
            {
                return Err(TreeError::DuplicateReference(reference.clone()));
            }
        }
        FieldEdit::Category(_) if level == Level::Project => return Err(not_applicable()),
        FieldEdit::Pinned(_) | FieldEdit::ProjectStatus(_) if level != Level::Project => {
            return Err(not_applicable());
        }
        FieldEdit::TaskStatus(_) if level == Level::Project => return Err(not_applicable()),
        FieldEdit::Timeline(t) => check_order(t.start, t.end)?,
        FieldEdit::Start(start) => {
            let current = current_timeline(projects, loc);
            check_order(*start, current.end)?;
        }
        FieldEdit::End(end) => {
            let current = current_timeline(projects, loc);
            check_order(current.start, *end)?;
        }
        _ => {}
    }
    Ok(())
}

fn current_timeline(projects: &[Project], loc: Locator) -> Timeline {
    tree::entity_at(projects, loc)
        .map(|e| e.base().timeline)
        .unwrap_or_default()
}

fn check_order(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), TreeError> {
    if let (Some(s), Some(e)) = (start, end)
        && e < s
    {
        return Err(TreeError::InvalidValue {
            field: "timeline".to_string(),
            value: format!("{}..{}", s, e),
        });
    }
    Ok(())
}

fn parse_optional_date(s: &str) -> Option<Option<NaiveDate>> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("none") {
        return Some(None);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(Some)
}

/// Canonical comma-joined form: trimmed, blanks and duplicates dropped
pub fn normalize_predecessors(raw: &str) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for id in crate::model::entity::parse_predecessors(raw) {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen.join(",")
}

// ---------------------------------------------------------------------------
// Soft delete / restore / purge
// ---------------------------------------------------------------------------

/// An entity marked deleted by [`soft_delete`]
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeletedRef {
    pub id: String,
    pub level: Level,
}

/// Mark every entity in `ids` deleted. Ids that are missing or already
/// deleted are skipped. Returns what was marked, in request order.
pub fn soft_delete(projects: &mut [Project], ids: &[String], now: DateTime<Utc>) -> Vec<DeletedRef> {
    let mut marked = Vec::new();
    for id in ids {
        if let Some(mut entity) = tree::find_entity_mut(projects, id) {
            if entity.base().is_deleted {
                continue;
            }
            let level = entity.level();
            entity.base_mut().mark_deleted(now);
            marked.push(DeletedRef {
                id: id.clone(),
                level,
            });
        }
    }
    marked
}

/// Clear the soft-delete marker on every entity in `ids`, wherever it now
/// lives. Returns how many were restored.
pub fn restore(projects: &mut [Project], ids: &[String]) -> usize {
    let mut restored = 0;
    for id in ids {
        if let Some(mut entity) = tree::find_entity_mut(projects, id)
            && entity.base().is_deleted
        {
            entity.base_mut().clear_deleted();
            restored += 1;
        }
    }
    restored
}

/// Physically remove one entity (and everything it owns).
pub fn purge(projects: &mut Vec<Project>, id: &str) -> Result<DeletedRef, TreeError> {
    let loc = tree::locate(projects, id).ok_or_else(|| TreeError::NotFound(id.to_string()))?;
    match (loc.task, loc.child) {
        (None, _) => {
            projects.remove(loc.project);
        }
        (Some(ti), None) => {
            projects[loc.project].subtasks.remove(ti);
        }
        (Some(ti), Some(ci)) => {
            projects[loc.project].subtasks[ti].child_subtasks.remove(ci);
        }
    }
    Ok(DeletedRef {
        id: id.to_string(),
        level: loc.level(),
    })
}

/// Physically remove every soft-deleted entity. Returns how many entities
/// carried the marker.
pub fn purge_deleted(projects: &mut Vec<Project>) -> usize {
    let mut removed = 0;
    projects.retain(|p| {
        let keep = !p.base.is_deleted;
        removed += usize::from(!keep);
        keep
    });
    for project in projects.iter_mut() {
        project.subtasks.retain(|t| {
            let keep = !t.base.is_deleted;
            removed += usize::from(!keep);
            keep
        });
        for task in project.subtasks.iter_mut() {
            task.child_subtasks.retain(|c| {
                let keep = !c.base.is_deleted;
                removed += usize::from(!keep);
                keep
            });
        }
    }
    removed
}

/// Remove a project outright (after the gateway confirmed its deletion)
pub fn remove_project(projects: &mut Vec<Project>, id: &str) -> Option<Project> {
    let idx = projects.iter().position(|p| p.base.id == id)?;
    Some(projects.remove(idx))
}

// ---------------------------------------------------------------------------
// Reorder
// ---------------------------------------------------------------------------

/// Where to move an entity among its siblings
#[derive(Debug, Clone)]
pub enum InsertPosition {
    Top,
    Bottom,
    /// Directly after the sibling with this id
    After(String),
}

/// Move an entity among its siblings.
pub fn move_entity(
    projects: &mut [Project],
    id: &str,
    position: &InsertPosition,
) -> Result<(), TreeError> {
    let loc = tree::locate(projects, id).ok_or_else(|| TreeError::NotFound(id.to_string()))?;
    match (loc.task, loc.child) {
        (None, _) => reorder(projects, loc.project, position, |p| &p.base.id),
        (Some(ti), None) => reorder(
            &mut projects[loc.project].subtasks,
            ti,
            position,
            |t| &t.base.id,
        ),
        (Some(ti), Some(ci)) => reorder(
            &mut projects[loc.project].subtasks[ti].child_subtasks,
            ci,
            position,
            |c| &c.base.id,
        ),
    }
}

fn reorder<T>(
    items: &mut [T],
    from: usize,
    position: &InsertPosition,
    id_of: impl Fn(&T) -> &String,
) -> Result<(), TreeError> {
    let target = match position {
        InsertPosition::Top => 0,
        InsertPosition::Bottom => items.len() - 1,
        InsertPosition::After(after_id) => {
            let idx = items
                .iter()
                .position(|t| id_of(t) == after_id)
                .ok_or_else(|| TreeError::InvalidPosition(format!("after target {}", after_id)))?;
            if idx >= from { idx } else { idx + 1 }
        }
    };
    if target < from {
        items[target..=from].rotate_right(1);
    } else if target > from {
        items[from..=target].rotate_left(1);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
