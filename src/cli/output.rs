use serde::Serialize;

use crate::model::entity::{EntityBase, Level, Timeline};
use crate::model::project::Project;
use crate::model::task::{ChildTask, Task};
use crate::model::tree::EntityRef;
use crate::ops::check::{CheckError, CheckWarning};
use crate::util::unicode::{display_width, fit_to_width};

/// Width of the reference-number column in listings
const REF_COLUMN: usize = 22;
/// Width of the name column in listings
const NAME_COLUMN: usize = 32;

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct ShowJson<'a, T: Serialize> {
    pub level: Level,
    #[serde(flatten)]
    pub entity: &'a T,
}

#[derive(Serialize)]
pub struct SearchHitJson {
    pub project: String,
    pub id: String,
    pub reference: String,
    pub name: String,
    pub field: String,
}

#[derive(Serialize)]
pub struct CreatedJson {
    pub id: String,
    pub reference: String,
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

pub fn format_timeline(timeline: &Timeline, plan_days: u32) -> String {
    let date = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
    let mut out = format!("{}..{}", date(timeline.start), date(timeline.end));
    if plan_days > 0 {
        out.push_str(&format!(" ({}d)", plan_days));
    }
    out
}

fn entity_line(indent: usize, base: &EntityBase, status: &str) -> String {
    let prefix = "  ".repeat(indent);
    let ref_cells = REF_COLUMN.saturating_sub(display_width(&prefix));
    let mut line = format!(
        "{}{} {} [{}] {}",
        prefix,
        fit_to_width(&base.reference_number, ref_cells),
        fit_to_width(&base.name, NAME_COLUMN),
        status,
        format_timeline(&base.timeline, base.plan_days),
    );
    if !base.predecessors.is_empty() {
        line.push_str(&format!(" after {}", base.predecessors));
    }
    if base.is_deleted {
        line.push_str(" (deleted)");
    }
    line
}

fn project_line(project: &Project) -> String {
    let mut status = format!("{} {}%", project.status, project.progress);
    if project.pinned {
        status.push_str(" pinned");
    }
    entity_line(0, &project.base, &status)
}

fn task_line(task: &Task) -> String {
    entity_line(1, &task.base, &format!("{} {}", task.category.code(), task.status))
}

fn child_line(child: &ChildTask) -> String {
    entity_line(2, &child.base, &format!("{} {}", child.category.code(), child.status))
}

/// A project with its tasks and child tasks, one per line
pub fn format_project_tree(project: &Project) -> Vec<String> {
    let mut lines = vec![project_line(project)];
    for task in &project.subtasks {
        lines.push(task_line(task));
        for child in &task.child_subtasks {
            lines.push(child_line(child));
        }
    }
    lines
}

/// Detailed view of one entity
pub fn format_entity_detail(entity: EntityRef<'_>) -> Vec<String> {
    let base = entity.base();
    let mut lines = vec![
        format!("{} {}", base.reference_number, base.name),
        format!("id: {}", base.id),
        format!("level: {}", entity.level()),
    ];
    match entity {
        EntityRef::Project(p) => {
            lines.push(format!("status: {}", p.status));
            lines.push(format!("progress: {}%", p.progress));
            if p.pinned {
                lines.push("pinned: yes".to_string());
            }
        }
        EntityRef::Task(t) => {
            lines.push(format!("category: {}", t.category));
            lines.push(format!("status: {}", t.status));
        }
        EntityRef::ChildTask(c) => {
            lines.push(format!("category: {}", c.category));
            lines.push(format!("status: {}", c.status));
            lines.push(format!("parent: {}", c.parent_id));
        }
    }
    lines.push(format!("timeline: {}", format_timeline(&base.timeline, base.plan_days)));
    if !base.predecessors.is_empty() {
        lines.push(format!("predecessors: {}", base.predecessors));
    }
    if let Some(at) = base.deleted_at {
        lines.push(format!("deleted: {}", at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)));
    }

    let children: Vec<String> = match entity {
        EntityRef::Project(p) => p.subtasks.iter().map(task_line).collect(),
        EntityRef::Task(t) => t.child_subtasks.iter().map(child_line).collect(),
        EntityRef::ChildTask(_) => Vec::new(),
    };
    if !children.is_empty() {
        lines.push(String::new());
        lines.extend(children);
    }
    lines
}

pub fn format_check_error(err: &CheckError) -> String {
    match err {
        CheckError::DanglingPredecessor {
            entity_id,
            predecessor,
        } => format!("{} has dangling predecessor: {}", entity_id, predecessor),
        CheckError::DuplicateId { id, count } => format!("id {} is used {} times", id, count),
        CheckError::DuplicateReference { reference, ids } => {
            format!("reference {} is shared by: {}", reference, ids.join(", "))
        }
        CheckError::PredecessorCycle { entity_id } => {
            format!("{} is on a predecessor cycle", entity_id)
        }
        CheckError::WrongParent {
            child_id,
            parent_id,
            stored_under,
        } => format!(
            "{} names parent {} but is stored under {}",
            child_id, parent_id, stored_under
        ),
    }
}

pub fn format_check_warning(warning: &CheckWarning) -> String {
    match warning {
        CheckWarning::MissingReference { id, level } => {
            format!("{} {} has no reference number", level, id)
        }
        CheckWarning::PlaceholderReference { id, reference } => {
            format!("{} still has placeholder reference {}", id, reference)
        }
        CheckWarning::DeletedPredecessor {
            entity_id,
            predecessor,
        } => format!("{} depends on deleted {}", entity_id, predecessor),
        CheckWarning::InvertedTimeline { id } => format!("{} ends before it starts", id),
        CheckWarning::PlanDaysMismatch {
            id,
            plan_days,
            span,
        } => format!("{} plans {} days but spans {}", id, plan_days, span),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::Category;
    use chrono::NaiveDate;

    #[test]
    fn timeline_formatting() {
        let t = Timeline::new(NaiveDate::from_ymd_opt(2024, 1, 1), NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(format_timeline(&t, 5), "2024-01-01..2024-01-05 (5d)");
        assert_eq!(format_timeline(&Timeline::default(), 0), "-..-");
    }

    #[test]
    fn tree_lines_are_indented_by_level() {
        let mut p = Project::new("P".into(), "PRJ-1".into(), "Alpha".into());
        let mut t = Task::new("T".into(), "Build".into(), Category::Development);
        t.base.reference_number = "PRJ-1.DEV-01".into();
        t.base.predecessors = "X".into();
        t.child_subtasks
            .push(ChildTask::new("C".into(), "Unit".into(), Category::Testing, "T".into()));
        p.subtasks.push(t);

        let lines = format_project_tree(&p);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("PRJ-1 "));
        assert!(lines[1].starts_with("  PRJ-1.DEV-01"));
        assert!(lines[1].contains("[DEV not-started]"));
        assert!(lines[1].ends_with("after X"));
        assert!(lines[2].starts_with("    "));
    }

    #[test]
    fn deleted_entities_are_marked() {
        let mut p = Project::new("P".into(), "PRJ-1".into(), "Alpha".into());
        let mut t = Task::new("T".into(), "Build".into(), Category::Development);
        t.base.is_deleted = true;
        p.subtasks.push(t);
        assert!(format_project_tree(&p)[1].ends_with("(deleted)"));
    }
}
