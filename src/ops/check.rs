use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::model::entity::Level;
use crate::model::project::Project;
use crate::model::tree::{self, EntityRef};
use crate::ops::refnum;
use crate::ops::schedule;

/// Structured result from `pb check`, suitable for --json output.
#[derive(Debug, Default, Serialize)]
pub struct CheckResult {
    pub valid: bool,
    pub errors: Vec<CheckError>,
    pub warnings: Vec<CheckWarning>,
}

/// A validation error (something that should be fixed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CheckError {
    /// A predecessor id matches no task or child task
    #[serde(rename = "dangling_predecessor")]
    DanglingPredecessor { entity_id: String, predecessor: String },
    /// The same id is used by more than one entity
    #[serde(rename = "duplicate_id")]
    DuplicateId { id: String, count: usize },
    /// Two live siblings share a reference number
    #[serde(rename = "duplicate_reference")]
    DuplicateReference { reference: String, ids: Vec<String> },
    /// Entity sits on a predecessor cycle
    #[serde(rename = "predecessor_cycle")]
    PredecessorCycle { entity_id: String },
    /// A child task's parentId disagrees with where it is stored
    #[serde(rename = "wrong_parent")]
    WrongParent {
        child_id: String,
        parent_id: String,
        stored_under: String,
    },
}

/// A validation warning (non-critical issue).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CheckWarning {
    #[serde(rename = "missing_reference")]
    MissingReference { id: String, level: Level },
    /// Reference number still in the placeholder scope
    #[serde(rename = "placeholder_reference")]
    PlaceholderReference { id: String, reference: String },
    /// Predecessor points at a soft-deleted entity
    #[serde(rename = "deleted_predecessor")]
    DeletedPredecessor { entity_id: String, predecessor: String },
    /// End date before start date
    #[serde(rename = "inverted_timeline")]
    InvertedTimeline { id: String },
    /// plan-days disagrees with the timeline span
    #[serde(rename = "plan_days_mismatch")]
    PlanDaysMismatch { id: String, plan_days: u32, span: u32 },
}

// ---------------------------------------------------------------------------
// Main check entry point
// ---------------------------------------------------------------------------

/// Validate the board. Read-only.
///
/// Soft-deleted entities are skipped except as predecessor targets, where
/// they produce a warning rather than a dangling error.
pub fn check_board(projects: &[Project]) -> CheckResult {
    let mut result = CheckResult::default();

    let mut all_ids: HashMap<&str, usize> = HashMap::new();
    let mut live_ids: HashSet<&str> = HashSet::new();
    tree::for_each_entity(projects, &mut |loc, entity| {
        let id = entity.base().id.as_str();
        *all_ids.entry(id).or_insert(0) += 1;
        if !tree::is_hidden(projects, loc) {
            live_ids.insert(id);
        }
    });

    let mut dup: Vec<(&str, usize)> = all_ids
        .iter()
        .filter(|(_, n)| **n > 1)
        .map(|(id, n)| (*id, *n))
        .collect();
    dup.sort();
    for (id, count) in dup {
        result.errors.push(CheckError::DuplicateId {
            id: id.to_string(),
            count,
        });
    }

    for loc in tree::walk(projects) {
        if tree::is_hidden(projects, loc) {
            continue;
        }
        let Some(entity) = tree::entity_at(projects, loc) else {
            continue;
        };
        check_entity(entity, &all_ids, &live_ids, &mut result);

        if let EntityRef::ChildTask(child) = entity
            && let Some(ti) = loc.task
        {
            let owner = &projects[loc.project].subtasks[ti].base.id;
            if child.parent_id != *owner {
                result.errors.push(CheckError::WrongParent {
                    child_id: child.base.id.clone(),
                    parent_id: child.parent_id.clone(),
                    stored_under: owner.clone(),
                });
            }
        }
    }

    check_sibling_references(projects, &mut result);

    for entity_id in schedule::find_cycles(projects) {
        result.errors.push(CheckError::PredecessorCycle { entity_id });
    }

    result.valid = result.errors.is_empty();
    result
}

fn check_entity(
    entity: EntityRef<'_>,
    all_ids: &HashMap<&str, usize>,
    live_ids: &HashSet<&str>,
    result: &mut CheckResult,
) {
    let base = entity.base();

    if base.reference_number.trim().is_empty() {
        result.warnings.push(CheckWarning::MissingReference {
            id: base.id.clone(),
            level: entity.level(),
        });
    } else if refnum::is_placeholder(&base.reference_number) {
        result.warnings.push(CheckWarning::PlaceholderReference {
            id: base.id.clone(),
            reference: base.reference_number.clone(),
        });
    }

    for pred in base.predecessor_ids() {
        if live_ids.contains(pred) {
            continue;
        }
        if all_ids.contains_key(pred) {
            result.warnings.push(CheckWarning::DeletedPredecessor {
                entity_id: base.id.clone(),
                predecessor: pred.to_string(),
            });
        } else {
            result.errors.push(CheckError::DanglingPredecessor {
                entity_id: base.id.clone(),
                predecessor: pred.to_string(),
            });
        }
    }

    if let (Some(start), Some(end)) = (base.timeline.start, base.timeline.end) {
        if end < start {
            result.warnings.push(CheckWarning::InvertedTimeline { id: base.id.clone() });
        } else if let Some(span) = base.timeline.span_days()
            && base.plan_days != span
        {
            result.warnings.push(CheckWarning::PlanDaysMismatch {
                id: base.id.clone(),
                plan_days: base.plan_days,
                span,
            });
        }
    }
}

/// Reference numbers must be unique among live siblings
fn check_sibling_references(projects: &[Project], result: &mut CheckResult) {
    let project_refs = projects
        .iter()
        .filter(|p| !p.base.is_deleted)
        .map(|p| (&p.base.reference_number, &p.base.id));
    report_duplicates(project_refs, result);

    for project in projects.iter().filter(|p| !p.base.is_deleted) {
        report_duplicates(
            project.live_tasks().map(|t| (&t.base.reference_number, &t.base.id)),
            result,
        );
        for task in project.live_tasks() {
            report_duplicates(
                task.live_children()
                    .map(|c| (&c.base.reference_number, &c.base.id)),
                result,
            );
        }
    }
}

fn report_duplicates<'a>(
    refs: impl Iterator<Item = (&'a String, &'a String)>,
    result: &mut CheckResult,
) {
    let mut seen: Vec<(&String, Vec<String>)> = Vec::new();
    for (reference, id) in refs {
        if reference.trim().is_empty() {
            continue;
        }
        match seen.iter_mut().find(|(r, _)| *r == reference) {
            Some((_, ids)) => ids.push(id.clone()),
            None => seen.push((reference, vec![id.clone()])),
        }
    }
    for (reference, ids) in seen {
        if ids.len() > 1 {
            result.errors.push(CheckError::DuplicateReference {
                reference: reference.clone(),
                ids,
            });
        }
    }
}
