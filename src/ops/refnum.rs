//! Hierarchical reference numbers.
//!
//! A task or child-task number is `<parent>.<CODE>-<NN>`: the owner's
//! reference number, the category code, and a sequence unique among the
//! siblings of that category under that owner (`PRJ-7.DEV-02`,
//! `PRJ-7.DEV-02.TST-01`). Projects carry a user-assigned number.
//!
//! The allocator keeps per-scope counters so numbers are never reused within
//! a session, even after the sibling holding the highest number is removed.
//! Counters are rebuilt from the tree with [`ReferenceAllocator::reinitialize`]
//! after every bulk load.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::entity::Category;
use crate::model::project::Project;
use crate::model::tree::{self, EntityMut, Locator};

/// Scope used while an owner has no reference number yet
pub const PLACEHOLDER_SCOPE: &str = "TMP";

static SEGMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<scope>.+)\.(?P<code>DES|DEV|TST|REV)-(?P<seq>\d+)$")
        .expect("static reference-number pattern")
});

/// A reference number split into owner scope, category and sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReference<'a> {
    pub scope: &'a str,
    pub category: Category,
    pub seq: u32,
}

/// Split `reference` into its scope, category and sequence, if it has the
/// allocator's shape.
pub fn parse_reference(reference: &str) -> Option<ParsedReference<'_>> {
    let caps = SEGMENT_RE.captures(reference)?;
    let scope = caps.name("scope")?.as_str();
    let category = Category::from_code(caps.name("code")?.as_str())?;
    let seq = caps.name("seq")?.as_str().parse().ok()?;
    Some(ParsedReference {
        scope,
        category,
        seq,
    })
}

pub fn format_reference(scope: &str, category: Category, seq: u32) -> String {
    format!("{}.{}-{:02}", scope, category.code(), seq)
}

/// True when the number was minted under the placeholder scope
pub fn is_placeholder(reference: &str) -> bool {
    reference
        .strip_prefix(PLACEHOLDER_SCOPE)
        .is_some_and(|rest| rest.starts_with('.'))
}

/// Project numbers that would make their tasks look like placeholders
pub fn is_reserved_project_reference(reference: &str) -> bool {
    reference == PLACEHOLDER_SCOPE || is_placeholder(reference)
}

fn scope_for(parent_reference: &str) -> &str {
    let trimmed = parent_reference.trim();
    if trimmed.is_empty() {
        PLACEHOLDER_SCOPE
    } else {
        trimmed
    }
}

/// Owned counter state for reference-number allocation
#[derive(Debug, Default, Clone)]
pub struct ReferenceAllocator {
    counters: HashMap<(String, Category), u32>,
}

impl ReferenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an allocator already reinitialized from `projects`
    pub fn from_tree(projects: &[Project]) -> Self {
        let mut allocator = Self::new();
        allocator.reinitialize(projects);
        allocator
    }

    /// Mint the next number under `parent_reference` for `category`.
    /// Never fails; an empty parent yields a placeholder-scoped number.
    pub fn allocate(
        &mut self,
        parent_reference: &str,
        category: Category,
        sibling_references: &[String],
    ) -> String {
        let scope = scope_for(parent_reference);
        let sibling_max = sibling_references
            .iter()
            .filter_map(|r| parse_reference(r))
            .filter(|p| p.scope == scope && p.category == category)
            .map(|p| p.seq)
            .max()
            .unwrap_or(0);
        let key = (scope.to_string(), category);
        let next = self.counters.get(&key).copied().unwrap_or(0).max(sibling_max) + 1;
        self.counters.insert(key, next);
        format_reference(scope, category, next)
    }

    /// Rebuild counters by scanning every entity in the tree, soft-deleted
    /// ones included since they may still be restored.
    pub fn reinitialize(&mut self, projects: &[Project]) {
        self.counters.clear();
        tree::for_each_entity(projects, &mut |_, entity| {
            if let Some(parsed) = parse_reference(&entity.base().reference_number) {
                let key = (parsed.scope.to_string(), parsed.category);
                let slot = self.counters.entry(key).or_insert(0);
                *slot = (*slot).max(parsed.seq);
            }
        });
    }

    /// Re-derive the number of the task or child-task at `id` from its
    /// owner's current number and its own category. Siblings and descendants
    /// keep their numbers. Returns the new number.
    pub fn rederive(&mut self, projects: &mut [Project], id: &str) -> Option<String> {
        let loc = tree::locate(projects, id)?;
        let category = tree::entity_at(projects, loc)?.category()?;
        let parent = tree::parent_reference(projects, loc)?.to_string();
        let siblings = tree::sibling_references(projects, loc);
        let reference = self.allocate(&parent, category, &siblings);
        let mut entity = tree::entity_at_mut(projects, loc)?;
        entity.base_mut().reference_number = reference.clone();
        Some(reference)
    }

    /// Replace placeholder-scoped numbers in `project` once the project (or
    /// the owning task) has a real number. Returns how many were replaced.
    pub fn reconcile_placeholders(&mut self, projects: &mut [Project], project_index: usize) -> usize {
        let Some(project) = projects.get(project_index) else {
            return 0;
        };
        if project.base.reference_number.trim().is_empty() {
            return 0;
        }
        let mut replaced = 0;
        let task_count = project.subtasks.len();
        for ti in 0..task_count {
            let loc = Locator::task(project_index, ti);
            replaced += self.reconcile_one(projects, loc);
            let child_count = projects[project_index].subtasks[ti].child_subtasks.len();
            for ci in 0..child_count {
                replaced += self.reconcile_one(projects, Locator::child(project_index, ti, ci));
            }
        }
        replaced
    }

    fn reconcile_one(&mut self, projects: &mut [Project], loc: Locator) -> usize {
        let Some(entity) = tree::entity_at(projects, loc) else {
            return 0;
        };
        if !is_placeholder(&entity.base().reference_number) {
            return 0;
        }
        let Some(category) = entity.category() else {
            return 0;
        };
        let parent = tree::parent_reference(projects, loc).unwrap_or("").to_string();
        if parent.trim().is_empty() || is_placeholder(&parent) {
            return 0;
        }
        let siblings = tree::sibling_references(projects, loc);
        let reference = self.allocate(&parent, category, &siblings);
        match tree::entity_at_mut(projects, loc) {
            Some(EntityMut::Task(t)) => t.base.reference_number = reference,
            Some(EntityMut::ChildTask(c)) => c.base.reference_number = reference,
            _ => return 0,
        }
        1
    }
}

/// Reference number for a pasted copy of a project: `<orig>-COPY`,
/// then `<orig>-COPY2`, ... until unused.
pub fn copy_reference(original: &str, existing: &[String]) -> String {
    let base = format!("{}-COPY", original);
    if !existing.iter().any(|r| *r == base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}{}", base, n);
        if !existing.iter().any(|r| *r == candidate) {
            return candidate;
        }
        n += 1;
    }
}
