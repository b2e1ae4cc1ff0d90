//! The board session: one owner for the tree and the services around it.
//!
//! Every mutation follows the same path: tree store change, then the
//! scheduler when dates may move, then the allocator when numbers may,
//! then the status roll-up, then a best-effort push of every project
//! document that changed. Gateway failures surface as notices; they never
//! roll back local state.

use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};
use regex::Regex;
use serde::Serialize;

use crate::io::state::SessionState;
use crate::io::sync::{LoadSource, Notice, Synchronizer};
use crate::model::config::BoardConfig;
use crate::model::entity::{Category, Level};
use crate::model::project::Project;
use crate::model::tree;
use crate::ops::aggregate::aggregate;
use crate::ops::check::{self, CheckResult};
use crate::ops::clipboard::{Clipboard, PasteError, PasteOutcome};
use crate::ops::refnum::ReferenceAllocator;
use crate::ops::schedule::{self, ScheduleReport};
use crate::ops::search::{self, SearchHit};
use crate::ops::tree_ops::{self, DeletedRef, EditEffect, FieldEdit, InsertPosition, TreeError};
use crate::ops::undo::{UndoManager, UndoPrompt};

/// What a delete request did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    /// Recoverable through undo
    pub soft_deleted: Vec<DeletedRef>,
    /// Projects deleted from the store and removed locally
    pub removed_projects: Vec<String>,
    /// Projects the store refused to delete; still present
    pub failed_projects: Vec<String>,
    pub skipped: Vec<String>,
}

pub struct Session {
    projects: Vec<Project>,
    config: BoardConfig,
    allocator: ReferenceAllocator,
    undo: UndoManager,
    clipboard: Clipboard,
    sync: Synchronizer,
    loading: bool,
}

impl Session {
    pub fn new(config: BoardConfig, sync: Synchronizer) -> Self {
        let undo = UndoManager::new(Duration::from_secs(config.undo.window_secs));
        Session {
            projects: Vec::new(),
            config,
            allocator: ReferenceAllocator::new(),
            undo,
            clipboard: Clipboard::default(),
            sync,
            loading: false,
        }
    }

    /// Resume the undo batch and clipboard of an earlier session
    pub fn with_state(mut self, state: SessionState) -> Self {
        self.undo = state.undo;
        self.undo
            .set_window(Duration::from_secs(self.config.undo.window_secs));
        self.clipboard = state.clipboard;
        self
    }

    pub fn state(&self) -> SessionState {
        SessionState {
            undo: self.undo.clone(),
            clipboard: self.clipboard.clone(),
        }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    /// The whole tree, soft-deleted entities included
    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    /// The tree with soft-deleted entities removed
    pub fn active_view(&self) -> Vec<Project> {
        tree::active_view(&self.projects)
    }

    /// Anchor date for root projects
    pub fn project_start(&self) -> NaiveDate {
        self.config
            .project
            .start_date
            .unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.sync.take_notices()
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Replace the tree with the store's (or the cache's) copy and rebuild
    /// the allocator from it.
    pub fn load(&mut self) -> LoadSource {
        self.loading = true;
        let (projects, source) = self.sync.load();
        self.projects = projects;
        self.allocator.reinitialize(&self.projects);
        let start = self.project_start();
        schedule::reschedule_in_place(&mut self.projects, start);
        aggregate(&mut self.projects);
        self.loading = false;
        tracing::debug!(?source, projects = self.projects.len(), "board loaded");
        source
    }

    /// Reload unless a load is already running
    pub fn reload(&mut self) -> Option<LoadSource> {
        if self.loading {
            tracing::debug!("reload skipped: load in progress");
            return None;
        }
        Some(self.load())
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub fn add_project(&mut self, reference_number: &str, name: &str) -> Result<String, TreeError> {
        let before = self.projects.clone();
        let id = tree_ops::add_project(&mut self.projects, reference_number, name.to_string())?;
        self.settle(true);
        self.commit(&before);
        Ok(id)
    }

    pub fn add_task(
        &mut self,
        project_id: &str,
        name: &str,
        category: Category,
    ) -> Result<String, TreeError> {
        let before = self.projects.clone();
        let id = tree_ops::add_task(
            &mut self.projects,
            project_id,
            name.to_string(),
            category,
            &mut self.allocator,
        )?;
        self.settle(true);
        self.commit(&before);
        Ok(id)
    }

    pub fn add_child(
        &mut self,
        task_id: &str,
        name: &str,
        category: Category,
    ) -> Result<String, TreeError> {
        let before = self.projects.clone();
        let id = tree_ops::add_child(
            &mut self.projects,
            task_id,
            name.to_string(),
            category,
            &mut self.allocator,
        )?;
        self.settle(true);
        self.commit(&before);
        Ok(id)
    }

    /// Edit one field given as text, e.g. `("start", "2024-01-02")`
    pub fn edit(&mut self, id: &str, field: &str, value: &str) -> Result<EditEffect, TreeError> {
        let loc = tree::locate(&self.projects, id).ok_or_else(|| TreeError::NotFound(id.to_string()))?;
        let edit = FieldEdit::parse(loc.level(), field, value)?;
        self.apply_edit(id, edit)
    }

    pub fn apply_edit(&mut self, id: &str, edit: FieldEdit) -> Result<EditEffect, TreeError> {
        let before = self.projects.clone();
        let effect = tree_ops::edit_field(&mut self.projects, id, edit)?;
        if effect.rereference
            && let Some(reference) = self.allocator.rederive(&mut self.projects, id)
        {
            tracing::debug!(id, reference = %reference, "reference re-derived");
        }
        if effect.reconcile
            && let Some(loc) = tree::locate(&self.projects, id)
        {
            let replaced = self.allocator.reconcile_placeholders(&mut self.projects, loc.project);
            if replaced > 0 {
                tracing::debug!(id, replaced, "placeholder references replaced");
            }
        }
        self.settle(effect.reschedule);
        self.commit(&before);
        Ok(effect)
    }

    pub fn move_entity(&mut self, id: &str, position: &InsertPosition) -> Result<(), TreeError> {
        let before = self.projects.clone();
        tree_ops::move_entity(&mut self.projects, id, position)?;
        self.settle(true);
        self.commit(&before);
        Ok(())
    }

    /// Delete `ids`. Tasks and child tasks become the recoverable batch;
    /// projects are deleted from the store at once and cannot be undone.
    pub fn delete(&mut self, ids: &[String], now: DateTime<Utc>) -> DeleteReport {
        let before = self.projects.clone();
        let outcome = self.undo.delete(&mut self.projects, ids, now);
        let mut report = DeleteReport {
            soft_deleted: outcome.soft_deleted,
            skipped: outcome.skipped,
            ..DeleteReport::default()
        };
        for id in outcome.remote {
            if self.sync.delete(&id) {
                tree_ops::remove_project(&mut self.projects, &id);
                report.removed_projects.push(id);
            } else {
                report.failed_projects.push(id);
            }
        }
        self.settle(true);
        self.commit(&before);
        report
    }

    /// Restore the showing batch if its window is still open. Returns how
    /// many entities came back.
    pub fn undo(&mut self, now: DateTime<Utc>) -> usize {
        if self.undo.tick(now) {
            return 0;
        }
        let before = self.projects.clone();
        let restored = self.undo.restore(&mut self.projects);
        if restored > 0 {
            self.settle(true);
            self.commit(&before);
        }
        restored
    }

    pub fn dismiss(&mut self) {
        self.undo.dismiss();
    }

    pub fn pause_undo(&mut self, now: DateTime<Utc>) {
        self.undo.pause(now);
    }

    pub fn resume_undo(&mut self, now: DateTime<Utc>) {
        self.undo.resume(now);
    }

    /// Advance the undo countdown; true when the window just closed
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        self.undo.tick(now)
    }

    /// Timer callback for batch `generation`
    pub fn on_undo_timer(&mut self, generation: u64, now: DateTime<Utc>) -> bool {
        self.undo.on_timer(generation, now)
    }

    pub fn undo_prompt(&self) -> UndoPrompt {
        self.undo.prompt()
    }

    /// Physically remove soft-deleted entities: one by id, or all of them.
    /// Returns how many were removed.
    pub fn purge(&mut self, id: Option<&str>) -> Result<usize, TreeError> {
        let before = self.projects.clone();
        let removed = match id {
            Some(id) => {
                let entity = tree::find_entity(&self.projects, id)
                    .ok_or_else(|| TreeError::NotFound(id.to_string()))?;
                if !entity.base().is_deleted {
                    return Err(TreeError::NotDeleted(id.to_string()));
                }
                tree_ops::purge(&mut self.projects, id)?;
                1
            }
            None => tree_ops::purge_deleted(&mut self.projects),
        };
        if removed > 0 {
            self.settle(false);
            self.commit(&before);
        }
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Clipboard
    // -----------------------------------------------------------------------

    /// Replace the clipboard with the live entities among `ids`. Returns
    /// (projects, tasks, child tasks) copied.
    pub fn copy(&mut self, ids: &[String]) -> (usize, usize, usize) {
        let mut projects = Vec::new();
        let mut tasks = Vec::new();
        let mut children = Vec::new();
        for id in ids {
            match tree::locate(&self.projects, id).map(|loc| loc.level()) {
                Some(Level::Project) => projects.push(id.clone()),
                Some(Level::Task) => tasks.push(id.clone()),
                Some(Level::ChildTask) => children.push(id.clone()),
                None => tracing::debug!(id = %id, "copy: unknown id"),
            }
        }
        self.clipboard = Clipboard::copy(&self.projects, &projects, &tasks, &children);
        self.clipboard.counts()
    }

    pub fn can_paste(&self) -> bool {
        !self.clipboard.is_empty()
    }

    pub fn paste(&mut self, target: Option<&str>) -> Result<PasteOutcome, PasteError> {
        let before = self.projects.clone();
        let outcome = self.clipboard.paste(
            &mut self.projects,
            target,
            &mut self.allocator,
            &self.config.copy.name_suffix,
        )?;
        self.settle(true);
        self.commit(&before);
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Read-only
    // -----------------------------------------------------------------------

    /// Run a full scheduling pass and push what moved
    pub fn schedule(&mut self) -> ScheduleReport {
        let before = self.projects.clone();
        let start = self.project_start();
        let report = schedule::reschedule_in_place(&mut self.projects, start);
        aggregate(&mut self.projects);
        self.commit(&before);
        report
    }

    pub fn check(&self) -> CheckResult {
        check::check_board(&self.projects)
    }

    pub fn search(&self, re: &Regex, project_filter: Option<&str>) -> Vec<SearchHit> {
        search::search_board(&self.projects, re, project_filter)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Derived state after a mutation
    fn settle(&mut self, reschedule: bool) {
        if reschedule {
            let start = self.project_start();
            let report = schedule::reschedule_in_place(&mut self.projects, start);
            if report.updated > 0 {
                tracing::debug!(updated = report.updated, "timelines re-derived");
            }
        }
        aggregate(&mut self.projects);
    }

    /// Push every project document that differs from `before`, then
    /// refresh the cache.
    fn commit(&mut self, before: &[Project]) {
        for (index, project) in self.projects.iter().enumerate() {
            match before.iter().find(|p| p.base.id == project.base.id) {
                None => {
                    self.sync.create(project, index);
                }
                Some(old) if old == project => {}
                Some(old) if header_changed(old, project) => {
                    self.sync.push_project(project);
                }
                Some(_) => {
                    self.sync.push_subtasks(project);
                }
            }
        }
        self.sync.write_cache(&self.projects);
    }
}

/// Project fields outside a subtasks patch changed
fn header_changed(old: &Project, new: &Project) -> bool {
    old.base.name != new.base.name
        || old.base.reference_number != new.base.reference_number
        || old.base.predecessors != new.base.predecessors
        || old.pinned != new.pinned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::cache::LocalCache;
    use crate::io::gateway::{FileGateway, Gateway, ProjectFilter};
    use crate::model::entity::{Category, TaskStatus};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn session(tmp: &TempDir) -> Session {
        let gateway = FileGateway::open(tmp.path().join("store")).unwrap();
        let cache = LocalCache::new(tmp.path().join("cache.json"));
        let mut config = BoardConfig::default();
        config.project.start_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        let mut s = Session::new(config, Synchronizer::new(Box::new(gateway), cache));
        s.load();
        s
    }

    fn stored(tmp: &TempDir) -> Vec<Project> {
        FileGateway::new(tmp.path().join("store"))
            .get_projects(&ProjectFilter::all())
            .unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn add_task_is_numbered_scheduled_and_pushed() {
        let tmp = TempDir::new().unwrap();
        let mut s = session(&tmp);
        let p = s.add_project("PRJ-1", "Alpha").unwrap();
        let t = s.add_task(&p, "Build", Category::Development).unwrap();

        let task = &s.projects()[0].subtasks[0];
        assert_eq!(task.base.id, t);
        assert_eq!(task.base.reference_number, "PRJ-1.DEV-01");
        assert_eq!(task.base.timeline.start, NaiveDate::from_ymd_opt(2024, 1, 1));

        let remote = stored(&tmp);
        assert_eq!(remote.len(), 1);
        assert_eq!(remote[0].subtasks.len(), 1);
    }

    #[test]
    fn category_edit_rederives_reference() {
        let tmp = TempDir::new().unwrap();
        let mut s = session(&tmp);
        let p = s.add_project("PRJ-1", "Alpha").unwrap();
        let t = s.add_task(&p, "Build", Category::Development).unwrap();
        let effect = s.edit(&t, "category", "testing").unwrap();
        assert!(effect.rereference);
        assert_eq!(s.projects()[0].subtasks[0].base.reference_number, "PRJ-1.TST-01");
        assert_eq!(stored(&tmp)[0].subtasks[0].base.reference_number, "PRJ-1.TST-01");
    }

    #[test]
    fn predecessor_edit_moves_dependent() {
        let tmp = TempDir::new().unwrap();
        let mut s = session(&tmp);
        let p = s.add_project("PRJ-1", "Alpha").unwrap();
        let a = s.add_task(&p, "Design", Category::Design).unwrap();
        let b = s.add_task(&p, "Build", Category::Development).unwrap();
        s.edit(&a, "plan-days", "3").unwrap();
        s.edit(&b, "predecessors", &a).unwrap();

        let b_task = &s.projects()[0].subtasks[1];
        assert_eq!(b_task.base.timeline.start, NaiveDate::from_ymd_opt(2024, 1, 4));
    }

    #[test]
    fn delete_then_undo_restores_everywhere() {
        let tmp = TempDir::new().unwrap();
        let mut s = session(&tmp);
        let p = s.add_project("PRJ-1", "Alpha").unwrap();
        let t = s.add_task(&p, "Build", Category::Development).unwrap();

        let report = s.delete(&[t.clone()], at(0));
        assert_eq!(report.soft_deleted.len(), 1);
        assert!(s.active_view()[0].subtasks.is_empty());
        assert!(stored(&tmp)[0].subtasks[0].base.is_deleted);
        assert!(s.undo_prompt().is_visible);

        assert_eq!(s.undo(at(2)), 1);
        assert_eq!(s.active_view()[0].subtasks.len(), 1);
        assert!(!stored(&tmp)[0].subtasks[0].base.is_deleted);
    }

    #[test]
    fn undo_after_window_does_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut s = session(&tmp);
        let p = s.add_project("PRJ-1", "Alpha").unwrap();
        let t = s.add_task(&p, "Build", Category::Development).unwrap();
        s.delete(&[t], at(0));
        assert_eq!(s.undo(at(6)), 0);
        assert!(s.active_view()[0].subtasks.is_empty());
    }

    #[test]
    fn project_delete_is_immediate_and_remote() {
        let tmp = TempDir::new().unwrap();
        let mut s = session(&tmp);
        let p = s.add_project("PRJ-1", "Alpha").unwrap();
        let report = s.delete(&[p.clone()], at(0));
        assert_eq!(report.removed_projects, vec![p]);
        assert!(s.projects().is_empty());
        assert!(stored(&tmp).is_empty());
        assert!(!s.undo_prompt().is_visible);
    }

    #[test]
    fn purge_requires_deleted() {
        let tmp = TempDir::new().unwrap();
        let mut s = session(&tmp);
        let p = s.add_project("PRJ-1", "Alpha").unwrap();
        let t = s.add_task(&p, "Build", Category::Development).unwrap();
        assert!(matches!(s.purge(Some(t.as_str())), Err(TreeError::NotDeleted(_))));
        s.delete(&[t.clone()], at(0));
        assert_eq!(s.purge(Some(t.as_str())).unwrap(), 1);
        assert!(s.projects()[0].subtasks.is_empty());
    }

    #[test]
    fn paste_project_creates_remote_document_at_front() {
        let tmp = TempDir::new().unwrap();
        let mut s = session(&tmp);
        let p = s.add_project("PRJ-1", "Alpha").unwrap();
        s.add_task(&p, "Build", Category::Development).unwrap();
        assert!(!s.can_paste());
        assert_eq!(s.copy(&[p.clone()]), (1, 0, 0));
        assert!(s.can_paste());

        let outcome = s.paste(None).unwrap();
        assert_eq!(outcome.projects.len(), 1);
        let remote = stored(&tmp);
        assert_eq!(remote.len(), 2);
        assert_eq!(remote[0].base.name, "Alpha (Copy)");
        assert_eq!(remote[0].base.reference_number, "PRJ-1-COPY");
        assert!(!s.can_paste());
    }

    #[test]
    fn child_status_rolls_up_and_pushes() {
        let tmp = TempDir::new().unwrap();
        let mut s = session(&tmp);
        let p = s.add_project("PRJ-1", "Alpha").unwrap();
        let t = s.add_task(&p, "Build", Category::Development).unwrap();
        let c = s.add_child(&t, "Unit tests", Category::Testing).unwrap();
        s.edit(&c, "status", "done").unwrap();
        assert_eq!(s.projects()[0].subtasks[0].status, TaskStatus::Done);
        assert_eq!(s.projects()[0].progress, 100);
        assert_eq!(stored(&tmp)[0].progress, 100);
    }

    #[test]
    fn reload_picks_up_store_contents() {
        let tmp = TempDir::new().unwrap();
        let mut s = session(&tmp);
        s.add_project("PRJ-1", "Alpha").unwrap();
        let mut other = session(&tmp);
        assert_eq!(other.projects().len(), 1);
        other.add_project("PRJ-2", "Beta").unwrap();
        assert_eq!(s.reload(), Some(LoadSource::Gateway));
        assert_eq!(s.projects().len(), 2);
    }
}
