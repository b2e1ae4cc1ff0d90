//! Write-through of local mutations to the gateway.
//!
//! Local state is authoritative for the session: every push is best-effort.
//! A failed push is logged, recorded as a [`Notice`] for the caller to show,
//! and never undone locally. Loading falls back to the local cache when the
//! gateway cannot be read.

use serde::Serialize;

use crate::io::cache::{LocalCache, PROJECT_TASKS_KEY};
use crate::io::gateway::{Gateway, ProjectFilter, ProjectPatch};
use crate::model::project::Project;

/// A transient message for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub message: String,
}

/// Where a load got its projects from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadSource {
    Gateway,
    Cache,
    Empty,
}

pub struct Synchronizer {
    gateway: Box<dyn Gateway>,
    cache: LocalCache,
    notices: Vec<Notice>,
}

impl Synchronizer {
    pub fn new(gateway: Box<dyn Gateway>, cache: LocalCache) -> Self {
        Synchronizer {
            gateway,
            cache,
            notices: Vec::new(),
        }
    }

    fn notify(&mut self, message: String) {
        self.notices.push(Notice { message });
    }

    /// Drain notices accumulated since the last call
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Fetch every project. On success the cache is refreshed; on failure
    /// the cached tree is returned instead.
    pub fn load(&mut self) -> (Vec<Project>, LoadSource) {
        match self.gateway.get_projects(&ProjectFilter::all()) {
            Ok(projects) => {
                self.write_cache(&projects);
                (projects, LoadSource::Gateway)
            }
            Err(e) => {
                tracing::warn!(error = %e, "gateway load failed; falling back to cache");
                self.notify(format!("could not reach the store ({}); showing cached data", e));
                match self.cache.get::<Vec<Project>>(PROJECT_TASKS_KEY) {
                    Ok(Some(projects)) => (projects, LoadSource::Cache),
                    Ok(None) => (Vec::new(), LoadSource::Empty),
                    Err(e) => {
                        tracing::warn!(error = %e, "cache unreadable");
                        (Vec::new(), LoadSource::Empty)
                    }
                }
            }
        }
    }

    pub fn write_cache(&mut self, projects: &[Project]) {
        if let Err(e) = self.cache.set(PROJECT_TASKS_KEY, &projects) {
            tracing::warn!(error = %e, "cache write failed");
        }
    }

    /// Push a newly created project
    pub fn create(&mut self, project: &Project, position: usize) -> bool {
        match self.gateway.create_project(project, position) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(id = %project.base.id, error = %e, "create failed");
                self.notify(format!("could not save project {}: {}", project.base.reference_number, e));
                false
            }
        }
    }

    /// Push a project-level change (every field)
    pub fn push_project(&mut self, project: &Project) -> bool {
        self.update(project, &ProjectPatch::full(project))
    }

    /// Push a task or child-task change: the whole task array
    pub fn push_subtasks(&mut self, project: &Project) -> bool {
        self.update(project, &ProjectPatch::subtasks(project))
    }

    fn update(&mut self, project: &Project, patch: &ProjectPatch) -> bool {
        match self.gateway.update_project(&project.base.id, patch) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(id = %project.base.id, error = %e, "update failed");
                self.notify(format!("could not save project {}: {}", project.base.reference_number, e));
                false
            }
        }
    }

    /// Delete a project remotely. The caller removes it locally only on
    /// success.
    pub fn delete(&mut self, id: &str) -> bool {
        match self.gateway.delete_project(id) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(id, error = %e, "delete failed");
                self.notify(format!("could not delete project {}: {}", id, e));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::gateway::{FileGateway, GatewayError};
    use tempfile::TempDir;

    /// Gateway that fails every call
    struct Offline;

    impl Gateway for Offline {
        fn create_project(&mut self, _: &Project, _: usize) -> Result<(), GatewayError> {
            Err(GatewayError::Unreachable("offline".into()))
        }
        fn update_project(&mut self, _: &str, _: &ProjectPatch) -> Result<(), GatewayError> {
            Err(GatewayError::Unreachable("offline".into()))
        }
        fn delete_project(&mut self, _: &str) -> Result<(), GatewayError> {
            Err(GatewayError::Unreachable("offline".into()))
        }
        fn get_projects(&self, _: &ProjectFilter) -> Result<Vec<Project>, GatewayError> {
            Err(GatewayError::Unreachable("offline".into()))
        }
    }

    fn sample() -> Project {
        Project::new("P".into(), "PRJ-1".into(), "Alpha".into())
    }

    #[test]
    fn load_refreshes_cache() {
        let tmp = TempDir::new().unwrap();
        let mut gw = FileGateway::open(tmp.path().join("store")).unwrap();
        gw.create_project(&sample(), 0).unwrap();
        let cache = LocalCache::new(tmp.path().join("cache.json"));
        let mut sync = Synchronizer::new(Box::new(gw), cache.clone());

        let (projects, source) = sync.load();
        assert_eq!(source, LoadSource::Gateway);
        assert_eq!(projects.len(), 1);
        let cached: Vec<Project> = cache.get(PROJECT_TASKS_KEY).unwrap().unwrap();
        assert_eq!(cached, projects);
    }

    #[test]
    fn load_falls_back_to_cache() {
        let tmp = TempDir::new().unwrap();
        let cache = LocalCache::new(tmp.path().join("cache.json"));
        cache.set(PROJECT_TASKS_KEY, &vec![sample()]).unwrap();
        let mut sync = Synchronizer::new(Box::new(Offline), cache);

        let (projects, source) = sync.load();
        assert_eq!(source, LoadSource::Cache);
        assert_eq!(projects, vec![sample()]);
        assert_eq!(sync.take_notices().len(), 1);
        assert!(sync.take_notices().is_empty());
    }

    #[test]
    fn load_with_nothing_cached_is_empty() {
        let tmp = TempDir::new().unwrap();
        let mut sync = Synchronizer::new(Box::new(Offline), LocalCache::new(tmp.path().join("c.json")));
        let (projects, source) = sync.load();
        assert!(projects.is_empty());
        assert_eq!(source, LoadSource::Empty);
    }

    #[test]
    fn failed_push_becomes_notice() {
        let tmp = TempDir::new().unwrap();
        let mut sync = Synchronizer::new(Box::new(Offline), LocalCache::new(tmp.path().join("c.json")));
        assert!(!sync.push_subtasks(&sample()));
        assert!(!sync.delete("P"));
        let notices = sync.take_notices();
        assert_eq!(notices.len(), 2);
        assert!(notices[0].message.contains("PRJ-1"));
    }
}
