//! Remote project storage.
//!
//! The [`Gateway`] trait is the seam to whatever keeps the authoritative
//! copy of each project document. [`FileGateway`] keeps one JSON document
//! per project in a store directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::io::cache::atomic_write;
use crate::io::lock::{FileLock, LockError};
use crate::model::entity::{ProjectStatus, Timeline};
use crate::model::project::Project;
use crate::model::task::Task;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The gateway answered but refused the request
    #[error("gateway rejected the request: {0}")]
    Rejected(String),
    #[error("gateway unreachable: {0}")]
    Unreachable(String),
    #[error("gateway io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("malformed project document {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Partial project update. A task-level change always ships the whole
/// `subtasks` array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Timeline>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predecessors: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtasks: Option<Vec<Task>>,
}

impl ProjectPatch {
    /// Every field of `project`
    pub fn full(project: &Project) -> Self {
        ProjectPatch {
            name: Some(project.base.name.clone()),
            reference_number: Some(project.base.reference_number.clone()),
            timeline: Some(project.base.timeline),
            plan_days: Some(project.base.plan_days),
            predecessors: Some(project.base.predecessors.clone()),
            status: Some(project.status),
            progress: Some(project.progress),
            pinned: Some(project.pinned),
            subtasks: Some(project.subtasks.clone()),
        }
    }

    /// The task array plus the project fields derived from it
    pub fn subtasks(project: &Project) -> Self {
        ProjectPatch {
            timeline: Some(project.base.timeline),
            plan_days: Some(project.base.plan_days),
            status: Some(project.status),
            progress: Some(project.progress),
            subtasks: Some(project.subtasks.clone()),
            ..ProjectPatch::default()
        }
    }

    pub fn apply(&self, project: &mut Project) {
        if let Some(name) = &self.name {
            project.base.name = name.clone();
        }
        if let Some(reference) = &self.reference_number {
            project.base.reference_number = reference.clone();
        }
        if let Some(timeline) = self.timeline {
            project.base.timeline = timeline;
        }
        if let Some(plan_days) = self.plan_days {
            project.base.plan_days = plan_days;
        }
        if let Some(predecessors) = &self.predecessors {
            project.base.predecessors = predecessors.clone();
        }
        if let Some(status) = self.status {
            project.status = status;
        }
        if let Some(progress) = self.progress {
            project.progress = progress;
        }
        if let Some(pinned) = self.pinned {
            project.pinned = pinned;
        }
        if let Some(subtasks) = &self.subtasks {
            project.subtasks = subtasks.clone();
        }
    }
}

/// Which projects `get_projects` returns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFilter {
    pub pinned: Option<bool>,
    pub status: Option<ProjectStatus>,
}

impl ProjectFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, project: &Project) -> bool {
        self.pinned.is_none_or(|p| project.pinned == p)
            && self.status.is_none_or(|s| project.status == s)
    }
}

pub trait Gateway {
    /// Store a new project document at `position` in the project order
    fn create_project(&mut self, project: &Project, position: usize) -> Result<(), GatewayError>;
    fn update_project(&mut self, id: &str, patch: &ProjectPatch) -> Result<(), GatewayError>;
    fn delete_project(&mut self, id: &str) -> Result<(), GatewayError>;
    fn get_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>, GatewayError>;
}

// ---------------------------------------------------------------------------
// File-backed gateway
// ---------------------------------------------------------------------------

/// Project order kept next to the documents
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreIndex {
    #[serde(default)]
    order: Vec<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// One JSON document per project under `<root>/projects/<id>.json`, with
/// the project order in `<root>/index.json`. Writers hold the store lock.
#[derive(Debug, Clone)]
pub struct FileGateway {
    root: PathBuf,
}

impl FileGateway {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileGateway { root: root.into() }
    }

    /// Create the store directories if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, GatewayError> {
        let gateway = Self::new(root);
        let dir = gateway.projects_dir();
        fs::create_dir_all(&dir).map_err(|source| GatewayError::Io { path: dir, source })?;
        Ok(gateway)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn projects_dir(&self) -> PathBuf {
        self.root.join("projects")
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.projects_dir().join(format!("{}.json", id))
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    fn lock(&self) -> Result<FileLock, GatewayError> {
        if !self.root.is_dir() {
            return Err(GatewayError::Unreachable(format!(
                "store directory {} does not exist",
                self.root.display()
            )));
        }
        Ok(FileLock::store(&self.root)?)
    }

    fn read_index(&self) -> Result<StoreIndex, GatewayError> {
        let path = self.index_path();
        match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| GatewayError::Malformed { path, source }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(StoreIndex::default()),
            Err(source) => Err(GatewayError::Io { path, source }),
        }
    }

    fn write_index(&self, index: &mut StoreIndex) -> Result<(), GatewayError> {
        index.updated_at = Some(Utc::now());
        write_json(&self.index_path(), index)
    }

    fn read_document(&self, id: &str) -> Result<Option<Project>, GatewayError> {
        let path = self.document_path(id);
        match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|source| GatewayError::Malformed { path, source }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(GatewayError::Io { path, source }),
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), GatewayError> {
    let text = serde_json::to_string_pretty(value).map_err(|source| GatewayError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write(path, text.as_bytes()).map_err(|source| GatewayError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl Gateway for FileGateway {
    fn create_project(&mut self, project: &Project, position: usize) -> Result<(), GatewayError> {
        let _lock = self.lock()?;
        let id = &project.base.id;
        if self.document_path(id).exists() {
            return Err(GatewayError::Rejected(format!("project {} already exists", id)));
        }
        write_json(&self.document_path(id), project)?;
        let mut index = self.read_index()?;
        index.order.retain(|existing| existing != id);
        let at = position.min(index.order.len());
        index.order.insert(at, id.clone());
        self.write_index(&mut index)
    }

    fn update_project(&mut self, id: &str, patch: &ProjectPatch) -> Result<(), GatewayError> {
        let _lock = self.lock()?;
        let Some(mut project) = self.read_document(id)? else {
            return Err(GatewayError::Rejected(format!("project {} not found", id)));
        };
        patch.apply(&mut project);
        write_json(&self.document_path(id), &project)
    }

    fn delete_project(&mut self, id: &str) -> Result<(), GatewayError> {
        let _lock = self.lock()?;
        let path = self.document_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(GatewayError::Rejected(format!("project {} not found", id)));
            }
            Err(source) => return Err(GatewayError::Io { path, source }),
        }
        let mut index = self.read_index()?;
        index.order.retain(|existing| existing != id);
        self.write_index(&mut index)
    }

    fn get_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>, GatewayError> {
        let dir = self.projects_dir();
        if !dir.is_dir() {
            return Err(GatewayError::Unreachable(format!(
                "store directory {} does not exist",
                dir.display()
            )));
        }
        let index = self.read_index()?;
        let mut projects = Vec::new();
        for id in &index.order {
            match self.read_document(id)? {
                Some(project) => projects.push(project),
                None => tracing::warn!(id = %id, "indexed project has no document"),
            }
        }

        // Documents missing from the index go last, by file name
        let mut stray: Vec<PathBuf> = fs::read_dir(&dir)
            .map_err(|source| GatewayError::Io {
                path: dir.clone(),
                source,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter(|p| {
                p.file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|stem| !index.order.iter().any(|id| id == stem))
            })
            .collect();
        stray.sort();
        for path in stray {
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(project) = self.read_document(id)? {
                projects.push(project);
            }
        }

        projects.retain(|p| filter.matches(p));
        Ok(projects)
    }
}
