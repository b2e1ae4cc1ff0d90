use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

/// Key the project tree is cached under
pub const PROJECT_TASKS_KEY: &str = "projectTasks";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("could not read cache {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("could not write cache {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("malformed cache entry `{key}`: {source}")]
    Malformed {
        key: String,
        source: serde_json::Error,
    },
}

/// Write a file atomically: a temp file in the same directory, then rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Key-value JSON store in a single file.
#[derive(Debug, Clone)]
pub struct LocalCache {
    path: PathBuf,
}

impl LocalCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LocalCache { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<serde_json::Map<String, serde_json::Value>, CacheError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(serde_json::Map::new()),
            Err(source) => {
                return Err(CacheError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        match serde_json::from_str(&text) {
            Ok(map) => Ok(map),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cache file unreadable; starting empty");
                Ok(serde_json::Map::new())
            }
        }
    }

    /// Value stored under `key`, or `None` when absent
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let mut map = self.read_all()?;
        match map.remove(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| CacheError::Malformed {
                    key: key.to_string(),
                    source,
                }),
        }
    }

    /// Store `value` under `key`, keeping other keys
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let mut map = self.read_all()?;
        let value = serde_json::to_value(value).map_err(|source| CacheError::Malformed {
            key: key.to_string(),
            source,
        })?;
        map.insert(key.to_string(), value);
        let text = serde_json::to_string_pretty(&map).map_err(|source| CacheError::Malformed {
            key: key.to_string(),
            source,
        })?;
        atomic_write(&self.path, text.as_bytes()).map_err(|source| CacheError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
