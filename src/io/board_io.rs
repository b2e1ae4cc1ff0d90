use std::fs;
use std::path::{Path, PathBuf};

use crate::io::config_io::{self, CONFIG_FILE, ConfigError};
use crate::model::config::BoardConfig;

/// Directory holding a board's config, state and cache
pub const BOARD_DIR: &str = ".planboard";

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("not a planboard directory: no .planboard/ found")]
    NotABoard,
    #[error("board already initialized at {0}")]
    AlreadyInitialized(PathBuf),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Well-known paths of one board
#[derive(Debug, Clone)]
pub struct BoardPaths {
    pub root: PathBuf,
    pub dir: PathBuf,
}

impl BoardPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let dir = root.join(BOARD_DIR);
        BoardPaths { root, dir }
    }

    pub fn config(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn state(&self) -> PathBuf {
        self.dir.join("state.json")
    }

    pub fn cache(&self) -> PathBuf {
        self.dir.join("cache.json")
    }

    /// File gateway root; relative paths resolve against `.planboard/`
    pub fn store(&self, config: &BoardConfig) -> PathBuf {
        let path = Path::new(&config.store.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        }
    }
}

/// Find the board by walking up from `start`, looking for
/// `.planboard/config.toml`.
pub fn discover_board(start: &Path) -> Result<BoardPaths, BoardError> {
    let mut current = start.to_path_buf();
    loop {
        let paths = BoardPaths::new(&current);
        if paths.config().is_file() {
            return Ok(paths);
        }
        if !current.pop() {
            return Err(BoardError::NotABoard);
        }
    }
}

/// Create `.planboard/` with a default config and an empty store.
pub fn init_board(root: &Path, name: &str) -> Result<(BoardPaths, BoardConfig), BoardError> {
    let paths = BoardPaths::new(root);
    if paths.config().exists() {
        return Err(BoardError::AlreadyInitialized(paths.dir.clone()));
    }
    fs::create_dir_all(&paths.dir)?;
    fs::write(paths.config(), config_io::config_template(name))?;
    let (config, _) = config_io::read_config(&paths.dir)?;
    fs::create_dir_all(paths.store(&config).join("projects"))?;
    Ok((paths, config))
}

/// Load the board config at `paths`
pub fn load_config(paths: &BoardPaths) -> Result<BoardConfig, BoardError> {
    Ok(config_io::read_config(&paths.dir)?.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_then_discover_from_subdir() {
        let tmp = TempDir::new().unwrap();
        let (paths, config) = init_board(tmp.path(), "Demo").unwrap();
        assert_eq!(config.project.name, "Demo");
        assert!(paths.store(&config).join("projects").is_dir());

        let nested = tmp.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        let found = discover_board(&nested).unwrap();
        assert_eq!(found.root, tmp.path());
    }

    #[test]
    fn test_discover_not_found() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(discover_board(tmp.path()), Err(BoardError::NotABoard)));
    }

    #[test]
    fn test_init_twice_fails() {
        let tmp = TempDir::new().unwrap();
        init_board(tmp.path(), "Demo").unwrap();
        assert!(matches!(
            init_board(tmp.path(), "Demo"),
            Err(BoardError::AlreadyInitialized(_))
        ));
    }
}
