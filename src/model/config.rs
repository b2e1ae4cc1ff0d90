use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Configuration from `.planboard/config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default)]
    pub project: ProjectInfo,
    #[serde(default)]
    pub undo: UndoConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub copy: CopyConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectInfo {
    #[serde(default)]
    pub name: String,
    /// Date the scheduler anchors root projects to. Today when unset.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoConfig {
    /// Length of the recovery window after a delete
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for UndoConfig {
    fn default() -> Self {
        UndoConfig {
            window_secs: default_window_secs(),
        }
    }
}

fn default_window_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory of the file gateway, relative to `.planboard/`
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> String {
    "store".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Appended to the names of pasted entities
    #[serde(default = "default_name_suffix")]
    pub name_suffix: String,
}

impl Default for CopyConfig {
    fn default() -> Self {
        CopyConfig {
            name_suffix: default_name_suffix(),
        }
    }
}

fn default_name_suffix() -> String {
    " (Copy)".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: BoardConfig = toml::from_str("").unwrap();
        assert_eq!(config.undo.window_secs, 5);
        assert_eq!(config.store.path, "store");
        assert_eq!(config.copy.name_suffix, " (Copy)");
        assert!(config.project.start_date.is_none());
    }

    #[test]
    fn start_date_parses_from_toml() {
        let config: BoardConfig = toml::from_str(
            r#"[project]
name = "demo"
start_date = "2024-01-01"
"#,
        )
        .unwrap();
        assert_eq!(
            config.project.start_date,
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
    }
}
