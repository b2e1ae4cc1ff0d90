use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::model::config::BoardConfig;

pub const CONFIG_FILE: &str = "config.toml";

const CONFIG_TEMPLATE: &str = r##"[project]
name = "{name}"
# Date root projects are anchored to when scheduling. Today when unset.
# start_date = "2024-01-01"

[undo]
# Seconds a deletion stays recoverable
window_secs = 5

[store]
# File gateway directory, relative to .planboard/
path = "store"

[copy]
name_suffix = " (Copy)"
"##;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config.toml: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("could not parse config.toml: {0}")]
    Document(#[from] toml_edit::TomlError),
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Config text for a fresh board
pub fn config_template(name: &str) -> String {
    CONFIG_TEMPLATE.replace("{name}", &name.replace('"', "\\\""))
}

/// Read the board config, returning both the parsed config and the raw
/// toml_edit document for format-preserving edits.
pub fn read_config(board_dir: &Path) -> Result<(BoardConfig, toml_edit::DocumentMut), ConfigError> {
    let path = board_dir.join(CONFIG_FILE);
    let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let config: BoardConfig = toml::from_str(&text)?;
    let doc: toml_edit::DocumentMut = text.parse()?;
    Ok((config, doc))
}

/// Write the config document back to disk, preserving formatting.
pub fn write_config(board_dir: &Path, doc: &toml_edit::DocumentMut) -> Result<(), ConfigError> {
    let path = board_dir.join(CONFIG_FILE);
    fs::write(&path, doc.to_string()).map_err(|source| ConfigError::Write { path, source })
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn ensure_table(doc: &mut toml_edit::DocumentMut, table: &str) {
    if !doc.contains_key(table) {
        doc[table] = toml_edit::Item::Table(toml_edit::Table::new());
    }
}

/// Set a dotted key (`section.field`) in the config document. Values are
/// validated against the field's type. `none` clears `project.start_date`.
pub fn set_value(doc: &mut toml_edit::DocumentMut, key: &str, value: &str) -> Result<(), ConfigError> {
    let Some((table, field)) = key.split_once('.') else {
        return Err(ConfigError::UnknownKey(key.to_string()));
    };
    match (table, field) {
        ("project", "name") | ("store", "path") | ("copy", "name_suffix") => {
            if table == "store" && value.trim().is_empty() {
                return Err(invalid(key, value));
            }
            ensure_table(doc, table);
            doc[table][field] = toml_edit::value(value);
        }
        ("project", "start_date") => {
            ensure_table(doc, table);
            if value.is_empty() || value.eq_ignore_ascii_case("none") {
                if let Some(t) = doc[table].as_table_mut() {
                    t.remove(field);
                }
            } else {
                let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .map_err(|_| invalid(key, value))?;
                doc[table][field] = toml_edit::value(date.format("%Y-%m-%d").to_string());
            }
        }
        ("undo", "window_secs") => {
            let secs: u32 = value.parse().map_err(|_| invalid(key, value))?;
            ensure_table(doc, table);
            doc[table][field] = toml_edit::value(i64::from(secs));
        }
        _ => return Err(ConfigError::UnknownKey(key.to_string())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_template_parses_to_defaults() {
        let config: BoardConfig = toml::from_str(&config_template("Demo")).unwrap();
        assert_eq!(config.project.name, "Demo");
        assert_eq!(config.project.start_date, None);
        assert_eq!(config.undo.window_secs, 5);
        assert_eq!(config.store.path, "store");
        assert_eq!(config.copy.name_suffix, " (Copy)");
    }

    #[test]
    fn test_round_trip_config() {
        let tmp = TempDir::new().unwrap();
        let original = config_template("Demo");
        fs::write(tmp.path().join(CONFIG_FILE), &original).unwrap();

        let (_config, doc) = read_config(tmp.path()).unwrap();
        write_config(tmp.path(), &doc).unwrap();
        assert_eq!(fs::read_to_string(tmp.path().join(CONFIG_FILE)).unwrap(), original);
    }

    #[test]
    fn test_set_start_date_keeps_comments() {
        let mut doc: toml_edit::DocumentMut = config_template("Demo").parse().unwrap();
        set_value(&mut doc, "project.start_date", "2024-03-01").unwrap();
        let text = doc.to_string();
        assert!(text.contains("start_date = \"2024-03-01\""));
        assert!(text.contains("# Seconds a deletion stays recoverable"));
        let config: BoardConfig = toml::from_str(&text).unwrap();
        assert_eq!(config.project.start_date, NaiveDate::from_ymd_opt(2024, 3, 1));

        set_value(&mut doc, "project.start_date", "none").unwrap();
        let config: BoardConfig = toml::from_str(&doc.to_string()).unwrap();
        assert_eq!(config.project.start_date, None);
    }

    #[test]
    fn test_set_window_secs() {
        let mut doc: toml_edit::DocumentMut = config_template("Demo").parse().unwrap();
        set_value(&mut doc, "undo.window_secs", "10").unwrap();
        let config: BoardConfig = toml::from_str(&doc.to_string()).unwrap();
        assert_eq!(config.undo.window_secs, 10);
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut doc: toml_edit::DocumentMut = config_template("Demo").parse().unwrap();
        assert!(matches!(
            set_value(&mut doc, "undo.window_secs", "soon"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            set_value(&mut doc, "project.start_date", "03/01/2024"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            set_value(&mut doc, "ui.theme", "dark"),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_set_creates_missing_table() {
        let mut doc: toml_edit::DocumentMut = "[project]\nname = \"x\"\n".parse().unwrap();
        set_value(&mut doc, "copy.name_suffix", " copy").unwrap();
        let config: BoardConfig = toml::from_str(&doc.to_string()).unwrap();
        assert_eq!(config.copy.name_suffix, " copy");
    }
}
