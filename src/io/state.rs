use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::io::cache::atomic_write;
use crate::ops::clipboard::Clipboard;
use crate::ops::undo::UndoManager;

/// Session state carried between `pb` invocations (state.json)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub undo: UndoManager,
    #[serde(default)]
    pub clipboard: Clipboard,
}

/// Read state.json; a missing or malformed file yields `None`.
pub fn read_state(path: &Path) -> Option<SessionState> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(state) => Some(state),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed session state");
            None
        }
    }
}

pub fn write_state(path: &Path, state: &SessionState) -> Result<(), std::io::Error> {
    let content = serde_json::to_string_pretty(state)?;
    atomic_write(path, content.as_bytes())
}
