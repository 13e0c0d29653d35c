//! Persisted local state.
//!
//! Everything the assistant remembers outside chat transcripts lives in one
//! JSON document:
//!
//! | Key | Contents |
//! |-----|----------|
//! | `permissions` | command kinds with standing approval |
//! | `tasks` | the to-do list |
//! | `active_session` | id of the open chat |
//! | `theme` | `light`, `dark` or `system` |
//! | `onboarding_seen` | whether the intro was dismissed |
//!
//! Each mutation rewrites the whole snapshot (temp file, fsync, rename).
//! Last writer wins.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AssistantError, Result};
use crate::permissions::PermissionSet;
use crate::tasks::TaskList;

/// UI colour scheme preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// The persisted snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalState {
    pub permissions: PermissionSet,
    pub tasks: TaskList,
    pub active_session: Option<String>,
    pub theme: Theme,
    pub onboarding_seen: bool,
}

/// File-backed [`LocalState`].
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: LocalState,
}

impl StateStore {
    /// Load the snapshot at `path`.
    ///
    /// A missing or unreadable file starts from defaults; a corrupt one is
    /// logged and ignored.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "state file is corrupt, starting fresh");
                LocalState::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LocalState::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read state file");
                LocalState::default()
            }
        };
        Self { path, state }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &LocalState {
        &self.state
    }

    /// Mutate the snapshot and persist it.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Storage`] if the snapshot cannot be written.
    /// The in-memory state keeps the change either way.
    pub fn update<T>(&mut self, f: impl FnOnce(&mut LocalState) -> T) -> Result<T> {
        let out = f(&mut self.state);
        self.save()?;
        Ok(out)
    }

    pub fn set_permissions(&mut self, permissions: PermissionSet) -> Result<()> {
        self.update(|s| s.permissions = permissions)
    }

    pub fn set_tasks(&mut self, tasks: TaskList) -> Result<()> {
        self.update(|s| s.tasks = tasks)
    }

    pub fn set_active_session(&mut self, id: Option<String>) -> Result<()> {
        self.update(|s| s.active_session = id)
    }

    pub fn set_theme(&mut self, theme: Theme) -> Result<()> {
        self.update(|s| s.theme = theme)
    }

    pub fn mark_onboarding_seen(&mut self) -> Result<()> {
        self.update(|s| s.onboarding_seen = true)
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.state)
            .map_err(|e| AssistantError::Storage(format!("failed to serialize state: {e}")))?;
        write_atomic(&self.path, &json).map_err(|e| {
            AssistantError::Storage(format!("failed to write {}: {e}", self.path.display()))
        })?;
        debug!(path = %self.path.display(), "state saved");
        Ok(())
    }
}

/// Write `bytes` to `path` through a temp file in the same directory.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_owned());
    let tmp = dir.join(format!(".{name}.tmp"));

    std::fs::write(&tmp, bytes)?;
    if let Ok(file) = std::fs::File::open(&tmp) {
        let _ = file.sync_all();
    }
    std::fs::rename(&tmp, path)
}
