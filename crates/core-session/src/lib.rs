//! core-session: persistence of daemon state across restarts.
//!
//! One JSON blob at `$XDG_CONFIG_HOME/yamy/session.json`: the active config
//! path, whether the engine was running, a save timestamp, and opaque window
//! geometry for the GUI. Saves are atomic (temp file + rename). Loads are
//! validated hard: a session from the future, older than a year, or pointing
//! at a non-absolute, non-tilde config path is discarded rather than
//! restored.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};

const SESSION_DIR: &str = "yamy";
const SESSION_FILE: &str = "session.json";
const MAX_SESSION_AGE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("session file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("session rejected: {0}")]
    Invalid(&'static str),
}

/// The persisted blob. Field names are the on-disk contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    #[serde(rename = "activeConfigPath")]
    pub active_config_path: String,
    #[serde(rename = "engineWasRunning")]
    pub engine_was_running: bool,
    #[serde(rename = "savedTimestamp")]
    pub saved_timestamp: i64,
    /// GUI window geometry, preserved opaquely.
    #[serde(rename = "windowPositions", default)]
    pub window_positions: serde_json::Map<String, serde_json::Value>,
}

impl SessionState {
    pub fn new(active_config_path: impl Into<String>, engine_was_running: bool) -> Self {
        Self {
            active_config_path: active_config_path.into(),
            engine_was_running,
            saved_timestamp: unix_now(),
            window_positions: serde_json::Map::new(),
        }
    }

    fn validate(&self, now: i64) -> Result<(), SessionError> {
        if self.saved_timestamp > now {
            return Err(SessionError::Invalid("timestamp is in the future"));
        }
        let age = now - self.saved_timestamp;
        if age > MAX_SESSION_AGE.as_secs() as i64 {
            return Err(SessionError::Invalid("session is older than one year"));
        }
        if !self.active_config_path.is_empty()
            && !self.active_config_path.starts_with('/')
            && !self.active_config_path.starts_with('~')
        {
            return Err(SessionError::Invalid(
                "config path is neither absolute nor tilde-prefixed",
            ));
        }
        Ok(())
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Default location honoring `$XDG_CONFIG_HOME`.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(SESSION_DIR)
        .join(SESSION_FILE)
}

pub struct SessionManager {
    path: PathBuf,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(default_path())
    }
}

impl SessionManager {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate. A missing file is `Ok(None)`; an invalid or stale
    /// session is an error the caller typically downgrades to "start
    /// fresh".
    pub fn load(&self) -> Result<Option<SessionState>, SessionError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(target: "session", path = %self.path.display(), "no session file");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let state: SessionState = serde_json::from_str(&text)?;
        state.validate(unix_now())?;
        info!(
            target: "session",
            config = state.active_config_path.as_str(),
            was_running = state.engine_was_running,
            "session restored"
        );
        Ok(Some(state))
    }

    /// Atomic save: write a sibling temp file, then rename over the target.
    pub fn save(&self, state: &SessionState) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp = self.path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(state)?;
        std::fs::write(&temp, text)?;
        if let Err(e) = std::fs::rename(&temp, &self.path) {
            let _ = std::fs::remove_file(&temp);
            return Err(e.into());
        }
        debug!(target: "session", path = %self.path.display(), "session saved");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(target: "session", error = %e, "failed to clear session");
                Err(e.into())
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn manager() -> (tempfile::TempDir, SessionManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(dir.path().join("session.json"));
        (dir, manager)
    }

    #[test]
    fn missing_file_loads_as_none() {
        let (_dir, manager) = manager();
        assert_eq!(manager.load().unwrap(), None);
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_dir, manager) = manager();
        let mut state = SessionState::new("/home/user/work.json", true);
        state.window_positions.insert(
            "main".to_string(),
            serde_json::json!({ "x": 10, "y": 20, "w": 640, "h": 480 }),
        );
        manager.save(&state).unwrap();
        assert_eq!(manager.load().unwrap(), Some(state));
    }

    #[test]
    fn on_disk_field_names_are_stable() {
        let (_dir, manager) = manager();
        manager
            .save(&SessionState::new("/etc/yamy/work.json", false))
            .unwrap();
        let raw = std::fs::read_to_string(manager.path()).unwrap();
        for field in [
            "activeConfigPath",
            "engineWasRunning",
            "savedTimestamp",
            "windowPositions",
        ] {
            assert!(raw.contains(field), "missing field {field} in {raw}");
        }
    }

    #[test]
    fn future_timestamps_are_rejected() {
        let (_dir, manager) = manager();
        let mut state = SessionState::new("/home/user/work.json", false);
        state.saved_timestamp = unix_now() + 3600;
        manager.save(&state).unwrap();
        assert!(matches!(
            manager.load(),
            Err(SessionError::Invalid("timestamp is in the future"))
        ));
    }

    #[test]
    fn year_old_sessions_are_stale() {
        let (_dir, manager) = manager();
        let mut state = SessionState::new("/home/user/work.json", false);
        state.saved_timestamp = unix_now() - (366 * 24 * 60 * 60);
        manager.save(&state).unwrap();
        assert!(matches!(
            manager.load(),
            Err(SessionError::Invalid("session is older than one year"))
        ));
    }

    #[test]
    fn relative_config_paths_are_rejected() {
        let (_dir, manager) = manager();
        let state = SessionState::new("configs/work.json", false);
        manager.save(&state).unwrap();
        assert!(matches!(manager.load(), Err(SessionError::Invalid(_))));
    }

    #[test]
    fn tilde_and_absolute_paths_are_accepted() {
        let (_dir, manager) = manager();
        for path in ["/abs/work.json", "~/work.json", ""] {
            let state = SessionState::new(path, false);
            manager.save(&state).unwrap();
            assert!(manager.load().is_ok(), "path '{path}' should be accepted");
        }
    }

    #[test]
    fn clear_removes_the_file() {
        let (_dir, manager) = manager();
        manager
            .save(&SessionState::new("/home/user/work.json", true))
            .unwrap();
        manager.clear().unwrap();
        assert_eq!(manager.load().unwrap(), None);
        manager.clear().unwrap();
    }
}
