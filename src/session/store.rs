use std::fs;
use std::path::PathBuf;

use crate::config;
use crate::error::PortalError;

use super::PortalSession;

const SESSION_FILE: &str = "session.json";

/// The single persisted session slot: one JSON blob under the client config
/// directory. Only the session manager writes here; everything else reads
/// through the manager's accessors.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Resolve the slot directory from configuration, falling back to
    /// `$HOME/.config/estate/portal`.
    pub fn from_config() -> Result<Self, PortalError> {
        let dir = match &config::config().session.config_dir {
            Some(dir) => dir.clone(),
            None => {
                let home = std::env::var("HOME")
                    .map_err(|_| PortalError::Storage("HOME environment variable not set".to_string()))?;
                PathBuf::from(home).join(".config").join("estate").join("portal")
            }
        };
        Ok(Self::new(dir))
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    /// Load the persisted session. Absent means logged out; an unreadable or
    /// corrupt slot is cleared and treated the same way.
    pub fn load(&self) -> Option<PortalSession> {
        let file = self.path();
        if !file.exists() {
            return None;
        }

        let content = match fs::read_to_string(&file) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("unreadable session slot {}: {}", file.display(), e);
                let _ = fs::remove_file(&file);
                return None;
            }
        };

        match serde_json::from_str::<PortalSession>(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!("corrupt session slot {}: {}", file.display(), e);
                let _ = fs::remove_file(&file);
                None
            }
        }
    }

    pub fn save(&self, session: &PortalSession) -> Result<(), PortalError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)
                .map_err(|e| PortalError::Storage(format!("creating {}: {}", self.dir.display(), e)))?;
        }

        let content = serde_json::to_string_pretty(session)
            .map_err(|e| PortalError::Storage(e.to_string()))?;
        fs::write(self.path(), content)
            .map_err(|e| PortalError::Storage(format!("writing {}: {}", self.path().display(), e)))?;
        Ok(())
    }

    /// Remove the slot. Idempotent: a missing file is fine.
    pub fn clear(&self) -> Result<(), PortalError> {
        match fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortalError::Storage(format!("clearing {}: {}", self.path().display(), e))),
        }
    }
}
