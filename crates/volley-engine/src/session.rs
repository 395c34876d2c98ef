use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use volley_core::io::atomic_write;
use volley_core::{paths, Result};

// ─── SessionStore ─────────────────────────────────────────────────────────

/// Browser cookie the gateway authenticates with.
///
/// Lives at `<root>/.volley/session.json`. The game has no login API worth
/// automating, so the operator copies the `Cookie` header from a logged-in
/// browser tab:
///
/// ```rust,ignore
/// let store = SessionStore::new(root);
/// store.save("sid=...; pl=...")?;
/// let gateway = HttpGateway::new(endpoint, store.cookie().as_deref(), map, gate, pacing)?;
/// ```
pub struct SessionStore {
    path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedSession {
    pub cookie: String,
    pub updated_at: DateTime<Utc>,
}

impl SessionStore {
    pub fn new(root: &Path) -> Self {
        SessionStore {
            path: paths::session_path(root),
        }
    }

    /// The stored session, or `None` if none exists or it cannot be parsed.
    pub fn load(&self) -> Option<SavedSession> {
        let data = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<SavedSession>(&data) {
            Ok(s) if !s.cookie.trim().is_empty() => Some(s),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable session file");
                None
            }
        }
    }

    pub fn cookie(&self) -> Option<String> {
        self.load().map(|s| s.cookie)
    }

    pub fn save(&self, cookie: &str) -> Result<()> {
        let saved = SavedSession {
            cookie: cookie.trim().to_owned(),
            updated_at: Utc::now(),
        };
        let data = serde_json::to_string_pretty(&saved)?;
        atomic_write(&self.path, data.as_bytes())
    }

    /// Delete the stored session (no-op if none exists).
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
