//! The signed-in session, persisted between invocations.
//!
//! Authentication itself is an external concern; the session file only
//! records which principal the external provider vouched for last.

use std::path::Path;

use jot_engine::Principal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    pub principal: Option<Principal>,
}

impl Session {
    /// Load the session file. A missing file means signed out; a corrupt
    /// file is treated the same, with a warning.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };

        match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "corrupt session file; signing out");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::load(&dir.path().join("session.json"));
        assert!(session.principal.is_none());
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let session = Session {
            principal: Principal::new("alice"),
        };
        session.save(&path).unwrap();

        let loaded = Session::load(&path);
        assert_eq!(loaded.principal.unwrap().as_str(), "alice");
    }

    #[test]
    fn corrupt_file_means_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(Session::load(&path).principal.is_none());
    }
}
