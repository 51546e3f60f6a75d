//! Session context: the authenticated patient plus per-session channel state.
//!
//! Passed explicitly to every component that needs to know who is logged in,
//! instead of being looked up from ambient storage.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{PortalError, Result};
use crate::types::Patient;

/// Cheap to clone; clones share the push-active flag.
#[derive(Debug, Clone)]
pub struct Session {
    patient: Arc<Patient>,
    push_active: Arc<AtomicBool>,
}

impl Session {
    pub fn new(patient: Patient) -> Self {
        Self {
            patient: Arc::new(patient),
            push_active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn patient(&self) -> &Patient {
        &self.patient
    }

    pub fn patient_id(&self) -> i64 {
        self.patient.id
    }

    /// Bearer token for backend calls.
    pub fn token(&self) -> &str {
        &self.patient.token
    }

    /// True only once a push token has been obtained *and* registered.
    pub fn is_push_active(&self) -> bool {
        self.push_active.load(Ordering::SeqCst)
    }

    pub fn set_push_active(&self, active: bool) {
        self.push_active.store(active, Ordering::SeqCst);
    }
}

/// File-backed session persistence (`session.json` in the data directory).
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join("session.json"),
        }
    }

    pub fn save(&self, patient: &Patient) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(patient)?;
        std::fs::write(&self.path, json)
            .map_err(|e| PortalError::Storage(format!("Write session: {e}")))?;
        tracing::debug!("💾 Session saved to {}", self.path.display());
        Ok(())
    }

    /// The stored patient, if any. A corrupt file counts as logged out.
    pub fn load(&self) -> Option<Patient> {
        let json = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&json) {
            Ok(patient) => Some(patient),
            Err(e) => {
                tracing::warn!("⚠️ Failed to parse session.json: {e}");
                None
            }
        }
    }

    /// Load the stored patient as a fresh [`Session`], or fail with `Auth`.
    pub fn require(&self) -> Result<Session> {
        self.load()
            .map(Session::new)
            .ok_or_else(|| PortalError::Auth("Not logged in — run `psyportal login <code>`".into()))
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortalError::Storage(format!("Remove session: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient() -> Patient {
        Patient {
            id: 7,
            patient_code: "P-7".into(),
            access_code: "XYZ".into(),
            psychologist_name: "Dr. Ruiz".into(),
            psychologist_schedule: "9-18".into(),
            token: "secret".into(),
        }
    }

    #[test]
    fn test_push_flag_shared_between_clones() {
        let session = Session::new(patient());
        let clone = session.clone();
        assert!(!clone.is_push_active());
        session.set_push_active(true);
        assert!(clone.is_push_active());
    }

    #[test]
    fn test_store_save_load_clear() {
        let dir = std::env::temp_dir().join("psyportal-test-session");
        let store = SessionStore::new(&dir);
        assert!(store.load().is_none());
        assert!(matches!(store.require(), Err(PortalError::Auth(_))));

        store.save(&patient()).unwrap();
        assert_eq!(store.load(), Some(patient()));
        assert_eq!(store.require().unwrap().token(), "secret");

        store.clear().unwrap();
        assert!(store.load().is_none());
        store.clear().unwrap();
        std::fs::remove_dir_all(&dir).ok();
    }
}
