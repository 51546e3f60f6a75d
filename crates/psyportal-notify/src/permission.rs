//! File-backed notification permission for hosts without a platform permission store.
//! The state only changes through [`FilePermissionStore::request`] or an
//! explicit [`FilePermissionStore::set`], both driven by a user action.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use psyportal_core::error::{PortalError, Result};
use psyportal_core::traits::PermissionStore;
use psyportal_core::types::PermissionState;

pub struct FilePermissionStore {
    path: PathBuf,
}

impl FilePermissionStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join("permission.json"),
        }
    }

    /// Record the user's decision.
    pub fn set(&self, state: PermissionState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&state)?;
        std::fs::write(&self.path, json)
            .map_err(|e| PortalError::Storage(format!("Write permission: {e}")))?;
        tracing::info!("🔔 Notification permission set to {state}");
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for FilePermissionStore {
    fn current(&self) -> PermissionState {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }

    /// A request is the user saying yes; a previous denial is kept.
    async fn request(&self) -> Result<PermissionState> {
        match self.current() {
            PermissionState::Denied => Ok(PermissionState::Denied),
            PermissionState::Granted => Ok(PermissionState::Granted),
            PermissionState::Default => {
                self.set(PermissionState::Granted)?;
                Ok(PermissionState::Granted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_then_request_grants() {
        let dir = std::env::temp_dir().join("psyportal-test-perm-grant");
        std::fs::remove_dir_all(&dir).ok();
        let store = FilePermissionStore::new(&dir);
        assert_eq!(store.current(), PermissionState::Default);
        assert_eq!(store.request().await.unwrap(), PermissionState::Granted);
        assert_eq!(store.current(), PermissionState::Granted);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_denied_is_sticky_for_requests() {
        let dir = std::env::temp_dir().join("psyportal-test-perm-deny");
        let store = FilePermissionStore::new(&dir);
        store.set(PermissionState::Denied).unwrap();
        assert_eq!(store.request().await.unwrap(), PermissionState::Denied);
        // Explicit change still possible.
        store.set(PermissionState::Granted).unwrap();
        assert_eq!(store.current(), PermissionState::Granted);
        std::fs::remove_dir_all(&dir).ok();
    }
}
