//! Known-ID set persistence.
//! One JSON file per category, named after its fixed key, holding a plain
//! list of integers. Written once per successful poll cycle, never on ticks
//! that fail.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use psyportal_core::error::{PortalError, Result};
use psyportal_core::traits::KnownSetStore;
use psyportal_core::types::Category;

/// File-based known-set store.
pub struct FileKnownStore {
    dir: PathBuf,
}

impl FileKnownStore {
    /// Create a store in the given directory.
    pub fn new(dir: &Path) -> Self {
        std::fs::create_dir_all(dir).ok();
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn file(&self, category: Category) -> PathBuf {
        self.dir.join(format!("{}.json", category.storage_key()))
    }
}

impl KnownSetStore for FileKnownStore {
    fn load(&self, category: Category) -> Result<Option<BTreeSet<i64>>> {
        let file = self.file(category);
        if !file.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&file)
            .map_err(|e| PortalError::Storage(format!("Read {}: {e}", file.display())))?;
        let ids: Vec<i64> = serde_json::from_str(&json)
            .map_err(|e| PortalError::Storage(format!("Parse {}: {e}", file.display())))?;
        Ok(Some(ids.into_iter().collect()))
    }

    fn save(&self, category: Category, ids: &BTreeSet<i64>) -> Result<()> {
        let file = self.file(category);
        let list: Vec<i64> = ids.iter().copied().collect();
        let json = serde_json::to_string(&list)?;
        std::fs::write(&file, json)
            .map_err(|e| PortalError::Storage(format!("Write {}: {e}", file.display())))?;
        tracing::debug!("💾 Saved {} known ids to {}", list.len(), file.display());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        for category in Category::ALL {
            match std::fs::remove_file(self.file(category)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(PortalError::Storage(format!("Clear known ids: {e}"))),
            }
        }
        Ok(())
    }
}

/// In-memory store for hosts without durable storage, and for tests.
#[derive(Default)]
pub struct MemoryKnownStore {
    sets: Mutex<HashMap<Category, BTreeSet<i64>>>,
}

impl MemoryKnownStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KnownSetStore for MemoryKnownStore {
    fn load(&self, category: Category) -> Result<Option<BTreeSet<i64>>> {
        let sets = self
            .sets
            .lock()
            .map_err(|_| PortalError::Storage("known-set lock poisoned".into()))?;
        Ok(sets.get(&category).cloned())
    }

    fn save(&self, category: Category, ids: &BTreeSet<i64>) -> Result<()> {
        let mut sets = self
            .sets
            .lock()
            .map_err(|_| PortalError::Storage("known-set lock poisoned".into()))?;
        sets.insert(category, ids.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut sets = self
            .sets
            .lock()
            .map_err(|_| PortalError::Storage("known-set lock poisoned".into()))?;
        sets.clear();
        Ok(())
    }
}
