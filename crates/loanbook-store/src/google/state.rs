//! Remembered ids of the spreadsheet and Drive folder.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
}

/// Small JSON file so later runs skip the Drive lookups.
///
/// A missing or unreadable file just means nothing is cached.
#[derive(Debug)]
pub struct ResourceCache {
    path: PathBuf,
    cached: Mutex<CachedResources>,
}

impl ResourceCache {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cached = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "ignoring unreadable resource cache");
                CachedResources::default()
            }),
            Err(_) => CachedResources::default(),
        };
        Self {
            path,
            cached: Mutex::new(cached),
        }
    }

    pub fn get(&self) -> CachedResources {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn spreadsheet_id(&self) -> Option<String> {
        self.get().spreadsheet_id
    }

    pub fn folder_id(&self) -> Option<String> {
        self.get().folder_id
    }

    pub fn set_spreadsheet_id(&self, id: Option<String>) -> StoreResult<()> {
        self.update(|c| c.spreadsheet_id = id)
    }

    pub fn set_folder_id(&self, id: Option<String>) -> StoreResult<()> {
        self.update(|c| c.folder_id = id)
    }

    fn update(&self, change: impl FnOnce(&mut CachedResources)) -> StoreResult<()> {
        let snapshot = {
            let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
            change(&mut cached);
            cached.clone()
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| crate::error::StoreError::internal(e.to_string()))?;
        fs::write(&self.path, content)?;
        debug!(path = %self.path.display(), "updated resource cache");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResourceCache::load(dir.path().join("resources.json"));
        assert_eq!(cache.get(), CachedResources::default());
    }

    #[test]
    fn ids_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("resources.json");

        let cache = ResourceCache::load(&path);
        cache.set_spreadsheet_id(Some("sheet-1".into())).unwrap();
        cache.set_folder_id(Some("folder-9".into())).unwrap();

        let reloaded = ResourceCache::load(&path);
        assert_eq!(reloaded.spreadsheet_id().as_deref(), Some("sheet-1"));
        assert_eq!(reloaded.folder_id().as_deref(), Some("folder-9"));

        reloaded.set_spreadsheet_id(None).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("spreadsheet_id"));
    }

    #[test]
    fn garbage_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resources.json");
        fs::write(&path, "[1, 2").unwrap();
        assert!(ResourceCache::load(&path).folder_id().is_none());
    }
}
