//! File-backed local store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::Backend;
use crate::error::{Error, Result};

/// Default byte quota, matching the usual browser local-storage allowance.
pub const DEFAULT_LOCAL_QUOTA_BYTES: usize = 5 * 1024 * 1024;

const NAME: &str = "local";

/// Persistent string map stored as one JSON file.
///
/// Every operation re-reads the file so separate processes sharing the
/// directory see each other's writes; concurrent writers race and the last
/// rename wins.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
    quota_bytes: usize,
    enabled: bool,
}

impl LocalStore {
    /// File name inside the state directory.
    pub const FILE_NAME: &'static str = "local-storage.json";

    /// Create a store in `dir` with the default quota.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(Self::FILE_NAME),
            quota_bytes: DEFAULT_LOCAL_QUOTA_BYTES,
            enabled: true,
        }
    }

    /// Override the byte quota.
    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    /// Mark the store as absent (storage disabled by the host).
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                Error::corrupt(self.path.display().to_string(), format!("unreadable store: {e}"))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(Error::backend(NAME, format!("read {}: {e}", self.path.display()))),
        }
    }

    /// Load for modification; an unreadable file is replaced rather than
    /// blocking every future write.
    fn load_for_write(&self) -> Result<BTreeMap<String, String>> {
        match self.load() {
            Err(Error::CorruptData { reason, .. }) => {
                warn!(path = %self.path.display(), reason, "replacing corrupt local store");
                Ok(BTreeMap::new())
            },
            other => other,
        }
    }

    fn save(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let used: usize = map.iter().map(|(k, v)| k.len() + v.len()).sum();
        if used > self.quota_bytes {
            return Err(Error::QuotaExceeded { backend: NAME, needed: used, limit: self.quota_bytes });
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::backend(NAME, format!("create {}: {e}", parent.display())))?;
        }
        let contents = serde_json::to_string_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| Error::backend(NAME, format!("write {}: {e}", self.path.display())))?;
        debug!(path = %self.path.display(), bytes = used, "local store saved");
        Ok(())
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.enabled { Ok(()) } else { Err(Error::BackendUnavailable { backend: NAME }) }
    }
}

impl Backend for LocalStore {
    fn name(&self) -> &'static str {
        NAME
    }

    fn is_available(&self) -> bool {
        if !self.enabled {
            return false;
        }
        match self.path.parent() {
            Some(parent) => parent.is_dir() || std::fs::create_dir_all(parent).is_ok(),
            None => false,
        }
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_enabled()?;
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_enabled()?;
        let mut map = self.load_for_write()?;
        map.insert(key.to_string(), value.to_string());
        self.save(&map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.ensure_enabled()?;
        let mut map = self.load_for_write()?;
        if map.remove(key).is_some() {
            self.save(&map)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.ensure_enabled()?;
        Ok(self.load()?.into_keys().collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        LocalStore::new(dir.path()).set("k", "v").unwrap();
        assert_eq!(LocalStore::new(dir.path()).get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_quota_exceeded_leaves_old_value() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path()).with_quota(16);
        store.set("k", "small").unwrap();
        let err = store.set("k", &"x".repeat(64)).unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { .. }));
        assert_eq!(store.get("k").unwrap().as_deref(), Some("small"));
    }

    #[test]
    fn test_corrupt_file_reads_as_corrupt_and_is_replaced_on_write() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        std::fs::write(store.path(), "not json").unwrap();
        assert!(matches!(store.get("k"), Err(Error::CorruptData { .. })));
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_disabled_store_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path()).with_enabled(false);
        assert!(!store.is_available());
        assert!(matches!(store.set("k", "v"), Err(Error::BackendUnavailable { .. })));
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        store.remove("nothing").unwrap();
        store.set("a", "1").unwrap();
        store.remove("a").unwrap();
        assert!(store.keys().unwrap().is_empty());
    }
}
