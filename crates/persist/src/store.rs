//! Key-value store backends.
//!
//! `FileStore` layout inside its directory:
//! ```text
//! <key>.json   - one file per key, holding the raw value
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Errors from persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
    #[error("invalid key {0:?}: keys are ASCII letters, digits, '-' and '_'")]
    InvalidKey(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// String-keyed storage for serialized values.
///
/// Implementations use interior mutability so a store can be shared between
/// the component that owns it and whoever inspects it.
pub trait KeyValueStore: Send {
    /// Raw value for `key`, or `None` when absent.
    fn get(&self, key: &str) -> Result<Option<String>, PersistError>;
    /// Replace the value for `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), PersistError>;
    /// Delete `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), PersistError>;
}

/// In-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, PersistError> {
        self.entries
            .lock()
            .map_err(|_| PersistError::Backend("memory store lock poisoned".into()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        self.lock()?.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Store values as files in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open or create a store at the given directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PersistError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(PersistError::InvalidKey(key.to_owned()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(PersistError::Io(err)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        let path = self.path_for(key)?;
        std::fs::write(path, value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(PersistError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        store.remove("a").unwrap();
    }

    #[test]
    fn memory_store_clones_share_state() {
        let a = MemoryStore::new();
        let b = a.clone();
        a.set("k", "v").unwrap();
        assert_eq!(b.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn file_store_open_creates_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::open(tmp.path().join("data")).unwrap();
        assert!(store.root().is_dir());
    }

    #[test]
    fn file_store_roundtrip_and_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data");
        {
            let store = FileStore::open(&path).unwrap();
            store.set("savedScene", "{\"x\":1}").unwrap();
        }
        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("savedScene").unwrap().as_deref(), Some("{\"x\":1}"));
        assert!(path.join("savedScene.json").is_file());
    }

    #[test]
    fn file_store_missing_key_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        assert_eq!(store.get("nothing").unwrap(), None);
        store.remove("nothing").unwrap();
    }

    #[test]
    fn file_store_rejects_path_like_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        assert!(matches!(
            store.set("../escape", "x"),
            Err(PersistError::InvalidKey(_))
        ));
        assert!(matches!(store.get(""), Err(PersistError::InvalidKey(_))));
    }
}
