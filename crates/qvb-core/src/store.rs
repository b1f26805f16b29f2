use std::{
    fs,
    marker::PhantomData,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::{errors::Error, Result};

/// A whole-collection JSON file store.
///
/// Every mutation is load, mutate in memory, save; there is no partial
/// update. The store does not serialize its callers; mutating flows must
/// hold [`RecordStore::guard`] across their entire read-modify-write cycle,
/// including any `.await` in between, or a concurrent handler can overwrite
/// their save with a stale snapshot.
pub struct RecordStore<T> {
    name: &'static str,
    path: Option<PathBuf>,
    lock: Mutex<()>,
    _collection: PhantomData<fn() -> T>,
}

impl<T> RecordStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(name: &'static str, path: Option<PathBuf>) -> Self {
        Self {
            name,
            path,
            lock: Mutex::new(()),
            _collection: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_configured(&self) -> bool {
        self.path.is_some()
    }

    /// Per-store serialization guard.
    pub async fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    fn configured_path(&self) -> Result<&Path> {
        self.path.as_deref().ok_or_else(|| Error::StorageUnavailable {
            path: PathBuf::from(self.name),
            reason: "path not configured".to_string(),
        })
    }

    fn unavailable(&self, path: &Path, reason: impl std::fmt::Display) -> Error {
        Error::StorageUnavailable {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Load the collection. The backing file must exist and parse; anything
    /// else means the feature backed by this store is currently disabled.
    pub fn load(&self) -> Result<T> {
        let path = self.configured_path()?;
        let raw = fs::read_to_string(path)
            .map_err(|e| self.unavailable(path, e))?;
        serde_json::from_str(&raw).map_err(|e| self.unavailable(path, format!("invalid json: {e}")))
    }

    /// Like [`load`](Self::load), but a missing file yields an empty
    /// collection. For stores the bot creates on first write.
    pub fn load_or_default(&self) -> Result<T> {
        let path = self.configured_path()?;
        match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| self.unavailable(path, format!("invalid json: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(self.unavailable(path, e)),
        }
    }

    /// Replace the whole collection on disk.
    ///
    /// Written to a sibling temp file and renamed into place so readers
    /// never observe a half-written file.
    pub fn save(&self, value: &T) -> Result<()> {
        let path = self.configured_path()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let data = serde_json::to_string_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Notes {
        #[serde(default)]
        notes: Vec<String>,
    }

    fn tmp(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}.json"))
    }

    #[test]
    fn unconfigured_store_is_unavailable() {
        let store: RecordStore<Notes> = RecordStore::new("notes", None);
        assert!(!store.is_configured());
        assert!(matches!(
            store.load(),
            Err(Error::StorageUnavailable { .. })
        ));
        assert!(matches!(
            store.load_or_default(),
            Err(Error::StorageUnavailable { .. })
        ));
        assert!(matches!(
            store.save(&Notes::default()),
            Err(Error::StorageUnavailable { .. })
        ));
    }

    #[test]
    fn strict_load_requires_existing_file() {
        let store: RecordStore<Notes> = RecordStore::new("notes", Some(tmp("qvb-store-missing")));
        assert!(matches!(store.load(), Err(Error::StorageUnavailable { .. })));
        assert_eq!(store.load_or_default().unwrap(), Notes::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let path = tmp("qvb-store-rt");
        let store: RecordStore<Notes> = RecordStore::new("notes", Some(path.clone()));

        let value = Notes {
            notes: vec!["a".to_string(), "b".to_string()],
        };
        store.save(&value).unwrap();
        assert_eq!(store.load().unwrap(), value);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tmp("qvb-store-dir");
        let path = dir.join("nested/notes.json");
        let store: RecordStore<Notes> = RecordStore::new("notes", Some(path.clone()));

        store.save(&Notes::default()).unwrap();
        assert!(path.exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_file_is_unavailable_not_a_panic() {
        let path = tmp("qvb-store-corrupt");
        fs::write(&path, "not json").unwrap();
        let store: RecordStore<Notes> = RecordStore::new("notes", Some(path.clone()));

        assert!(matches!(store.load(), Err(Error::StorageUnavailable { .. })));
        assert!(matches!(
            store.load_or_default(),
            Err(Error::StorageUnavailable { .. })
        ));

        let _ = fs::remove_file(&path);
    }
}
