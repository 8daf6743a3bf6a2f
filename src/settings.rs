//! Byte-level key/value settings store, and the payload codec shared by everything stored in it.

use std::{
    collections::HashMap,
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use serde::{Serialize, de::DeserializeOwned};

/// Well-known keys in the settings store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsKey {
    RecentConnections,
    CustomLists,
    TunnelSettings,
}

impl SettingsKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SettingsKey::RecentConnections => "recent-connections",
            SettingsKey::CustomLists => "custom-lists",
            SettingsKey::TunnelSettings => "tunnel-settings",
        }
    }
}

impl fmt::Display for SettingsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No value stored for {key}")]
    NotFound { key: SettingsKey },
    #[error("Failed to access {key}")]
    Io {
        key: SettingsKey,
        #[source]
        source: io::Error,
    },
}

/// Stores opaque payloads under well-known keys.
///
/// Every call is atomic: readers never observe a partially written value.
pub trait SettingsStore {
    fn read(&self, key: SettingsKey) -> Result<Vec<u8>, StoreError>;
    fn write(&self, data: &[u8], key: SettingsKey) -> Result<(), StoreError>;
}

impl<T: SettingsStore + ?Sized> SettingsStore for Box<T> {
    fn read(&self, key: SettingsKey) -> Result<Vec<u8>, StoreError> {
        (**self).read(key)
    }

    fn write(&self, data: &[u8], key: SettingsKey) -> Result<(), StoreError> {
        (**self).write(data, key)
    }
}

impl<T: SettingsStore + ?Sized> SettingsStore for Arc<T> {
    fn read(&self, key: SettingsKey) -> Result<Vec<u8>, StoreError> {
        (**self).read(key)
    }

    fn write(&self, data: &[u8], key: SettingsKey) -> Result<(), StoreError> {
        (**self).write(data, key)
    }
}

/// Encode `value` without any version header.
pub fn produce_unversioned_payload<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(value)
}

pub fn parse_unversioned_payload<T: DeserializeOwned>(data: &[u8]) -> serde_json::Result<T> {
    serde_json::from_slice(data)
}

/// Keeps every key in its own file inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: SettingsKey) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SettingsStore for FileStore {
    fn read(&self, key: SettingsKey) -> Result<Vec<u8>, StoreError> {
        fs::read(self.path(key)).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound { key },
            _ => StoreError::Io { key, source },
        })
    }

    fn write(&self, data: &[u8], key: SettingsKey) -> Result<(), StoreError> {
        // Write to a temporary file first so a crash never leaves half a payload behind.
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data)
            .and_then(|()| fs::rename(&tmp, &path))
            .map_err(|source| StoreError::Io { key, source })
    }
}

/// In-memory store. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    entries: HashMap<SettingsKey, Vec<u8>>,
    writes: usize,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Make every following write fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Store raw bytes under `key`, bypassing the write counter.
    pub fn insert_raw(&self, key: SettingsKey, data: impl Into<Vec<u8>>) {
        self.lock().entries.insert(key, data.into());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryStoreInner> {
        // A panic while holding the lock leaves the map itself intact.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SettingsStore for MemoryStore {
    fn read(&self, key: SettingsKey) -> Result<Vec<u8>, StoreError> {
        self.lock()
            .entries
            .get(&key)
            .cloned()
            .ok_or(StoreError::NotFound { key })
    }

    fn write(&self, data: &[u8], key: SettingsKey) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(StoreError::Io {
                key,
                source: io::Error::other("writes disabled"),
            });
        }
        inner.entries.insert(key, data.to_vec());
        inner.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.read(SettingsKey::CustomLists),
            Err(StoreError::NotFound {
                key: SettingsKey::CustomLists
            })
        ));

        let shared = store.clone();
        shared.write(b"[]", SettingsKey::CustomLists).unwrap();
        assert_eq!(store.read(SettingsKey::CustomLists).unwrap(), b"[]");
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn memory_store_failing_writes() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let error = store.write(b"{}", SettingsKey::TunnelSettings).unwrap_err();
        assert!(matches!(error, StoreError::Io { .. }));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state")).unwrap();

        assert!(matches!(
            store.read(SettingsKey::RecentConnections),
            Err(StoreError::NotFound { .. })
        ));

        store.write(b"{\"a\":1}", SettingsKey::RecentConnections).unwrap();
        store.write(b"{\"a\":2}", SettingsKey::RecentConnections).unwrap();
        assert_eq!(
            store.read(SettingsKey::RecentConnections).unwrap(),
            b"{\"a\":2}"
        );
        assert!(store.dir().join("recent-connections.json").exists());
    }

    #[test]
    fn payload_codec_rejects_garbage() {
        let value: Vec<u32> = parse_unversioned_payload(b"[1,2]").unwrap();
        assert_eq!(value, vec![1, 2]);
        assert!(parse_unversioned_payload::<Vec<u32>>(b"\x00\x01").is_err());
        assert_eq!(produce_unversioned_payload(&value).unwrap(), b"[1,2]");
    }
}
