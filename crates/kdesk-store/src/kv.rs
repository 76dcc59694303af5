//! Key-value storage backends.
//!
//! Every record is stored as one JSON document under a named key
//! (`settings`, `algorithms`, `deployments`). The file backend writes
//! `<data_dir>/<key>.json` via a temp file and rename, so an interrupted
//! write never leaves a truncated document behind.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// Storage key for credentials and risk settings.
pub const SETTINGS_KEY: &str = "settings";
/// Storage key for the algorithm map.
pub const ALGORITHMS_KEY: &str = "algorithms";
/// Storage key for the deployment map.
pub const DEPLOYMENTS_KEY: &str = "deployments";

/// Minimal string key-value store.
pub trait KvStore: Send + Sync {
    /// Read the raw value for `key`, `None` if never written.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Overwrite the value for `key`.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Delete `key`. Missing keys are not an error.
    fn remove(&self, key: &str) -> StoreResult<()>;
}

/// Load and deserialize `key`, falling back to `T::default()` when absent.
pub fn load_json<T>(store: &dyn KvStore, key: &str) -> StoreResult<T>
where
    T: DeserializeOwned + Default,
{
    match store.get(key)? {
        Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
        _ => Ok(T::default()),
    }
}

/// Serialize `value` and store it under `key`.
pub fn save_json<T: Serialize + ?Sized>(store: &dyn KvStore, key: &str, value: &T) -> StoreResult<()> {
    let raw = serde_json::to_string_pretty(value)?;
    store.set(key, &raw)
}

fn validate_key(key: &str) -> StoreResult<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

// ============================================================================
// FileKvStore
// ============================================================================

/// File-backed store, one JSON file per key.
#[derive(Debug)]
pub struct FileKvStore {
    base_dir: PathBuf,
}

impl FileKvStore {
    /// Open (and create if needed) a store rooted at `base_dir`.
    pub fn open(base_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        info!(dir = %base_dir.display(), "Opened file store");
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.base_dir.join(format!("{key}.json")))
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let path = self.path_for(key)?;
        let tmp_path = path.with_extension("json.tmp");

        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        debug!(key, bytes = value.len(), "Persisted record");
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// MemoryKvStore
// ============================================================================

/// In-memory store. Counts writes so callers can assert on persistence.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    values: RwLock<HashMap<String, String>>,
    writes: AtomicUsize,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set`/`remove` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        validate_key(key)?;
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        validate_key(key)?;
        self.values.write().insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        self.values.write().remove(key);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
