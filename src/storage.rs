use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

// --- Persisted Keys ---

/// Opaque session token.
pub const TOKEN_KEY: &str = "token";
/// One of `student|parent|teacher`.
pub const USER_ROLE_KEY: &str = "userRole";
/// JSON-serialized `User` record.
pub const USER_INFO_KEY: &str = "userInfo";

/// Every key owned by a session; all of them are removed on logout.
pub const SESSION_KEYS: [&str; 3] = [TOKEN_KEY, USER_ROLE_KEY, USER_INFO_KEY];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("storage could not be encoded: {0}")]
    Serialize(#[from] serde_json::Error),
}

// 1. KeyValueStore Contract
/// KeyValueStore
///
/// The persistent, plain-text key-value capability the session store mirrors
/// into and the navigation guard reads from. Injected everywhere it is used,
/// so tests swap the file-backed store for the in-memory one.
///
/// Reads never fail: a value that cannot be read is simply absent.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// StorageState
///
/// The shared handle to the storage capability.
pub type StorageState = Arc<dyn KeyValueStore>;

// 2. The Real Implementation (JSON file)
/// FileStore
///
/// Keeps every key in a single JSON object on disk, the native counterpart of
/// browser local storage. The file is read once at open time and rewritten
/// (temporary file + rename) on every `set` and `remove`.
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileStore {
    /// Opens the store at `path`. A missing file is empty storage; an
    /// unreadable or malformed one is logged and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "storage file is malformed, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "storage file is unreadable, starting empty");
                HashMap::new()
            }
        };

        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let encoded = serde_json::to_string_pretty(entries)?;
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, encoded)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let previous = entries.insert(key.to_string(), value.to_string());

        // Roll the cache back so memory never claims what the disk lacks.
        if let Err(e) = self.flush(&entries) {
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let Some(previous) = entries.remove(key) else {
            return Ok(());
        };

        if let Err(e) = self.flush(&entries) {
            entries.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }
}

// 3. The Mock Implementation (For Tests)
/// MemoryStore
///
/// An in-memory `KeyValueStore` used by tests and by anything that does not
/// need the session to outlive the process.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    /// When true, every write returns a simulated failure.
    pub should_fail: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            entries: RwLock::default(),
            should_fail: true,
        }
    }

    /// Seeds the store, e.g. with a hand-written `userInfo` record.
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Self {
            entries: RwLock::new(entries),
            should_fail: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn simulated_failure() -> StorageError {
        StorageError::Io(io::Error::other("Mock Storage Error: Simulation requested"))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(Self::simulated_failure());
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(Self::simulated_failure());
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}
