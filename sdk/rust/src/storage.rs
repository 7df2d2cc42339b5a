//! Storage adapters for the checkout SDK.
//!
//! The verification flow uses two stores: a persistent one (browser local storage,
//! or a file) for the session backup, and a tab-scoped one for the callback
//! snapshot and completion latches. Both are plain string key/value stores.

use std::collections::HashMap;
#[cfg(feature = "native-storage")]
use std::path::Path;
use std::sync::RwLock;

/// Storage keys
pub mod keys {
    /// Auth tokens saved before redirecting to a provider (persistent store)
    pub const SESSION_BACKUP: &str = concat!("jojoprompts:", "session_backup");
    /// Plan/user/order ids seen on a previous load (session store)
    pub const CALLBACK_SNAPSHOT: &str = concat!("jojoprompts:", "callback_snapshot");
    /// Set when checkout starts, cleared once the provider callback is recognised
    pub const PENDING_PAYMENT: &str = concat!("jojoprompts:", "pending_payment");
    /// Prefix for per-order completion latches (session store)
    pub const COMPLETION_PREFIX: &str = concat!("jojoprompts:", "completed:");
}

/// Storage adapter trait for custom storage implementations
pub trait StorageAdapter: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);

    fn remove(&self, key: &str);
}

/// In-memory storage. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageAdapter for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.data.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut data) = self.data.write() {
            data.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut data) = self.data.write() {
            data.remove(key);
        }
    }
}

/// File-based storage adapter.
///
/// Stores data in `jojoprompts.json` within the given directory.
#[cfg(feature = "native-storage")]
pub struct FileStorage {
    path: std::path::PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

#[cfg(feature = "native-storage")]
impl FileStorage {
    /// Returns `None` if the directory doesn't exist or an existing file can't be read.
    pub fn new(storage_dir: &Path) -> Option<Self> {
        if !storage_dir.is_dir() {
            return None;
        }

        let path = storage_dir.join("jojoprompts.json");

        let cache = if path.exists() {
            let contents = std::fs::read_to_string(&path).ok()?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            HashMap::new()
        };

        Some(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    fn save(&self) {
        let Ok(cache) = self.cache.read() else {
            return;
        };
        match serde_json::to_string_pretty(&*cache) {
            Ok(contents) => {
                if let Err(e) = std::fs::write(&self.path, contents) {
                    tracing::warn!("Failed to write {}: {}", self.path.display(), e);
                }
            }
            Err(e) => tracing::warn!("Failed to serialize storage: {}", e),
        }
    }
}

#[cfg(feature = "native-storage")]
impl StorageAdapter for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.cache.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key.to_string(), value.to_string());
        }
        self.save();
    }

    fn remove(&self, key: &str) {
        if let Ok(mut cache) = self.cache.write() {
            cache.remove(key);
        }
        self.save();
    }
}

#[cfg(feature = "native-storage")]
impl std::fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStorage")
            .field("path", &self.path)
            .finish()
    }
}
