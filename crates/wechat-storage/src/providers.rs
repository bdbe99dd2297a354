use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::Value;

use wechat_core::write_text_atomic;
use wechat_schema::WeChatError;

#[async_trait]
/// Minimal key-value capability the adapter requires from its host.
pub trait Storage: Send + Sync {
    /// Reads the given keys; absent keys are simply missing from the map.
    async fn read(&self, keys: &[String]) -> Result<HashMap<String, Value>, WeChatError>;
    /// Upserts every entry of `changes`.
    async fn write(&self, changes: HashMap<String, Value>) -> Result<(), WeChatError>;
    /// Deletes the given keys; deleting an absent key is not an error.
    async fn delete(&self, keys: &[String]) -> Result<(), WeChatError>;
}

/// In-process storage for tests and single-instance deployments.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, keys: &[String]) -> Result<HashMap<String, Value>, WeChatError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| WeChatError::Storage("memory storage lock poisoned".to_string()))?;
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }

    async fn write(&self, changes: HashMap<String, Value>) -> Result<(), WeChatError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| WeChatError::Storage("memory storage lock poisoned".to_string()))?;
        entries.extend(changes);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), WeChatError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| WeChatError::Storage("memory storage lock poisoned".to_string()))?;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

/// One JSON file per key under a root directory, written atomically so
/// concurrent readers never observe partial entries.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{sanitized}.json"))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn read(&self, keys: &[String]) -> Result<HashMap<String, Value>, WeChatError> {
        let mut entries = HashMap::new();
        for key in keys {
            let path = self.entry_path(key);
            if !path.exists() {
                continue;
            }
            let raw = std::fs::read_to_string(&path).map_err(|error| {
                WeChatError::Storage(format!("failed to read {}: {error}", path.display()))
            })?;
            let value: Value = serde_json::from_str(&raw).map_err(|error| {
                WeChatError::Storage(format!("failed to parse {}: {error}", path.display()))
            })?;
            entries.insert(key.clone(), value);
        }
        Ok(entries)
    }

    async fn write(&self, changes: HashMap<String, Value>) -> Result<(), WeChatError> {
        for (key, value) in changes {
            let path = self.entry_path(&key);
            let serialized = serde_json::to_string_pretty(&value)?;
            write_text_atomic(&path, &serialized)
                .map_err(|error| WeChatError::Storage(error.to_string()))?;
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), WeChatError> {
        for key in keys {
            let path = self.entry_path(key);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => {
                    return Err(WeChatError::Storage(format!(
                        "failed to delete {}: {error}",
                        path.display()
                    )));
                }
            }
        }
        Ok(())
    }
}
