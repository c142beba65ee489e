//! Persistent key/value store capability supplied by the host.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::PlatformError;

/// Asynchronous key/value store holding JSON values
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a key
    async fn get(&self, key: &str) -> Result<Option<Value>, PlatformError>;
    /// Write a key, returning the stored value
    async fn set(&self, key: &str, value: Value) -> Result<Value, PlatformError>;
    /// Delete a key
    async fn remove(&self, key: &str) -> Result<(), PlatformError>;
    /// Delete every key
    async fn clear(&self) -> Result<(), PlatformError>;
    /// All keys in order
    async fn keys(&self) -> Result<Vec<String>, PlatformError>;
}

/// Store kept in memory for the lifetime of the browser profile
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, PlatformError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<Value, PlatformError> {
        self.entries.write().insert(key.to_string(), value.clone());
        Ok(value)
    }

    async fn remove(&self, key: &str) -> Result<(), PlatformError> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), PlatformError> {
        self.entries.write().clear();
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, PlatformError> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}
