//! In-memory storage implementation for SCIM resources.
//!
//! A thread-safe implementation of [`StorageProvider`] using a `HashMap`
//! behind a tokio `RwLock`. Readers run concurrently; a `put` swaps the
//! whole record under the write lock, so readers observe either the old or
//! the new record and never a partial one.
//!
//! # Example Usage
//!
//! ```rust
//! use scim_engine::storage::{InMemoryStorage, StorageKey, StorageProvider};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = InMemoryStorage::new();
//!
//! let key = StorageKey::new("User", "user123");
//! storage.put(key.clone(), json!({ "id": "user123", "userName": "john.doe" })).await?;
//!
//! let retrieved = storage.get(key.clone()).await?;
//! assert!(retrieved.is_some());
//!
//! assert!(storage.delete(key).await?);
//! # Ok(())
//! # }
//! ```

use crate::storage::{StorageError, StorageKey, StoragePrefix, StorageProvider};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory storage.
///
/// Structure: `resource_type` → `resource_id` → `data`.
#[derive(Clone)]
pub struct InMemoryStorage {
    data: Arc<RwLock<HashMap<String, HashMap<String, Value>>>>,
}

impl InMemoryStorage {
    /// Create a new empty in-memory storage instance.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get storage statistics for debugging and monitoring.
    pub async fn stats(&self) -> InMemoryStorageStats {
        let data_guard = self.data.read().await;
        InMemoryStorageStats {
            resource_type_count: data_guard.values().filter(|t| !t.is_empty()).count(),
            total_resources: data_guard.values().map(HashMap::len).sum(),
        }
    }

    /// Clear all data (useful for testing).
    pub async fn clear(&self) {
        let mut data_guard = self.data.write().await;
        data_guard.clear();
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageProvider for InMemoryStorage {
    type Error = StorageError;

    async fn put(&self, key: StorageKey, data: Value) -> Result<Value, Self::Error> {
        let mut data_guard = self.data.write().await;
        data_guard
            .entry(key.resource_type().to_string())
            .or_default()
            .insert(key.resource_id().to_string(), data.clone());
        Ok(data)
    }

    async fn get(&self, key: StorageKey) -> Result<Option<Value>, Self::Error> {
        let data_guard = self.data.read().await;
        Ok(data_guard
            .get(key.resource_type())
            .and_then(|type_data| type_data.get(key.resource_id()))
            .cloned())
    }

    async fn delete(&self, key: StorageKey) -> Result<bool, Self::Error> {
        let mut data_guard = self.data.write().await;
        Ok(data_guard
            .get_mut(key.resource_type())
            .is_some_and(|type_data| type_data.remove(key.resource_id()).is_some()))
    }

    async fn list(&self, prefix: StoragePrefix) -> Result<Vec<(StorageKey, Value)>, Self::Error> {
        let data_guard = self.data.read().await;

        let Some(type_data) = data_guard.get(prefix.resource_type()) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<(StorageKey, Value)> = type_data
            .iter()
            .map(|(resource_id, data)| {
                (
                    StorageKey::new(prefix.resource_type(), resource_id),
                    data.clone(),
                )
            })
            .collect();
        results.sort_by(|a, b| a.0.resource_id().cmp(b.0.resource_id()));

        Ok(results)
    }

    async fn exists(&self, key: StorageKey) -> Result<bool, Self::Error> {
        let data_guard = self.data.read().await;
        Ok(data_guard
            .get(key.resource_type())
            .is_some_and(|type_data| type_data.contains_key(key.resource_id())))
    }

    async fn count(&self, prefix: StoragePrefix) -> Result<usize, Self::Error> {
        let data_guard = self.data.read().await;
        Ok(data_guard
            .get(prefix.resource_type())
            .map(HashMap::len)
            .unwrap_or(0))
    }
}

/// Statistics about the current state of in-memory storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryStorageStats {
    /// Number of resource types holding at least one record
    pub resource_type_count: usize,
    /// Total number of individual resources
    pub total_resources: usize,
}
