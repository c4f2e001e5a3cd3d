//! Storage layer for SCIM resource records.
//!
//! Storage providers persist opaque JSON records keyed by resource type and
//! id. They have no knowledge of schemas, versions or uniqueness: the
//! [`ResourceStore`](crate::store::ResourceStore) owns those rules and only
//! asks the provider to put, get, delete and enumerate records.
//!
//! A provider may do real I/O. Failures it classifies as temporary
//! ([`StorageError::is_temporary`]) reach callers as
//! `ScimError::StorageUnavailable`.

pub mod errors;
pub mod in_memory;

pub use errors::StorageError;
pub use in_memory::{InMemoryStorage, InMemoryStorageStats};

use serde_json::Value;
use std::fmt;
use std::future::Future;

/// Identifies one stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    resource_type: String,
    resource_id: String,
}

impl StorageKey {
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Prefix selecting every record of a resource type.
    pub fn prefix(resource_type: impl Into<String>) -> StoragePrefix {
        StoragePrefix {
            resource_type: resource_type.into(),
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.resource_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePrefix {
    resource_type: String,
}

impl StoragePrefix {
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }
}

impl fmt::Display for StoragePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource_type)
    }
}

/// Persistence backend for resource records.
///
/// `put` must replace the whole record atomically: a concurrent `get` sees
/// either the previous record or the new one.
pub trait StorageProvider: Send + Sync {
    type Error: Into<StorageError> + std::error::Error + Send + Sync + 'static;

    /// Store a record, replacing any previous one under the same key.
    fn put(
        &self,
        key: StorageKey,
        data: Value,
    ) -> impl Future<Output = Result<Value, Self::Error>> + Send;

    fn get(
        &self,
        key: StorageKey,
    ) -> impl Future<Output = Result<Option<Value>, Self::Error>> + Send;

    /// Remove a record. Returns whether it existed.
    fn delete(&self, key: StorageKey) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Every record under the prefix, ordered by resource id.
    fn list(
        &self,
        prefix: StoragePrefix,
    ) -> impl Future<Output = Result<Vec<(StorageKey, Value)>, Self::Error>> + Send;

    fn exists(&self, key: StorageKey) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    fn count(
        &self,
        prefix: StoragePrefix,
    ) -> impl Future<Output = Result<usize, Self::Error>> + Send;
}
