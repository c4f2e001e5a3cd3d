//! Uniqueness index.
//!
//! Maps each reserved `(scope, attribute, normalized value)` to the resource
//! that holds it. `server` values are scoped to their resource type, `global`
//! values share one scope across every type. Entries are only changed by the
//! store, inside the same critical section that writes the resource.

use crate::error::ValidationError;
use crate::schema::{UniqueValue, Uniqueness};
use crate::storage::StorageKey;

use std::collections::HashMap;

const GLOBAL_SCOPE: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct UniqueKey {
    scope: String,
    attribute: String,
    value: String,
}

impl UniqueKey {
    fn new(resource_type: &str, unique: &UniqueValue) -> Self {
        let scope = match unique.scope {
            Uniqueness::Global => GLOBAL_SCOPE.to_string(),
            _ => resource_type.to_string(),
        };
        Self {
            scope,
            attribute: unique.attribute.to_ascii_lowercase(),
            value: unique.normalized.clone(),
        }
    }
}

/// Reserved unique values and their owners.
#[derive(Debug, Default)]
pub struct UniquenessIndex {
    owners: HashMap<UniqueKey, StorageKey>,
    by_resource: HashMap<StorageKey, Vec<UniqueKey>>,
}

impl UniquenessIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values already held by a resource other than `owner`.
    pub fn conflicts(&self, owner: &StorageKey, values: &[UniqueValue]) -> Vec<ValidationError> {
        values
            .iter()
            .filter(|unique| {
                self.owners
                    .get(&UniqueKey::new(owner.resource_type(), unique))
                    .is_some_and(|holder| holder != owner)
            })
            .map(|unique| ValidationError::uniqueness(&unique.attribute, &unique.display))
            .collect()
    }

    /// Make `values` the complete set reserved by `owner`.
    pub fn commit(&mut self, owner: StorageKey, values: &[UniqueValue]) {
        self.release(&owner);
        let keys: Vec<UniqueKey> = values
            .iter()
            .map(|unique| UniqueKey::new(owner.resource_type(), unique))
            .collect();
        for key in &keys {
            self.owners.insert(key.clone(), owner.clone());
        }
        if !keys.is_empty() {
            self.by_resource.insert(owner, keys);
        }
    }

    /// Drop every value reserved by `owner`.
    pub fn release(&mut self, owner: &StorageKey) {
        if let Some(keys) = self.by_resource.remove(owner) {
            for key in keys {
                if self.owners.get(&key) == Some(owner) {
                    self.owners.remove(&key);
                }
            }
        }
    }

    /// Number of reserved values.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
