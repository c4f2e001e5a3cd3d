//! Resource store: CRUD with optimistic concurrency and uniqueness.
//!
//! The store ties the engine together. Writes run through the validator or
//! the PATCH applier, are checked against the uniqueness index, and are then
//! persisted through a [`StorageProvider`]. Each resource type has its own
//! mutation lock, held from loading the current record until the index is
//! updated, so two writers of the same type never interleave. The index sits
//! behind a separate lock taken inside that section, which keeps `global`
//! uniqueness atomic across types. It is rebuilt from the records already in
//! storage before the first write, so a store opened over existing data
//! enforces uniqueness against it.
//!
//! Reads take no store lock. The storage provider replaces whole records, so
//! `get` and `list` observe either the old or the new state of a resource.
//!
//! # Example
//!
//! ```rust
//! use scim_engine::{ResourceStoreBuilder, SchemaRegistry};
//! use scim_engine::storage::InMemoryStorage;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(SchemaRegistry::with_embedded_schemas()?);
//! let store = ResourceStoreBuilder::new(registry, InMemoryStorage::new())
//!     .with_base_url("https://scim.example.com")
//!     .build()?;
//!
//! let user = store
//!     .create("User", &json!({ "userName": "bjensen", "name": { "givenName": "Barbara" } }))
//!     .await?;
//! let fetched = store.get("User", &user.id).await?;
//! assert_eq!(fetched.etag(), user.etag());
//! # Ok(())
//! # }
//! ```

pub mod query;
pub mod uniqueness;

pub use query::{LIST_RESPONSE_SCHEMA, ListQuery, ListResponse, SortOrder};
pub use uniqueness::UniquenessIndex;

use crate::config::EngineConfig;
use crate::error::{BuildResult, ScimError, ScimResult, ValidationErrors};
use crate::filter::{matches, parse_filter};
use crate::patch::{PatchApplier, PatchOperation, PatchRequest};
use crate::resource::{Meta, RawVersion, Resource};
use crate::schema::{AttributePath, NormalizedResource, ResourceSchemas, SchemaRegistry, ValidationContext};
use crate::storage::{StorageError, StorageKey, StorageProvider};

use log::{debug, info, trace, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use uuid::Uuid;

/// Schema-aware resource store over a storage provider.
pub struct ResourceStore<S: StorageProvider> {
    registry: Arc<SchemaRegistry>,
    storage: S,
    config: EngineConfig,
    /// One mutation lock per resource type name
    partitions: HashMap<String, Mutex<()>>,
    /// Loaded from storage before the first write that needs it
    index: Mutex<Option<UniquenessIndex>>,
    /// Mixed into every new version so each write yields a fresh token
    revision: AtomicU64,
}

impl<S: StorageProvider> ResourceStore<S> {
    /// Store with default configuration.
    pub fn new(registry: Arc<SchemaRegistry>, storage: S) -> Self {
        Self::with_config(registry, storage, EngineConfig::default())
    }

    fn with_config(registry: Arc<SchemaRegistry>, storage: S, config: EngineConfig) -> Self {
        let partitions = registry
            .resource_types()
            .iter()
            .map(|resource_type| (resource_type.name.clone(), Mutex::new(())))
            .collect();
        Self {
            registry,
            storage,
            config,
            partitions,
            index: Mutex::new(None),
            revision: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Validate and store a new resource.
    pub async fn create(&self, resource_type: &str, document: &Value) -> ScimResult<Resource> {
        let schemas = self.registry.resource_schemas(resource_type)?;
        let type_name = schemas.resource_type.name.as_str();
        trace!("Create {} payload: {}", type_name, document);

        let _partition = self.partition(type_name)?.lock().await;
        let normalized = schemas.validate(document, ValidationContext::create())?;

        let id = Uuid::new_v4().to_string();
        let location = self.config.location(&schemas.resource_type.endpoint, &id);
        let version = self.next_version(&normalized)?;
        let meta = Meta::new_for_creation(type_name, Some(location), version);

        let resource = self.commit(&schemas, id, normalized, meta).await?;
        info!("Created {} {}", type_name, resource.id);
        Ok(resource)
    }

    /// Fetch one resource.
    pub async fn get(&self, resource_type: &str, id: &str) -> ScimResult<Resource> {
        let type_name = self.registry.resolve(resource_type)?.name.as_str();
        debug!("Get {} {}", type_name, id);
        self.load(type_name, id).await
    }

    /// Replace a resource's attributes with a full document.
    ///
    /// `expected` is the version the client last saw; a mismatch fails with
    /// `VersionConflict` and stores nothing.
    pub async fn replace(
        &self,
        resource_type: &str,
        id: &str,
        expected: Option<&RawVersion>,
        document: &Value,
    ) -> ScimResult<Resource> {
        let schemas = self.registry.resource_schemas(resource_type)?;
        let type_name = schemas.resource_type.name.as_str();
        trace!("Replace {} {} payload: {}", type_name, id, document);

        let _partition = self.partition(type_name)?.lock().await;
        let current = self.load(type_name, id).await?;
        self.check_version(&current, expected)?;

        let normalized =
            schemas.validate(document, ValidationContext::replace(&current.attributes))?;
        let meta = current.meta.touched(self.next_version(&normalized)?);

        let resource = self.commit(&schemas, current.id, normalized, meta).await?;
        info!("Replaced {} {}", type_name, resource.id);
        Ok(resource)
    }

    /// Apply a PATCH request. The batch is all-or-nothing.
    pub async fn patch(
        &self,
        resource_type: &str,
        id: &str,
        expected: Option<&RawVersion>,
        request: &PatchRequest,
    ) -> ScimResult<Resource> {
        request.check_envelope()?;
        self.patch_operations(resource_type, id, expected, &request.operations)
            .await
    }

    /// Apply PATCH operations without the request envelope.
    pub async fn patch_operations(
        &self,
        resource_type: &str,
        id: &str,
        expected: Option<&RawVersion>,
        operations: &[PatchOperation],
    ) -> ScimResult<Resource> {
        let schemas = self.registry.resource_schemas(resource_type)?;
        let type_name = schemas.resource_type.name.as_str();

        let _partition = self.partition(type_name)?.lock().await;
        let current = self.load(type_name, id).await?;
        self.check_version(&current, expected)?;

        let normalized = PatchApplier::new(&schemas).apply(&current.attributes, operations)?;
        let meta = current.meta.touched(self.next_version(&normalized)?);

        let resource = self.commit(&schemas, current.id, normalized, meta).await?;
        info!(
            "Patched {} {} ({} operation(s))",
            type_name,
            resource.id,
            operations.len()
        );
        Ok(resource)
    }

    /// Delete a resource and release its unique values.
    pub async fn delete(
        &self,
        resource_type: &str,
        id: &str,
        expected: Option<&RawVersion>,
    ) -> ScimResult<()> {
        let type_name = self.registry.resolve(resource_type)?.name.as_str();

        let _partition = self.partition(type_name)?.lock().await;
        let current = self.load(type_name, id).await?;
        self.check_version(&current, expected)?;

        let key = StorageKey::new(type_name, id);
        let mut index = self.unique_index().await?;
        let existed = self
            .storage
            .delete(key.clone())
            .await
            .map_err(|e| storage_failure("delete", &key, e.into()))?;
        index.release(&key);

        if !existed {
            return Err(ScimError::not_found(type_name, id));
        }
        info!("Deleted {} {}", type_name, id);
        Ok(())
    }

    /// Filter, sort and page the resources of a type.
    pub async fn list(&self, resource_type: &str, query: &ListQuery) -> ScimResult<ListResponse<Resource>> {
        let schemas = self.registry.resource_schemas(resource_type)?;
        let type_name = schemas.resource_type.name.as_str();

        let filter = query.filter.as_deref().map(parse_filter).transpose()?;
        let sort_path = query
            .sort_by
            .as_deref()
            .map(|sort_by| {
                AttributePath::parse(sort_by)
                    .map_err(|reason| ScimError::malformed_path(sort_by, reason))
            })
            .transpose()?;

        let prefix = StorageKey::prefix(type_name);
        let records = self
            .storage
            .list(prefix.clone())
            .await
            .map_err(|e| {
                let error: StorageError = e.into();
                warn!("Storage list failed for {}: {}", prefix, error);
                ScimError::from(error)
            })?;

        let mut matched: Vec<(String, Value)> = records
            .into_iter()
            .filter(|(_, value)| filter.as_ref().is_none_or(|expr| matches(expr, &schemas, value)))
            .map(|(key, value)| (key.resource_id().to_string(), value))
            .collect();

        if let Some(path) = &sort_path {
            query::sort_records(&mut matched, &schemas, path, query.sort_order);
        }

        let total = matched.len();
        let window = query.window(total, self.config.max_results);
        let page = matched[window]
            .iter()
            .map(|(id, value)| decode_record(type_name, id, value))
            .collect::<ScimResult<Vec<_>>>()?;

        debug!(
            "Listed {}: {} matched, {} returned (filter: {:?})",
            type_name,
            total,
            page.len(),
            query.filter
        );
        Ok(ListResponse::new(page, total, query.effective_start_index()))
    }

    /// Rebuild the uniqueness index from the records already in storage.
    ///
    /// Runs automatically before the first write; call it to load the index
    /// up front. Returns the number of reserved values.
    pub async fn rebuild_index(&self) -> ScimResult<usize> {
        let mut slot = self.index.lock().await;
        let index = self.load_index().await?;
        let reserved = index.len();
        *slot = Some(index);
        Ok(reserved)
    }

    /// The uniqueness index, loaded from storage on first use.
    async fn unique_index(&self) -> ScimResult<MappedMutexGuard<'_, UniquenessIndex>> {
        let mut slot = self.index.lock().await;
        if slot.is_none() {
            *slot = Some(self.load_index().await?);
        }
        Ok(MutexGuard::map(slot, |slot| {
            slot.get_or_insert_with(UniquenessIndex::new)
        }))
    }

    /// Reserve the unique values of every stored resource. Must run with the
    /// index lock held, so no write can land between listing and reserving.
    async fn load_index(&self) -> ScimResult<UniquenessIndex> {
        let mut index = UniquenessIndex::new();
        let mut records = 0;
        for resource_type in self.registry.resource_types() {
            let schemas = self.registry.resource_schemas(&resource_type.name)?;
            let prefix = StorageKey::prefix(resource_type.name.as_str());
            let stored = self.storage.list(prefix.clone()).await.map_err(|e| {
                let error: StorageError = e.into();
                warn!("Storage list failed for {}: {}", prefix, error);
                ScimError::from(error)
            })?;

            for (key, value) in stored {
                let resource = decode_record(&resource_type.name, key.resource_id(), &value)?;
                let normalized = schemas
                    .validate(
                        &Value::Object(resource.attributes.clone()),
                        ValidationContext::replace(&resource.attributes),
                    )
                    .map_err(|errors| {
                        ScimError::from(StorageError::data_corruption(
                            &resource_type.name,
                            Some(resource.id.clone()),
                            errors.to_string(),
                        ))
                    })?;
                index.commit(key, &normalized.unique_values);
                records += 1;
            }
        }
        info!(
            "Loaded uniqueness index: {} value(s) across {} stored resource(s)",
            index.len(),
            records
        );
        Ok(index)
    }

    fn partition(&self, type_name: &str) -> ScimResult<&Mutex<()>> {
        self.partitions
            .get(type_name)
            .ok_or_else(|| ScimError::UnknownResourceType(type_name.to_string()))
    }

    async fn load(&self, type_name: &str, id: &str) -> ScimResult<Resource> {
        let key = StorageKey::new(type_name, id);
        let record = self
            .storage
            .get(key.clone())
            .await
            .map_err(|e| storage_failure("get", &key, e.into()))?
            .ok_or_else(|| ScimError::not_found(type_name, id))?;
        decode_record(type_name, id, &record)
    }

    fn check_version(&self, current: &Resource, expected: Option<&RawVersion>) -> ScimResult<()> {
        match expected {
            Some(expected) if expected != current.version() => {
                warn!(
                    "Version conflict on {} {}: expected {}, current {}",
                    current.resource_type,
                    current.id,
                    expected,
                    current.version()
                );
                Err(ScimError::VersionConflict {
                    resource_type: current.resource_type.clone(),
                    id: current.id.clone(),
                    expected: expected.to_string(),
                    current: current.version().to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn next_version(&self, normalized: &NormalizedResource) -> ScimResult<RawVersion> {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        let content = serde_json::to_vec(&normalized.attributes)?;
        Ok(RawVersion::for_revision(&content, revision))
    }

    /// Check uniqueness, persist and index. Nothing is written when the
    /// uniqueness check fails.
    async fn commit(
        &self,
        schemas: &ResourceSchemas<'_>,
        id: String,
        normalized: NormalizedResource,
        meta: Meta,
    ) -> ScimResult<Resource> {
        let key = StorageKey::new(&schemas.resource_type.name, &id);
        let mut index = self.unique_index().await?;

        let conflicts = index.conflicts(&key, &normalized.unique_values);
        if let Some(errors) = ValidationErrors::from_vec(conflicts) {
            warn!("Uniqueness conflict writing {}: {}", key, errors);
            return Err(errors.into());
        }

        let unique_values = normalized.unique_values.clone();
        let resource = Resource::from_normalized(id, normalized, meta);
        let record = resource.to_json()?;

        self.storage
            .put(key.clone(), record)
            .await
            .map_err(|e| storage_failure("put", &key, e.into()))?;
        index.commit(key, &unique_values);
        Ok(resource)
    }
}

fn storage_failure(operation: &str, key: &StorageKey, error: StorageError) -> ScimError {
    warn!("Storage {} failed for {}: {}", operation, key, error);
    error.into()
}

fn decode_record(type_name: &str, id: &str, record: &Value) -> ScimResult<Resource> {
    Resource::from_json(record).map_err(|e| {
        StorageError::data_corruption(type_name, Some(id.to_string()), e.to_string()).into()
    })
}

/// Builder for [`ResourceStore`] with validated configuration.
pub struct ResourceStoreBuilder<S: StorageProvider> {
    registry: Arc<SchemaRegistry>,
    storage: S,
    config: EngineConfig,
}

impl<S: StorageProvider> ResourceStoreBuilder<S> {
    pub fn new(registry: Arc<SchemaRegistry>, storage: S) -> Self {
        Self {
            registry,
            storage,
            config: EngineConfig::default(),
        }
    }

    /// Set the base URL used in `meta.location`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Set the SCIM protocol version to use in URLs.
    ///
    /// Defaults to "v2" if not specified.
    pub fn with_scim_version(mut self, version: impl Into<String>) -> Self {
        self.config.scim_version = version.into();
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.config.max_results = max_results;
        self
    }

    pub fn with_documentation_uri(mut self, uri: impl Into<String>) -> Self {
        self.config.documentation_uri = Some(uri.into());
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration and create the store.
    pub fn build(self) -> BuildResult<ResourceStore<S>> {
        self.config.validate()?;
        Ok(ResourceStore::with_config(
            self.registry,
            self.storage,
            self.config,
        ))
    }
}
