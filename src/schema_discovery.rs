//! Read-only discovery documents.
//!
//! Serves the `/Schemas`, `/ResourceTypes` and `/ServiceProviderConfig`
//! documents (RFC 7644 §4) from the shared schema registry. Nothing here
//! mutates the registry.

use crate::config::EngineConfig;
use crate::error::{ScimError, ScimResult};
use crate::schema::SchemaRegistry;
use crate::store::ListResponse;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;

pub const SCHEMA_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:Schema";
pub const RESOURCE_TYPE_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:ResourceType";
pub const SERVICE_PROVIDER_CONFIG_SCHEMA: &str =
    "urn:ietf:params:scim:schemas:core:2.0:ServiceProviderConfig";

/// Discovery documents over a schema registry.
///
/// # Example
/// ```rust
/// use scim_engine::{SchemaDiscovery, SchemaRegistry};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = Arc::new(SchemaRegistry::with_embedded_schemas()?);
/// let discovery = SchemaDiscovery::new(registry);
///
/// let schemas = discovery.schemas()?;
/// assert_eq!(schemas.total_results, 3);
/// assert!(discovery.service_provider_config().patch.supported);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SchemaDiscovery {
    registry: Arc<SchemaRegistry>,
    config: EngineConfig,
}

impl SchemaDiscovery {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    /// Discovery using the store's configuration for locations and limits.
    pub fn with_config(registry: Arc<SchemaRegistry>, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    pub fn schema_registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Every registered schema.
    pub fn schemas(&self) -> ScimResult<ListResponse<Value>> {
        let documents = self
            .registry
            .schemas()
            .iter()
            .map(|schema| self.schema_document(&schema.id))
            .collect::<ScimResult<Vec<_>>>()?;
        debug!("Discovery: {} schema(s)", documents.len());
        Ok(ListResponse::complete(documents))
    }

    /// One schema by URN.
    pub fn schema(&self, id: &str) -> ScimResult<Value> {
        self.schema_document(id)
    }

    /// Every registered resource type.
    pub fn resource_types(&self) -> ScimResult<ListResponse<Value>> {
        let documents = self
            .registry
            .resource_types()
            .iter()
            .map(|resource_type| self.resource_type(&resource_type.name))
            .collect::<ScimResult<Vec<_>>>()?;
        Ok(ListResponse::complete(documents))
    }

    /// One resource type by name or endpoint.
    pub fn resource_type(&self, name: &str) -> ScimResult<Value> {
        let resource_type = self.registry.resolve(name)?;
        let mut document = to_object(resource_type)?;
        document.insert("schemas".to_string(), json!([RESOURCE_TYPE_SCHEMA]));
        document.insert(
            "meta".to_string(),
            json!({
                "resourceType": "ResourceType",
                "location": self.config.location("ResourceTypes", &resource_type.name),
            }),
        );
        Ok(Value::Object(document))
    }

    pub fn service_provider_config(&self) -> ServiceProviderConfig {
        ServiceProviderConfig {
            schemas: vec![SERVICE_PROVIDER_CONFIG_SCHEMA.to_string()],
            documentation_uri: self.config.documentation_uri.clone(),
            patch: Supported::yes(),
            bulk: BulkSupport {
                supported: false,
                max_operations: 0,
                max_payload_size: 0,
            },
            filter: FilterSupport {
                supported: true,
                max_results: self.config.max_results,
            },
            change_password: Supported::no(),
            sort: Supported::yes(),
            etag: Supported::yes(),
            authentication_schemes: Vec::new(),
        }
    }

    fn schema_document(&self, id: &str) -> ScimResult<Value> {
        let schema = self
            .registry
            .schema(id)
            .ok_or_else(|| ScimError::not_found("Schema", id))?;
        let mut document = to_object(schema)?;
        document.insert("schemas".to_string(), json!([SCHEMA_SCHEMA]));
        document.insert(
            "meta".to_string(),
            json!({
                "resourceType": "Schema",
                "location": self.config.location("Schemas", &schema.id),
            }),
        );
        Ok(Value::Object(document))
    }
}

fn to_object<T: Serialize>(item: &T) -> ScimResult<Map<String, Value>> {
    match serde_json::to_value(item)? {
        Value::Object(map) => Ok(map),
        _ => Err(ScimError::internal("Discovery document is not an object")),
    }
}

/// Service provider configuration as defined in RFC 7643 §5.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProviderConfig {
    pub schemas: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_uri: Option<String>,
    pub patch: Supported,
    pub bulk: BulkSupport,
    pub filter: FilterSupport,
    pub change_password: Supported,
    pub sort: Supported,
    pub etag: Supported,
    /// Authentication is handled outside the engine; always empty.
    pub authentication_schemes: Vec<Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Supported {
    pub supported: bool,
}

impl Supported {
    fn yes() -> Self {
        Self { supported: true }
    }

    fn no() -> Self {
        Self { supported: false }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BulkSupport {
    pub supported: bool,
    pub max_operations: u32,
    pub max_payload_size: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FilterSupport {
    pub supported: bool,
    pub max_results: usize,
}
