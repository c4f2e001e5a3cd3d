//! Stored SCIM resource representation.
//!
//! A [`Resource`] is the validated attribute document plus the fields the
//! server owns: `id`, `schemas` and `meta`. Its JSON form is what clients
//! see and what the store persists.

use super::meta::Meta;
use super::version::{HttpVersion, RawVersion};
use crate::error::{ScimError, ScimResult};
use crate::schema::NormalizedResource;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A SCIM resource as held by the store.
///
/// `attributes` never contains `id`, `schemas` or `meta`; extension data is
/// nested under its schema URN.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Server-assigned identifier, stable for the resource's lifetime
    pub id: String,
    /// Resource type name (e.g. "User", "Group")
    pub resource_type: String,
    pub schemas: Vec<String>,
    pub attributes: Map<String, Value>,
    pub meta: Meta,
}

impl Resource {
    /// Wrap a validated document with its server-managed fields.
    pub fn from_normalized(id: impl Into<String>, normalized: NormalizedResource, meta: Meta) -> Self {
        Self {
            id: id.into(),
            resource_type: meta.resource_type.clone(),
            schemas: normalized.schemas,
            attributes: normalized.attributes,
            meta,
        }
    }

    /// Parse the JSON representation produced by [`Resource::to_json`].
    ///
    /// # Example
    /// ```rust
    /// use scim_engine::resource::Resource;
    /// use serde_json::json;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let resource = Resource::from_json(&json!({
    ///     "schemas": ["urn:ietf:params:scim:schemas:core:2.0:Group"],
    ///     "id": "e9e30dba",
    ///     "displayName": "Tour Guides",
    ///     "meta": {
    ///         "resourceType": "Group",
    ///         "created": "2024-05-01T10:00:00Z",
    ///         "lastModified": "2024-05-01T10:00:00Z",
    ///         "version": "W/\"3694e05e\""
    ///     }
    /// }))?;
    /// assert_eq!(resource.etag(), "W/\"3694e05e\"");
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_json(data: &Value) -> ScimResult<Self> {
        let object = data
            .as_object()
            .ok_or_else(|| ScimError::invalid_request("Resource must be a JSON object"))?;

        let id = object
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ScimError::invalid_request("Resource is missing its 'id'"))?
            .to_string();

        let schemas = match object.get("schemas") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        ScimError::invalid_request("'schemas' must contain only strings")
                    })
                })
                .collect::<ScimResult<Vec<_>>>()?,
            _ => return Err(ScimError::invalid_request("Resource is missing 'schemas'")),
        };

        let meta: Meta = object
            .get("meta")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .ok_or_else(|| ScimError::invalid_request("Resource is missing 'meta'"))?;

        let mut attributes = object.clone();
        attributes.remove("id");
        attributes.remove("schemas");
        attributes.remove("meta");

        Ok(Self {
            id,
            resource_type: meta.resource_type.clone(),
            schemas,
            attributes,
            meta,
        })
    }

    /// Full JSON representation: `schemas`, `id`, attributes, then `meta`.
    pub fn to_json(&self) -> ScimResult<Value> {
        let mut result = Map::new();
        result.insert(
            "schemas".to_string(),
            Value::Array(self.schemas.iter().cloned().map(Value::String).collect()),
        );
        result.insert("id".to_string(), Value::String(self.id.clone()));
        for (key, value) in &self.attributes {
            result.insert(key.clone(), value.clone());
        }
        result.insert("meta".to_string(), serde_json::to_value(&self.meta)?);
        Ok(Value::Object(result))
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    /// Data held under an extension schema URN.
    pub fn extension(&self, urn: &str) -> Option<&Map<String, Value>> {
        self.attributes.get(urn).and_then(Value::as_object)
    }

    pub fn version(&self) -> &RawVersion {
        &self.meta.version
    }

    /// `ETag` header value for this resource.
    pub fn etag(&self) -> String {
        HttpVersion::from(self.meta.version.clone()).to_string()
    }

    pub fn location(&self) -> Option<&str> {
        self.meta.location.as_deref()
    }
}

impl Serialize for Resource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Resource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Resource::from_json(&value).map_err(serde::de::Error::custom)
    }
}
