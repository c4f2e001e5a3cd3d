//! Schema definitions and validation for SCIM resources.
//!
//! This module provides the schema registry and the validation engine that
//! checks resource documents against RFC 7643 schemas.
//!
//! # Key Types
//!
//! - [`Schema`] - SCIM schema definition with attributes and metadata
//! - [`SchemaRegistry`] - Registry for managing and accessing schemas
//! - [`AttributeDefinition`] - Individual attribute specifications and constraints
//! - [`ResourceSchemas`] - The schemas governing one resource type
//! - [`NormalizedResource`] - Validator output, ready for storage
//!
//! # Examples
//!
//! ```rust
//! use scim_engine::schema::{SchemaRegistry, ValidationContext};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = SchemaRegistry::with_embedded_schemas()?;
//! let user = json!({
//!     "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
//!     "userName": "bjensen",
//!     "name": { "givenName": "Barbara" }
//! });
//! let normalized = registry.validate_resource("User", &user, ValidationContext::create())?;
//! assert_eq!(normalized.attributes["userName"], "bjensen");
//! # Ok(())
//! # }
//! ```

pub mod embedded;
pub mod path;
pub mod registry;
pub mod types;
pub mod validation;


// Re-export the main types for convenience
pub use path::AttributePath;
pub use registry::{ResolvedAttribute, ResourceSchemas, SchemaRegistry};
pub use types::{
    AttributeDefinition, AttributeType, Mutability, ResourceType, Schema, SchemaExtension,
    Uniqueness,
};
pub use validation::{NormalizedResource, UniqueValue, ValidationContext, ValidationMode};

use serde_json::{Map, Value};

/// Look up a key ignoring ASCII case, preferring an exact match.
pub(crate) fn get_ignore_case<'m>(map: &'m Map<String, Value>, name: &str) -> Option<&'m Value> {
    map.get(name).or_else(|| {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

/// The stored key matching `name` ignoring ASCII case.
pub(crate) fn key_ignore_case(map: &Map<String, Value>, name: &str) -> Option<String> {
    if map.contains_key(name) {
        return Some(name.to_string());
    }
    map.keys().find(|key| key.eq_ignore_ascii_case(name)).cloned()
}

/// Null, empty strings, empty arrays and empty objects count as unassigned.
pub(crate) fn is_assigned(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

/// JSON type name used in type-mismatch reports.
pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "decimal",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "complex",
    }
}
