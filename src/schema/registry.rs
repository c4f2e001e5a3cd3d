//! Schema registry for loading, managing, and accessing SCIM schemas.
//!
//! The registry owns every declared [`Schema`] and [`ResourceType`]. It is
//! assembled once at startup, then shared read-only (usually behind an
//! `Arc`) by the validator, the PATCH applier, the filter evaluator and the
//! resource store.

use super::embedded;
use super::path::AttributePath;
use super::types::{AttributeDefinition, ResourceType, Schema, find_attribute};
use crate::error::{BuildError, BuildResult, ScimError, ScimResult, ValidationError};

use log::debug;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Registry of schemas and the resource types built on them.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: Vec<Schema>,
    resource_types: Vec<ResourceType>,
    common_attributes: Vec<AttributeDefinition>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    ///
    /// Only the common attributes (`id`, `externalId`, `meta`) are known.
    /// Use this to assemble synthetic schemas in tests or custom deployments.
    pub fn new() -> Self {
        Self {
            schemas: Vec::new(),
            resource_types: Vec::new(),
            common_attributes: embedded::common_attributes(),
        }
    }

    /// Create a registry holding the User, Group and EnterpriseUser schemas
    /// along with the `User` and `Group` resource types.
    pub fn with_embedded_schemas() -> BuildResult<Self> {
        let mut registry = Self::new();
        registry.register(Self::load_schema_from_str(embedded::core_user_schema(), "<embedded User>")?)?;
        registry.register(Self::load_schema_from_str(embedded::core_group_schema(), "<embedded Group>")?)?;
        registry.register(Self::load_schema_from_str(
            embedded::enterprise_user_schema(),
            "<embedded EnterpriseUser>",
        )?)?;
        registry.register_standard_resource_types()?;
        Ok(registry)
    }

    /// Create a registry by loading every `*.json` schema in a directory.
    ///
    /// The `User` and `Group` resource types are registered for whichever of
    /// the core schemas the directory provides; the enterprise extension is
    /// attached to `User` when present.
    pub fn from_schema_dir<P: AsRef<Path>>(schema_dir: P) -> BuildResult<Self> {
        let dir = schema_dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|e| BuildError::SchemaLoad {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut registry = Self::new();
        for path in paths {
            registry.register(Self::load_schema_from_file(&path)?)?;
        }
        registry.register_standard_resource_types()?;
        Ok(registry)
    }

    /// Load a schema from a JSON file.
    pub fn load_schema_from_file<P: AsRef<Path>>(path: P) -> BuildResult<Schema> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| BuildError::SchemaLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::load_schema_from_str(&content, &path.display().to_string())
    }

    /// Load a schema from a JSON string. `origin` names the source in errors.
    pub fn load_schema_from_str(content: &str, origin: &str) -> BuildResult<Schema> {
        serde_json::from_str(content).map_err(|e| BuildError::SchemaLoad {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    fn register_standard_resource_types(&mut self) -> BuildResult<()> {
        if self.schema(embedded::USER_SCHEMA).is_some() {
            let mut user = ResourceType::new("User", "/Users", embedded::USER_SCHEMA)
                .with_description("User Account");
            if self.schema(embedded::ENTERPRISE_USER_SCHEMA).is_some() {
                user = user.with_extension(embedded::ENTERPRISE_USER_SCHEMA, false);
            }
            self.register_resource_type(user)?;
        }
        if self.schema(embedded::GROUP_SCHEMA).is_some() {
            self.register_resource_type(ResourceType::new(
                "Group",
                "/Groups",
                embedded::GROUP_SCHEMA,
            ))?;
        }
        Ok(())
    }

    /// Register a schema.
    ///
    /// Fails with [`BuildError::DuplicateSchemaId`] if the URN is already
    /// registered, or [`BuildError::InvalidSchema`] if the declaration breaks
    /// a structural rule (see [`SchemaRegistry::check_schema`]).
    pub fn register(&mut self, schema: Schema) -> BuildResult<()> {
        if self.schema(&schema.id).is_some() {
            return Err(BuildError::DuplicateSchemaId {
                schema_id: schema.id,
            });
        }
        Self::check_schema(&schema)?;
        debug!(
            "Registered schema {} ({} attributes)",
            schema.id,
            schema.attributes.len()
        );
        self.schemas.push(schema);
        Ok(())
    }

    /// Register a resource type. Its base schema and every extension must
    /// already be registered.
    pub fn register_resource_type(&mut self, resource_type: ResourceType) -> BuildResult<()> {
        if self
            .resource_types
            .iter()
            .any(|rt| rt.name.eq_ignore_ascii_case(&resource_type.name))
        {
            return Err(BuildError::DuplicateResourceType {
                name: resource_type.name,
            });
        }
        let referenced = std::iter::once(&resource_type.schema)
            .chain(resource_type.schema_extensions.iter().map(|ext| &ext.schema));
        for schema_id in referenced {
            if self.schema(schema_id).is_none() {
                return Err(BuildError::UnknownSchema {
                    schema_id: schema_id.clone(),
                });
            }
        }
        debug!(
            "Registered resource type {} at {}",
            resource_type.name, resource_type.endpoint
        );
        self.resource_types.push(resource_type);
        Ok(())
    }

    /// Structural checks applied to every schema before registration.
    ///
    /// The id must be a URN, attribute names must be non-empty and unique
    /// among their siblings, complex attributes need at least one
    /// sub-attribute and non-complex attributes may not declare any.
    pub fn check_schema(schema: &Schema) -> BuildResult<()> {
        let invalid = |message: String| BuildError::InvalidSchema {
            schema_id: schema.id.clone(),
            message,
        };
        if !schema.id.to_ascii_lowercase().starts_with("urn:") {
            return Err(invalid("schema id must be a URN".to_string()));
        }
        if schema.name.trim().is_empty() {
            return Err(invalid("schema name is empty".to_string()));
        }
        check_attributes(&schema.attributes, "").map_err(invalid)
    }

    /// Get a specific schema by URN (case-insensitive).
    pub fn schema(&self, id: &str) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.id.eq_ignore_ascii_case(id))
    }

    /// All registered schemas in registration order.
    pub fn schemas(&self) -> &[Schema] {
        &self.schemas
    }

    pub fn resource_types(&self) -> &[ResourceType] {
        &self.resource_types
    }

    /// Attributes shared by every resource type.
    pub fn common_attributes(&self) -> &[AttributeDefinition] {
        &self.common_attributes
    }

    /// Find a resource type by name or endpoint (case-insensitive).
    pub fn resolve(&self, name: &str) -> ScimResult<&ResourceType> {
        let trimmed = name.trim_start_matches('/');
        self.resource_types
            .iter()
            .find(|rt| rt.name.eq_ignore_ascii_case(trimmed) || rt.endpoint_name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ScimError::UnknownResourceType(name.to_string()))
    }

    /// Resolve a dotted path such as `name.givenName` or
    /// `emails[type eq "work"].value` to its definition.
    ///
    /// Bracketed filters are ignored for resolution. A URN prefix selects the
    /// schema the path is looked up in; otherwise `schema_id` is used. The
    /// first segment also matches the common attributes.
    pub fn attribute_definition(
        &self,
        schema_id: &str,
        path: &str,
    ) -> Result<&AttributeDefinition, ValidationError> {
        let unknown = || ValidationError::unknown_attribute(path, schema_id);
        let stripped = strip_filters(path);

        let (schema_id, dotted) = match stripped.rfind(':') {
            Some(index) => (&stripped[..index], &stripped[index + 1..]),
            None => (schema_id, stripped.as_str()),
        };
        let schema = self.schema(schema_id).ok_or_else(unknown)?;

        let mut segments = dotted.split('.');
        let first = segments.next().unwrap_or_default();
        let mut current = schema
            .attribute(first)
            .or_else(|| find_attribute(&self.common_attributes, first))
            .ok_or_else(unknown)?;
        for segment in segments {
            current = current.sub_attribute(segment).ok_or_else(unknown)?;
        }
        Ok(current)
    }

    /// Bundle the schemas governing a resource type.
    pub fn resource_schemas(&self, resource_type: &str) -> ScimResult<ResourceSchemas<'_>> {
        let resource_type = self.resolve(resource_type)?;
        let base = self.schema(&resource_type.schema).ok_or_else(|| {
            ScimError::internal(format!(
                "resource type {} refers to unregistered schema {}",
                resource_type.name, resource_type.schema
            ))
        })?;
        let mut extensions = Vec::with_capacity(resource_type.schema_extensions.len());
        for ext in &resource_type.schema_extensions {
            let schema = self.schema(&ext.schema).ok_or_else(|| {
                ScimError::internal(format!(
                    "resource type {} refers to unregistered extension {}",
                    resource_type.name, ext.schema
                ))
            })?;
            extensions.push((schema, ext.required));
        }
        Ok(ResourceSchemas {
            resource_type,
            base,
            extensions,
            common: &self.common_attributes,
        })
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn check_attributes(attributes: &[AttributeDefinition], parent: &str) -> Result<(), String> {
    let mut seen = HashSet::new();
    for attr in attributes {
        let qualified = if parent.is_empty() {
            attr.name.clone()
        } else {
            format!("{}.{}", parent, attr.name)
        };
        if attr.name.trim().is_empty() {
            return Err(format!("attribute with empty name under '{}'", parent));
        }
        if !seen.insert(attr.name.to_ascii_lowercase()) {
            return Err(format!("duplicate attribute name '{}'", qualified));
        }
        if attr.is_complex() {
            if attr.sub_attributes.is_empty() {
                return Err(format!("complex attribute '{}' has no sub-attributes", qualified));
            }
            if !parent.is_empty() {
                return Err(format!("complex attribute '{}' is nested too deeply", qualified));
            }
            check_attributes(&attr.sub_attributes, &qualified)?;
        } else if !attr.sub_attributes.is_empty() {
            return Err(format!(
                "{} attribute '{}' declares sub-attributes",
                attr.data_type.as_str(),
                qualified
            ));
        }
    }
    Ok(())
}

/// Remove `[...]` sections from a path, keeping what surrounds them.
fn strip_filters(path: &str) -> String {
    let mut depth = 0usize;
    path.chars()
        .filter(|c| match c {
            '[' => {
                depth += 1;
                false
            }
            ']' => {
                depth = depth.saturating_sub(1);
                false
            }
            _ => depth == 0,
        })
        .collect()
}

/// The schemas governing one resource type: base, extensions and the common
/// attributes.
#[derive(Debug, Clone)]
pub struct ResourceSchemas<'a> {
    pub resource_type: &'a ResourceType,
    pub base: &'a Schema,
    /// Extension schemas with their `required` flag
    pub extensions: Vec<(&'a Schema, bool)>,
    pub common: &'a [AttributeDefinition],
}

impl<'a> ResourceSchemas<'a> {
    /// Find an extension by URN (case-insensitive).
    pub fn extension(&self, urn: &str) -> Option<&'a Schema> {
        self.extensions
            .iter()
            .map(|(schema, _)| *schema)
            .find(|schema| schema.id.eq_ignore_ascii_case(urn))
    }

    /// Resolve an attribute path against the base schema, the common
    /// attributes, or the extension named by the path's URN.
    pub fn resolve(&self, path: &AttributePath) -> Option<ResolvedAttribute<'a>> {
        let (extension, attribute) = match &path.schema {
            Some(urn) if urn.eq_ignore_ascii_case(&self.base.id) => {
                (None, self.base_attribute(&path.attribute)?)
            }
            Some(urn) => {
                let extension = self.extension(urn)?;
                (Some(extension), extension.attribute(&path.attribute)?)
            }
            None => (None, self.base_attribute(&path.attribute)?),
        };
        let sub_attribute = match &path.sub_attribute {
            Some(sub) => Some(attribute.sub_attribute(sub)?),
            None => None,
        };
        Some(ResolvedAttribute {
            extension,
            attribute,
            sub_attribute,
        })
    }

    fn base_attribute(&self, name: &str) -> Option<&'a AttributeDefinition> {
        self.base
            .attribute(name)
            .or_else(|| find_attribute(self.common, name))
    }
}

/// An attribute path bound to its definitions.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedAttribute<'a> {
    /// Extension that holds the attribute; `None` for the base schema
    pub extension: Option<&'a Schema>,
    pub attribute: &'a AttributeDefinition,
    pub sub_attribute: Option<&'a AttributeDefinition>,
}

impl<'a> ResolvedAttribute<'a> {
    /// Definition of the innermost path segment.
    pub fn definition(&self) -> &'a AttributeDefinition {
        self.sub_attribute.unwrap_or(self.attribute)
    }

    /// The object holding the attribute: the extension object or the root.
    pub fn container<'m>(&self, attributes: &'m Map<String, Value>) -> Option<&'m Map<String, Value>> {
        match self.extension {
            Some(ext) => super::get_ignore_case(attributes, &ext.id)?.as_object(),
            None => Some(attributes),
        }
    }
}
