//! Schema validation logic for SCIM resources.
//!
//! The validator walks the declared attribute tree of a resource type and the
//! candidate document side by side. Every violation is collected, so a single
//! report lists all problems with the document. The output is a normalized
//! document with canonical key casing, client-supplied `readOnly` values
//! replaced by the stored ones, and the values that must be checked against
//! the uniqueness index.

use super::registry::{ResourceSchemas, SchemaRegistry};
use super::types::{
    AttributeDefinition, AttributeType, Mutability, Schema, Uniqueness, find_attribute,
};
use super::{get_ignore_case, is_assigned, value_type_name};
use crate::error::{ScimResult, ValidationError, ValidationErrors, ValidationResult};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, FixedOffset};
use log::trace;
use serde_json::{Map, Value};

/// Which write the document is validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// New resource: no stored state exists
    Create,
    /// Full replacement: fixed attributes omitted from the document keep
    /// their stored value
    Replace,
    /// Post-PATCH document: it is the complete intended state, so a fixed
    /// attribute missing from it has been removed
    PartialCheck,
}

/// Mode plus the stored attributes the document is compared with.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub mode: ValidationMode,
    pub prior: Option<&'a Map<String, Value>>,
}

impl<'a> ValidationContext<'a> {
    pub fn create() -> Self {
        Self {
            mode: ValidationMode::Create,
            prior: None,
        }
    }

    pub fn replace(prior: &'a Map<String, Value>) -> Self {
        Self {
            mode: ValidationMode::Replace,
            prior: Some(prior),
        }
    }

    pub fn partial_check(prior: &'a Map<String, Value>) -> Self {
        Self {
            mode: ValidationMode::PartialCheck,
            prior: Some(prior),
        }
    }
}

/// A validated document, ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResource {
    /// Base schema URN followed by the URN of every extension with data
    pub schemas: Vec<String>,
    /// Attributes with canonical casing; extension data nested under its URN
    pub attributes: Map<String, Value>,
    /// Values of `server`/`global` unique attributes to reserve
    pub unique_values: Vec<UniqueValue>,
}

/// A value that must not be claimed by another resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueValue {
    pub scope: Uniqueness,
    /// Canonical attribute path, URN-qualified for extension attributes
    pub attribute: String,
    /// Lowercased unless the attribute is `caseExact`
    pub normalized: String,
    /// Value as submitted, for error reports
    pub display: String,
}

impl SchemaRegistry {
    /// Validate a document for the named resource type.
    pub fn validate_resource(
        &self,
        resource_type: &str,
        document: &Value,
        context: ValidationContext<'_>,
    ) -> ScimResult<NormalizedResource> {
        let schemas = self.resource_schemas(resource_type)?;
        Ok(schemas.validate(document, context)?)
    }
}

impl ResourceSchemas<'_> {
    /// Check and normalize a candidate document.
    ///
    /// `id`, `meta` and `schemas` are server-managed and skipped; `schemas`
    /// is rebuilt from the extensions that carry data.
    pub fn validate(
        &self,
        document: &Value,
        context: ValidationContext<'_>,
    ) -> ValidationResult<NormalizedResource> {
        let Some(input) = document.as_object() else {
            return Err(ValidationError::type_mismatch(
                "resource",
                "complex",
                value_type_name(document),
            )
            .into());
        };
        trace!("Validating {} document: {}", self.resource_type.name, document);

        let mut walker = Walker {
            mode: context.mode,
            schema_id: &self.base.id,
            errors: Vec::new(),
            unique_values: Vec::new(),
        };

        walker.check_declared_schemas(self, input);
        for key in input.keys() {
            if is_server_managed(key) || self.extension(key).is_some() {
                continue;
            }
            let declared =
                self.base.attribute(key).is_some() || find_attribute(self.common, key).is_some();
            if !declared {
                walker
                    .errors
                    .push(ValidationError::unknown_attribute(key, &self.base.id));
            }
        }

        let mut attributes = Map::new();
        walker.attributes(&self.base.attributes, input, context.prior, "", false, &mut attributes);
        let common: Vec<&AttributeDefinition> = self
            .common
            .iter()
            .filter(|attr| !is_server_managed(&attr.name))
            .collect();
        for def in common {
            walker.attribute_into(def, input, context.prior, "", false, &mut attributes);
        }

        let mut schemas = vec![self.base.id.clone()];
        for (extension, required) in &self.extensions {
            if let Some(data) = walker.extension(extension, input, context.prior) {
                attributes.insert(extension.id.clone(), Value::Object(data));
                schemas.push(extension.id.clone());
            } else if *required {
                walker.errors.push(ValidationError::missing_required(&extension.id));
            }
        }

        match ValidationErrors::from_vec(walker.errors) {
            Some(errors) => Err(errors),
            None => Ok(NormalizedResource {
                schemas,
                attributes,
                unique_values: walker.unique_values,
            }),
        }
    }
}

fn is_server_managed(key: &str) -> bool {
    ["schemas", "id", "meta"]
        .iter()
        .any(|managed| key.eq_ignore_ascii_case(managed))
}

/// Collects violations while walking one document.
struct Walker<'s> {
    mode: ValidationMode,
    /// Schema currently being walked, for unknown-attribute reports
    schema_id: &'s str,
    errors: Vec<ValidationError>,
    unique_values: Vec<UniqueValue>,
}

impl<'s> Walker<'s> {
    fn check_declared_schemas(&mut self, schemas: &ResourceSchemas<'_>, input: &Map<String, Value>) {
        let Some(declared) = get_ignore_case(input, "schemas") else {
            return;
        };
        let Some(urns) = declared.as_array() else {
            self.errors.push(ValidationError::multiplicity("schemas", true));
            return;
        };
        for urn in urns {
            match urn.as_str() {
                Some(urn) => {
                    let known = urn.eq_ignore_ascii_case(&schemas.base.id)
                        || schemas.extension(urn).is_some();
                    if !known {
                        self.errors
                            .push(ValidationError::unknown_attribute(urn, &schemas.base.id));
                    }
                }
                None => self.errors.push(ValidationError::type_mismatch(
                    "schemas",
                    "string",
                    value_type_name(urn),
                )),
            }
        }
    }

    /// Validate the object stored under an extension URN. Returns `None` when
    /// the extension carries no data.
    fn extension(
        &mut self,
        extension: &'s Schema,
        input: &Map<String, Value>,
        prior: Option<&Map<String, Value>>,
    ) -> Option<Map<String, Value>> {
        let prior = prior
            .and_then(|p| get_ignore_case(p, &extension.id))
            .and_then(Value::as_object);
        let empty = Map::new();
        let data = match get_ignore_case(input, &extension.id) {
            Some(Value::Object(data)) => data,
            Some(value) if is_assigned(value) => {
                self.errors.push(ValidationError::type_mismatch(
                    &extension.id,
                    "complex",
                    value_type_name(value),
                ));
                return None;
            }
            // Absent: only stored state can contribute
            _ => {
                prior?;
                &empty
            }
        };

        let outer = std::mem::replace(&mut self.schema_id, &extension.id);
        for key in data.keys() {
            if extension.attribute(key).is_none() {
                self.errors.push(ValidationError::unknown_attribute(
                    format!("{}:{}", extension.id, key),
                    &extension.id,
                ));
            }
        }
        let mut out = Map::new();
        let prefix = format!("{}:", extension.id);
        self.attributes(&extension.attributes, data, prior, &prefix, false, &mut out);
        self.schema_id = outer;

        (!out.is_empty()).then_some(out)
    }

    fn attributes(
        &mut self,
        definitions: &[AttributeDefinition],
        input: &Map<String, Value>,
        prior: Option<&Map<String, Value>>,
        prefix: &str,
        in_element: bool,
        out: &mut Map<String, Value>,
    ) {
        for def in definitions {
            self.attribute_into(def, input, prior, prefix, in_element, out);
        }
    }

    fn attribute_into(
        &mut self,
        def: &AttributeDefinition,
        input: &Map<String, Value>,
        prior: Option<&Map<String, Value>>,
        prefix: &str,
        in_element: bool,
        out: &mut Map<String, Value>,
    ) {
        let path = join_path(prefix, &def.name);
        let value = get_ignore_case(input, &def.name);
        let prior = prior
            .and_then(|p| get_ignore_case(p, &def.name))
            .filter(|v| is_assigned(v));
        if let Some(normalized) = self.attribute(def, value, prior, &path, in_element) {
            out.insert(def.name.clone(), normalized);
        }
    }

    /// Validate one attribute. Returns the normalized value to store.
    fn attribute(
        &mut self,
        def: &AttributeDefinition,
        value: Option<&Value>,
        prior: Option<&Value>,
        path: &str,
        in_element: bool,
    ) -> Option<Value> {
        let value = value.filter(|v| is_assigned(v));

        if def.mutability == Mutability::ReadOnly {
            // Server-authoritative: whatever the client sent, the stored value stands.
            return match self.mode {
                ValidationMode::Create => None,
                _ => prior.cloned(),
            };
        }

        if !in_element && def.mutability.is_fixed_once_set() && self.mode != ValidationMode::Create {
            if let Some(stored) = prior {
                match value {
                    None if self.mode == ValidationMode::Replace => return Some(stored.clone()),
                    None => {
                        self.errors.push(ValidationError::immutable(path));
                        return None;
                    }
                    Some(submitted) if !same_value(def, submitted, stored) => {
                        self.errors.push(ValidationError::immutable(path));
                        return None;
                    }
                    Some(_) => {}
                }
            }
        }

        let errors_before = self.errors.len();
        let normalized = match value {
            None => None,
            Some(value) if def.multi_valued => self.multi_value(def, value, path),
            Some(Value::Array(_)) => {
                self.errors.push(ValidationError::multiplicity(path, false));
                None
            }
            Some(value) => self.single_value(def, value, prior, path, in_element),
        };

        if normalized.is_none() {
            if def.required && self.errors.len() == errors_before {
                self.errors.push(ValidationError::missing_required(path));
            }
            return None;
        }

        if self.errors.len() == errors_before
            && def.uniqueness != Uniqueness::None
            && !def.multi_valued
            && !in_element
        {
            if let Some(v) = normalized.as_ref().and_then(|v| unique_value(def, path, v)) {
                self.unique_values.push(v);
            }
        }
        normalized
    }

    fn multi_value(&mut self, def: &AttributeDefinition, value: &Value, path: &str) -> Option<Value> {
        let Value::Array(items) = value else {
            self.errors.push(ValidationError::multiplicity(path, true));
            return None;
        };

        let primaries = items
            .iter()
            .filter_map(Value::as_object)
            .filter(|item| get_ignore_case(item, "primary") == Some(&Value::Bool(true)))
            .count();
        if primaries > 1 && def.has_primary_flag() {
            self.errors.push(ValidationError::MultiplePrimaryValues {
                attribute: path.to_string(),
            });
        }

        let mut elements = Vec::with_capacity(items.len());
        for item in items {
            if item.is_array() {
                self.errors.push(ValidationError::type_mismatch(
                    path,
                    def.data_type.as_str(),
                    "array",
                ));
                continue;
            }
            if !is_assigned(item) {
                continue;
            }
            if let Some(element) = self.single_value(def, item, None, path, true) {
                elements.push(element);
            }
        }
        (!elements.is_empty()).then_some(Value::Array(elements))
    }

    /// Type-check one value (a scalar, a complex object, or one element of a
    /// multi-valued attribute).
    fn single_value(
        &mut self,
        def: &AttributeDefinition,
        value: &Value,
        prior: Option<&Value>,
        path: &str,
        in_element: bool,
    ) -> Option<Value> {
        let valid = match def.data_type {
            AttributeType::String => value.is_string(),
            AttributeType::Boolean => value.is_boolean(),
            AttributeType::Integer => value.is_i64(),
            AttributeType::Decimal => value.is_number(),
            AttributeType::DateTime => value
                .as_str()
                .is_some_and(|s| DateTime::<FixedOffset>::parse_from_rfc3339(s).is_ok()),
            AttributeType::Binary => value.as_str().is_some_and(|s| STANDARD.decode(s).is_ok()),
            AttributeType::Reference => value.as_str().is_some_and(|s| !s.trim().is_empty()),
            AttributeType::Complex => {
                return match value {
                    Value::Object(map) => {
                        self.complex(def, map, prior.and_then(Value::as_object), path, in_element)
                    }
                    other => {
                        self.errors.push(ValidationError::type_mismatch(
                            path,
                            "complex",
                            value_type_name(other),
                        ));
                        None
                    }
                };
            }
        };

        if valid {
            Some(value.clone())
        } else {
            let actual = match value {
                Value::String(s) => format!("string '{}'", s),
                other => value_type_name(other).to_string(),
            };
            self.errors.push(ValidationError::type_mismatch(
                path,
                def.data_type.as_str(),
                actual,
            ));
            None
        }
    }

    fn complex(
        &mut self,
        def: &AttributeDefinition,
        input: &Map<String, Value>,
        prior: Option<&Map<String, Value>>,
        path: &str,
        in_element: bool,
    ) -> Option<Value> {
        for key in input.keys() {
            if def.sub_attribute(key).is_none() {
                self.errors.push(ValidationError::unknown_attribute(
                    format!("{}.{}", path, key),
                    self.schema_id,
                ));
            }
        }
        let mut out = Map::new();
        let prefix = format!("{}.", path);
        self.attributes(&def.sub_attributes, input, prior, &prefix, in_element, &mut out);
        (!out.is_empty()).then_some(Value::Object(out))
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    format!("{}{}", prefix, name)
}

/// Equality used for fixed attributes: strings compare case-insensitively
/// unless the attribute is `caseExact`.
fn same_value(def: &AttributeDefinition, submitted: &Value, stored: &Value) -> bool {
    match (submitted, stored) {
        (Value::String(a), Value::String(b)) if !def.case_exact => a.to_lowercase() == b.to_lowercase(),
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => submitted == stored,
    }
}

fn unique_value(def: &AttributeDefinition, path: &str, value: &Value) -> Option<UniqueValue> {
    let display = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    let normalized = if def.case_exact || !value.is_string() {
        display.clone()
    } else {
        display.to_lowercase()
    };
    Some(UniqueValue {
        scope: def.uniqueness,
        attribute: path.to_string(),
        normalized,
        display,
    })
}
