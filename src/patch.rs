//! PATCH application (RFC 7644 §3.5.2).
//!
//! Operations are applied in order to a working copy of the stored
//! attributes. The result is re-validated as a whole in
//! [`ValidationMode::PartialCheck`](crate::schema::ValidationMode), and only
//! then handed back to the store. Any failure discards the working copy, so a
//! batch either applies completely or not at all.
//!
//! A failing operation does not stop the batch unless its path, filter or op
//! name is unreadable: the remaining operations and the final validation
//! still run, and every failure is reported in one error.

use crate::error::{ScimError, ScimResult, ValidationError};
use crate::filter::{FilterExpr, FilterParser, FilterValue, matches_element};
use crate::schema::{
    AttributeDefinition, AttributePath, NormalizedResource, ResourceSchemas, Schema,
    ValidationContext,
};
use crate::schema::{is_assigned, key_ignore_case};

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema URN of a PATCH request body.
pub const PATCH_OP_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

/// A PATCH request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchRequest {
    #[serde(default)]
    pub schemas: Vec<String>,
    #[serde(rename = "Operations", alias = "operations")]
    pub operations: Vec<PatchOperation>,
}

impl PatchRequest {
    pub fn new(operations: Vec<PatchOperation>) -> Self {
        Self {
            schemas: vec![PATCH_OP_SCHEMA.to_string()],
            operations,
        }
    }

    /// Check the envelope: the PatchOp schema (when `schemas` is given) and
    /// at least one operation.
    pub fn check_envelope(&self) -> ScimResult<()> {
        if !self.schemas.is_empty()
            && !self
                .schemas
                .iter()
                .any(|s| s.eq_ignore_ascii_case(PATCH_OP_SCHEMA))
        {
            return Err(ScimError::invalid_request(format!(
                "PATCH body must declare schema {}",
                PATCH_OP_SCHEMA
            )));
        }
        if self.operations.is_empty() {
            return Err(ScimError::invalid_request("PATCH body has no operations"));
        }
        Ok(())
    }
}

/// One PATCH operation as sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOperation {
    pub fn add(path: Option<&str>, value: Value) -> Self {
        Self {
            op: "add".to_string(),
            path: path.map(str::to_string),
            value: Some(value),
        }
    }

    pub fn replace(path: Option<&str>, value: Value) -> Self {
        Self {
            op: "replace".to_string(),
            path: path.map(str::to_string),
            value: Some(value),
        }
    }

    pub fn remove(path: &str) -> Self {
        Self {
            op: "remove".to_string(),
            path: Some(path.to_string()),
            value: None,
        }
    }

    /// Operation kind; op names are case-insensitive.
    pub fn kind(&self) -> ScimResult<PatchOpKind> {
        match self.op.to_ascii_lowercase().as_str() {
            "add" => Ok(PatchOpKind::Add),
            "remove" => Ok(PatchOpKind::Remove),
            "replace" => Ok(PatchOpKind::Replace),
            _ => Err(ScimError::UnsupportedOperation {
                operation: self.op.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOpKind {
    Add,
    Remove,
    Replace,
}

/// What a PATCH path points at.
#[derive(Debug)]
enum Target<'a> {
    /// The whole object stored under an extension URN
    Extension(&'a Schema),
    Attribute {
        extension: Option<&'a Schema>,
        attribute: &'a AttributeDefinition,
        filter: Option<FilterExpr>,
        sub_attribute: Option<&'a AttributeDefinition>,
    },
}

/// Applies PATCH operations for one resource type.
pub struct PatchApplier<'s, 'r> {
    schemas: &'s ResourceSchemas<'r>,
}

impl<'s, 'r> PatchApplier<'s, 'r> {
    pub fn new(schemas: &'s ResourceSchemas<'r>) -> Self {
        Self { schemas }
    }

    /// Apply `operations` in order to `stored` and validate the outcome.
    ///
    /// `stored` is never modified.
    pub fn apply(
        &self,
        stored: &Map<String, Value>,
        operations: &[PatchOperation],
    ) -> ScimResult<NormalizedResource> {
        let mut document = stored.clone();
        let mut failures = Vec::new();
        for (index, operation) in operations.iter().enumerate() {
            trace!(
                "PATCH {} step {}: {} {:?}",
                self.schemas.resource_type.name,
                index,
                operation.op,
                operation.path
            );
            // A failed step leaves no partial edit behind
            let mut scratch = document.clone();
            match self.apply_one(&mut scratch, operation) {
                Ok(()) => document = scratch,
                Err(error) if ends_batch(&error) => {
                    failures.push(error);
                    return Err(collected(failures));
                }
                Err(error) => {
                    debug!("PATCH step {} skipped: {}", index, error);
                    failures.push(error);
                }
            }
        }

        match self
            .schemas
            .validate(&Value::Object(document), ValidationContext::partial_check(stored))
        {
            Ok(normalized) if failures.is_empty() => {
                debug!(
                    "Applied {} PATCH operation(s) to {}",
                    operations.len(),
                    self.schemas.resource_type.name
                );
                Ok(normalized)
            }
            Ok(_) => Err(collected(failures)),
            Err(errors) => {
                failures.push(errors.into());
                Err(collected(failures))
            }
        }
    }

    fn apply_one(&self, document: &mut Map<String, Value>, operation: &PatchOperation) -> ScimResult<()> {
        let kind = operation.kind()?;
        let target = match operation.path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => Some(self.parse_path(path)?),
            _ => None,
        };

        match kind {
            PatchOpKind::Remove => {
                let target = target.ok_or_else(|| ScimError::PathRequired {
                    operation: operation.op.clone(),
                })?;
                self.remove(document, target, operation.path.as_deref().unwrap_or_default())
            }
            PatchOpKind::Add | PatchOpKind::Replace => {
                let value = operation.value.clone().ok_or_else(|| {
                    ScimError::invalid_request(format!("'{}' operation requires a value", operation.op))
                })?;
                let path = operation.path.as_deref().unwrap_or_default();
                match target {
                    None => self.merge_root(document, value, kind),
                    Some(target) => self.write(document, target, value, kind, path),
                }
            }
        }
    }

    /// Parse `[urn:]attr[.sub]`, `attr[filter][.sub]` or a bare extension URN.
    fn parse_path(&self, raw: &str) -> ScimResult<Target<'r>> {
        if let Some(extension) = self.schemas.extension(raw) {
            return Ok(Target::Extension(extension));
        }

        let (head, filter, tail) = match raw.find('[') {
            Some(open) => {
                let close = raw
                    .rfind(']')
                    .filter(|close| *close > open)
                    .ok_or_else(|| ScimError::malformed_path(raw, "unbalanced '['"))?;
                let filter = FilterParser::new(&raw[open + 1..close])
                    .parse()
                    .map_err(|e| ScimError::malformed_path(raw, e.to_string()))?;
                (&raw[..open], Some(filter), &raw[close + 1..])
            }
            None => (raw, None, ""),
        };

        let mut path = AttributePath::parse(head).map_err(|reason| ScimError::malformed_path(raw, reason))?;
        if !tail.is_empty() {
            let sub = tail
                .strip_prefix('.')
                .filter(|_| path.sub_attribute.is_none())
                .ok_or_else(|| ScimError::malformed_path(raw, "expected '.subAttribute' after ']'"))?;
            let sub_path = AttributePath::parse(sub).map_err(|reason| ScimError::malformed_path(raw, reason))?;
            if sub_path.schema.is_some() || sub_path.sub_attribute.is_some() {
                return Err(ScimError::malformed_path(raw, "expected a single sub-attribute name"));
            }
            path.sub_attribute = Some(sub_path.attribute);
        } else if filter.is_some() && path.sub_attribute.is_some() {
            return Err(ScimError::malformed_path(raw, "value filter must follow the attribute name"));
        }

        let resolved = self.schemas.resolve(&path).ok_or_else(|| {
            let schema_id = path.schema.as_deref().unwrap_or(&self.schemas.base.id);
            ScimError::from(ValidationError::unknown_attribute(raw, schema_id))
        })?;
        if path.sub_attribute.is_some() && !resolved.attribute.is_complex() {
            return Err(ScimError::malformed_path(raw, "only complex attributes have sub-attributes"));
        }
        if filter.is_some() && !resolved.attribute.multi_valued {
            return Err(ScimError::malformed_path(
                raw,
                "value filters apply to multi-valued attributes only",
            ));
        }

        Ok(Target::Attribute {
            extension: resolved.extension,
            attribute: resolved.attribute,
            filter,
            sub_attribute: resolved.sub_attribute,
        })
    }

    /// Path-less add/replace: the value is an object of attributes.
    fn merge_root(&self, document: &mut Map<String, Value>, value: Value, kind: PatchOpKind) -> ScimResult<()> {
        let Value::Object(entries) = value else {
            return Err(ScimError::invalid_request(
                "operation without a path requires an object value",
            ));
        };
        for (key, value) in entries {
            if ["schemas", "id", "meta"].iter().any(|k| key.eq_ignore_ascii_case(k)) {
                continue;
            }
            if let Some(extension) = self.schemas.extension(&key) {
                self.merge_extension(document, extension, value, kind)?;
                continue;
            }
            let definition = self
                .schemas
                .base
                .attribute(&key)
                .or_else(|| crate::schema::types::find_attribute(self.schemas.common, &key));
            match definition {
                Some(def) => set_attribute(document, def, value, kind),
                // Left for validation to report
                None => {
                    document.insert(key, value);
                }
            }
        }
        Ok(())
    }

    fn merge_extension(
        &self,
        document: &mut Map<String, Value>,
        extension: &Schema,
        value: Value,
        kind: PatchOpKind,
    ) -> ScimResult<()> {
        let Value::Object(entries) = value else {
            return Err(ScimError::invalid_request(format!(
                "value for extension {} must be an object",
                extension.id
            )));
        };
        let container = extension_mut(document, extension)?;
        for (key, value) in entries {
            match extension.attribute(&key) {
                Some(def) => set_attribute(container, def, value, kind),
                None => {
                    container.insert(key, value);
                }
            }
        }
        Ok(())
    }

    fn write(
        &self,
        document: &mut Map<String, Value>,
        target: Target<'r>,
        value: Value,
        kind: PatchOpKind,
        raw_path: &str,
    ) -> ScimResult<()> {
        let (extension, attribute, filter, sub_attribute) = match target {
            Target::Extension(extension) => {
                return self.merge_extension(document, extension, value, kind);
            }
            Target::Attribute {
                extension,
                attribute,
                filter,
                sub_attribute,
            } => (extension, attribute, filter, sub_attribute),
        };
        let container = match extension {
            Some(extension) => extension_mut(document, extension)?,
            None => document,
        };

        match (filter, sub_attribute) {
            (None, None) => {
                set_attribute(container, attribute, value, kind);
                Ok(())
            }
            (None, Some(sub)) if !attribute.multi_valued => {
                let key = slot_key(container, attribute);
                let slot = container
                    .entry(key)
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(object) = slot {
                    set_attribute(object, sub, value, kind);
                }
                Ok(())
            }
            (None, Some(sub)) => {
                let elements = elements_mut(container, attribute)?;
                if elements.is_empty() {
                    return Err(ScimError::NoTargetMatched {
                        path: raw_path.to_string(),
                    });
                }
                for element in elements.iter_mut().filter_map(Value::as_object_mut) {
                    set_attribute(element, sub, value.clone(), kind);
                }
                Ok(())
            }
            (Some(filter), sub) => {
                let elements = elements_mut(container, attribute)?;
                let matched: Vec<usize> = elements
                    .iter()
                    .enumerate()
                    .filter(|(_, element)| matches_element(&filter, attribute, element))
                    .map(|(index, _)| index)
                    .collect();

                if matched.is_empty() {
                    if kind == PatchOpKind::Replace {
                        return Err(ScimError::NoTargetMatched {
                            path: raw_path.to_string(),
                        });
                    }
                    elements.push(seed_element(&filter, attribute, sub, value));
                    return Ok(());
                }
                if kind == PatchOpKind::Add {
                    return Err(ScimError::TargetExists {
                        path: raw_path.to_string(),
                    });
                }

                for index in matched {
                    let element = &mut elements[index];
                    match (sub, element) {
                        (Some(sub), Value::Object(object)) => {
                            set_attribute(object, sub, value.clone(), kind);
                        }
                        (Some(_), _) => {}
                        (None, element) => *element = value.clone(),
                    }
                }
                Ok(())
            }
        }
    }

    fn remove(&self, document: &mut Map<String, Value>, target: Target<'r>, raw_path: &str) -> ScimResult<()> {
        let (extension, attribute, filter, sub_attribute) = match target {
            Target::Extension(extension) => {
                if let Some(key) = key_ignore_case(document, &extension.id) {
                    document.remove(&key);
                }
                return Ok(());
            }
            Target::Attribute {
                extension,
                attribute,
                filter,
                sub_attribute,
            } => (extension, attribute, filter, sub_attribute),
        };
        let container = match extension {
            Some(extension) => {
                let Some(key) = key_ignore_case(document, &extension.id) else {
                    return Ok(());
                };
                match document.get_mut(&key).and_then(Value::as_object_mut) {
                    Some(container) => container,
                    None => return Ok(()),
                }
            }
            None => document,
        };
        let Some(key) = key_ignore_case(container, &attribute.name) else {
            if filter.is_some() {
                return Err(ScimError::NoTargetMatched {
                    path: raw_path.to_string(),
                });
            }
            return Ok(());
        };

        match (filter, sub_attribute) {
            (None, None) => {
                container.remove(&key);
            }
            (None, Some(sub)) => match container.get_mut(&key) {
                Some(Value::Object(object)) => remove_key(object, &sub.name),
                Some(Value::Array(elements)) => {
                    for element in elements.iter_mut().filter_map(Value::as_object_mut) {
                        remove_key(element, &sub.name);
                    }
                }
                _ => {}
            },
            (Some(filter), sub) => {
                let Some(Value::Array(elements)) = container.get_mut(&key) else {
                    return Err(ScimError::NoTargetMatched {
                        path: raw_path.to_string(),
                    });
                };
                let before = elements.len();
                let mut matched = 0;
                match sub {
                    None => elements.retain(|element| {
                        let hit = matches_element(&filter, attribute, element);
                        if hit {
                            matched += 1;
                        }
                        !hit
                    }),
                    Some(sub) => {
                        for element in elements.iter_mut() {
                            if matches_element(&filter, attribute, element) {
                                matched += 1;
                                if let Value::Object(object) = element {
                                    remove_key(object, &sub.name);
                                }
                            }
                        }
                    }
                }
                if matched == 0 {
                    return Err(ScimError::NoTargetMatched {
                        path: raw_path.to_string(),
                    });
                }
                trace!("Removed {} of {} elements from {}", matched, before, attribute.name);
                if elements.is_empty() {
                    container.remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// Failures after which the rest of the batch cannot be checked.
fn ends_batch(error: &ScimError) -> bool {
    matches!(
        error,
        ScimError::MalformedPath { .. }
            | ScimError::MalformedFilter { .. }
            | ScimError::UnsupportedOperation { .. }
    )
}

fn collected(failures: Vec<ScimError>) -> ScimError {
    ScimError::combine(failures).unwrap_or_else(|| ScimError::internal("PATCH failed without a reason"))
}

/// Key an attribute is stored under: the existing spelling, else canonical.
fn slot_key(container: &Map<String, Value>, definition: &AttributeDefinition) -> String {
    key_ignore_case(container, &definition.name).unwrap_or_else(|| definition.name.clone())
}

fn remove_key(object: &mut Map<String, Value>, name: &str) {
    if let Some(key) = key_ignore_case(object, name) {
        object.remove(&key);
    }
}

/// The object under an extension URN, created when missing.
fn extension_mut<'d>(
    document: &'d mut Map<String, Value>,
    extension: &Schema,
) -> ScimResult<&'d mut Map<String, Value>> {
    let key = key_ignore_case(document, &extension.id).unwrap_or_else(|| extension.id.clone());
    let slot = document
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    slot.as_object_mut()
        .ok_or_else(|| ScimError::internal(format!("extension {} is not an object", extension.id)))
}

/// Elements of a multi-valued attribute, creating an empty array when needed.
fn elements_mut<'d>(
    container: &'d mut Map<String, Value>,
    definition: &AttributeDefinition,
) -> ScimResult<&'d mut Vec<Value>> {
    let key = slot_key(container, definition);
    let slot = container
        .entry(key)
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        let single = std::mem::take(slot);
        *slot = Value::Array(if is_assigned(&single) {
            vec![single]
        } else {
            Vec::new()
        });
    }
    slot.as_array_mut()
        .ok_or_else(|| ScimError::internal(format!("attribute {} is not an array", definition.name)))
}

/// RFC 7644 add/replace semantics for one attribute of a container.
///
/// `add` appends to multi-valued attributes and merges into complex ones;
/// `replace` overwrites.
fn set_attribute(container: &mut Map<String, Value>, definition: &AttributeDefinition, value: Value, kind: PatchOpKind) {
    let key = slot_key(container, definition);
    let value = match value {
        Value::Array(items) => Value::Array(items),
        single if definition.multi_valued && is_assigned(&single) => Value::Array(vec![single]),
        other => other,
    };

    let existing = container.get_mut(&key).filter(|existing| is_assigned(existing));
    match (kind, existing) {
        (PatchOpKind::Add, Some(Value::Array(current))) if definition.multi_valued => {
            if let Value::Array(items) = value {
                current.extend(items);
            }
        }
        (PatchOpKind::Add, Some(Value::Object(current))) if definition.is_complex() => {
            if let Value::Object(update) = value {
                for (field, v) in update {
                    let field = key_ignore_case(current, &field).unwrap_or(field);
                    current.insert(field, v);
                }
            } else {
                container.insert(key, value);
            }
        }
        _ => {
            container.insert(key, value);
        }
    }
}

/// New element for a filtered `add` that matched nothing: the value, plus
/// the `eq` clauses of the filter.
fn seed_element(
    filter: &FilterExpr,
    attribute: &AttributeDefinition,
    sub_attribute: Option<&AttributeDefinition>,
    value: Value,
) -> Value {
    if !attribute.is_complex() {
        return value;
    }
    let mut element = Map::new();
    for (name, literal) in filter.required_equalities() {
        let Some(def) = attribute.sub_attribute(name) else {
            continue;
        };
        let literal = match literal {
            FilterValue::Bool(b) => Value::Bool(*b),
            FilterValue::Number(n) => Value::Number(n.clone()),
            FilterValue::String(s) => Value::String(s.clone()),
            FilterValue::Null => continue,
        };
        element.insert(def.name.clone(), literal);
    }
    match (sub_attribute, value) {
        (Some(sub), value) => {
            element.insert(sub.name.clone(), value);
        }
        (None, Value::Object(fields)) => {
            for (key, field) in fields {
                let key = key_ignore_case(&element, &key).unwrap_or(key);
                element.insert(key, field);
            }
        }
        (None, other) => return other,
    }
    Value::Object(element)
}
