//! Filter evaluation against resource documents.
//!
//! Evaluation is a pure walk over the expression tree. It never fails:
//! unknown attributes behave as absent, and comparisons between a literal and
//! an attribute of an incompatible kind are false.

use super::parser::{CompareOp, FilterExpr, FilterValue};
use crate::schema::{AttributeDefinition, AttributePath, AttributeType, ResourceSchemas};
use crate::schema::{get_ignore_case, is_assigned};

use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Does the resource (its full JSON representation) satisfy the filter?
pub fn matches(expr: &FilterExpr, schemas: &ResourceSchemas<'_>, resource: &Value) -> bool {
    match resource.as_object() {
        Some(root) => evaluate(expr, Scope::Resource(schemas), root),
        None => false,
    }
}

/// Does one element of a multi-valued attribute satisfy a value filter?
///
/// Paths in `expr` name sub-attributes of `definition`. Elements of simple
/// multi-valued attributes are addressed through the `value` pseudo
/// sub-attribute.
pub fn matches_element(expr: &FilterExpr, definition: &AttributeDefinition, element: &Value) -> bool {
    let wrapped;
    let object = match element {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            wrapped = map;
            &wrapped
        }
    };
    evaluate(expr, Scope::Element(definition), object)
}

/// Values an attribute path selects in a resource, with the definition of
/// the innermost segment. A complex attribute without a sub-attribute
/// selects its `value` sub-attribute. `None` when the path is not declared.
pub fn attribute_values<'a, 'v>(
    schemas: &'a ResourceSchemas<'a>,
    path: &AttributePath,
    resource: &'v Map<String, Value>,
) -> Option<(&'a AttributeDefinition, Vec<&'v Value>)> {
    let found = Scope::Resource(schemas).lookup(path, resource)?.comparable()?;
    Some((found.definition, found.values))
}

#[derive(Debug, Clone, Copy)]
enum Scope<'a> {
    /// Paths are resolved against the resource type's schemas
    Resource(&'a ResourceSchemas<'a>),
    /// Paths name sub-attributes of this multi-valued attribute
    Element(&'a AttributeDefinition),
}

struct Found<'a, 'v> {
    definition: &'a AttributeDefinition,
    values: Vec<&'v Value>,
}

impl<'a, 'v> Found<'a, 'v> {
    /// Redirect a complex attribute to its `value` sub-attribute.
    fn comparable(self) -> Option<Self> {
        if !self.definition.is_complex() {
            return Some(self);
        }
        let definition = self.definition.sub_attribute("value")?;
        let mut values = Vec::new();
        for object in self.values.iter().filter_map(|v| v.as_object()) {
            if let Some(value) = get_ignore_case(object, "value") {
                flatten_into(value, &mut values);
            }
        }
        Some(Found { definition, values })
    }
}

impl<'a> Scope<'a> {
    fn lookup<'v>(self, path: &AttributePath, object: &'v Map<String, Value>) -> Option<Found<'a, 'v>> {
        match self {
            Scope::Resource(schemas) => {
                let resolved = schemas.resolve(path)?;
                let mut values = Vec::new();
                if let Some(raw) = resolved
                    .container(object)
                    .and_then(|container| get_ignore_case(container, &resolved.attribute.name))
                {
                    match resolved.sub_attribute {
                        Some(sub) => {
                            let mut parents = Vec::new();
                            flatten_into(raw, &mut parents);
                            for parent in parents.iter().filter_map(|p| p.as_object()) {
                                if let Some(value) = get_ignore_case(parent, &sub.name) {
                                    flatten_into(value, &mut values);
                                }
                            }
                        }
                        None => flatten_into(raw, &mut values),
                    }
                }
                Some(Found {
                    definition: resolved.definition(),
                    values,
                })
            }
            Scope::Element(parent) => {
                if path.sub_attribute.is_some() {
                    return None;
                }
                let definition = match parent.sub_attribute(&path.attribute) {
                    Some(sub) => sub,
                    None if !parent.is_complex() && path.attribute.eq_ignore_ascii_case("value") => {
                        parent
                    }
                    None => return None,
                };
                let mut values = Vec::new();
                if let Some(raw) = get_ignore_case(object, &path.attribute) {
                    flatten_into(raw, &mut values);
                }
                Some(Found { definition, values })
            }
        }
    }
}

fn flatten_into<'v>(value: &'v Value, out: &mut Vec<&'v Value>) {
    match value {
        Value::Array(items) => out.extend(items.iter()),
        other => out.push(other),
    }
}

fn evaluate(expr: &FilterExpr, scope: Scope<'_>, object: &Map<String, Value>) -> bool {
    match expr {
        FilterExpr::And(left, right) => {
            evaluate(left, scope, object) && evaluate(right, scope, object)
        }
        FilterExpr::Or(left, right) => evaluate(left, scope, object) || evaluate(right, scope, object),
        FilterExpr::Not(inner) => !evaluate(inner, scope, object),
        FilterExpr::Present(path) => scope
            .lookup(path, object)
            .is_some_and(|found| found.values.iter().any(|v| is_assigned(v))),
        FilterExpr::Compare { path, op, value } => {
            let found = scope.lookup(path, object).and_then(Found::comparable);
            match value {
                FilterValue::Null => {
                    let present = found.is_some_and(|f| f.values.iter().any(|v| is_assigned(v)));
                    match op {
                        CompareOp::Eq => !present,
                        CompareOp::Ne => present,
                        _ => false,
                    }
                }
                literal => found.is_some_and(|f| {
                    f.values
                        .iter()
                        .any(|actual| compare(f.definition, actual, *op, literal))
                }),
            }
        }
        FilterExpr::ValuePath { path, filter } => {
            let Some(found) = scope.lookup(path, object) else {
                return false;
            };
            found
                .values
                .iter()
                .any(|element| matches_element(filter, found.definition, element))
        }
    }
}

/// Compare one attribute value with a literal, coercing the literal to the
/// attribute's declared kind.
fn compare(definition: &AttributeDefinition, actual: &Value, op: CompareOp, literal: &FilterValue) -> bool {
    match definition.data_type {
        AttributeType::Boolean => match (actual.as_bool(), literal.as_bool()) {
            (Some(a), Some(b)) => match op {
                CompareOp::Eq => a == b,
                CompareOp::Ne => a != b,
                _ => false,
            },
            _ => false,
        },
        AttributeType::Integer | AttributeType::Decimal => {
            match (actual.as_f64(), literal.as_f64()) {
                (Some(a), Some(b)) => ordered(op, a.partial_cmp(&b)),
                _ => false,
            }
        }
        AttributeType::DateTime => {
            let (Some(a), Some(b)) = (actual.as_str(), literal.as_str()) else {
                return false;
            };
            if matches!(op, CompareOp::Co | CompareOp::Sw | CompareOp::Ew) {
                return compare_text(a, b, definition.case_exact, op);
            }
            match (parse_datetime(a), parse_datetime(b)) {
                (Some(a), Some(b)) => ordered(op, Some(a.cmp(&b))),
                _ => false,
            }
        }
        AttributeType::String | AttributeType::Reference => {
            match (actual.as_str(), literal.as_text()) {
                (Some(a), Some(b)) => compare_text(a, &b, definition.case_exact, op),
                _ => false,
            }
        }
        AttributeType::Binary => match (actual.as_str(), literal.as_str()) {
            (Some(a), Some(b)) => compare_text(a, b, definition.case_exact, op),
            _ => false,
        },
        AttributeType::Complex => false,
    }
}

fn compare_text(actual: &str, literal: &str, case_exact: bool, op: CompareOp) -> bool {
    let (actual, literal) = if case_exact {
        (actual.to_string(), literal.to_string())
    } else {
        (actual.to_lowercase(), literal.to_lowercase())
    };
    match op {
        CompareOp::Co => actual.contains(&literal),
        CompareOp::Sw => actual.starts_with(&literal),
        CompareOp::Ew => actual.ends_with(&literal),
        other => ordered(other, Some(actual.cmp(&literal))),
    }
}

fn ordered(op: CompareOp, ordering: Option<Ordering>) -> bool {
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Co | CompareOp::Sw | CompareOp::Ew => false,
    }
}

fn parse_datetime(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).ok()
}
