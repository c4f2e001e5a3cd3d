//! List queries: sorting, paging and the ListResponse envelope.

use crate::filter::attribute_values;
use crate::schema::{AttributeDefinition, AttributePath, AttributeType, ResourceSchemas, get_ignore_case};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::str::FromStr;

pub const LIST_RESPONSE_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:ListResponse";

/// Query parameters for listing resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Filter expression
    pub filter: Option<String>,
    /// Attribute path to sort by
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
    /// 1-based index of the first result; values below 1 mean 1
    pub start_index: Option<usize>,
    /// Maximum number of results to return
    pub count: Option<usize>,
}

impl ListQuery {
    /// Create a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_sort(mut self, sort_by: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(sort_by.into());
        self.sort_order = order;
        self
    }

    /// Set the starting index.
    pub fn with_start_index(mut self, start_index: usize) -> Self {
        self.start_index = Some(start_index);
        self
    }

    /// Set the maximum count.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Effective 1-based start index.
    pub fn effective_start_index(&self) -> usize {
        self.start_index.unwrap_or(1).max(1)
    }

    /// Effective page size given the configured cap.
    pub fn effective_count(&self, max_results: usize) -> usize {
        self.count.unwrap_or(max_results).min(max_results)
    }

    /// Range of matched results this query selects, as 0-based offsets.
    pub fn window(&self, total: usize, max_results: usize) -> std::ops::Range<usize> {
        let start = (self.effective_start_index() - 1).min(total);
        let end = start.saturating_add(self.effective_count(max_results)).min(total);
        start..end
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("ascending") {
            Ok(Self::Ascending)
        } else if value.eq_ignore_ascii_case("descending") {
            Ok(Self::Descending)
        } else {
            Err(format!("Invalid sortOrder '{}'", value))
        }
    }
}

/// SCIM ListResponse envelope (RFC 7644 §3.4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub schemas: Vec<String>,
    pub total_results: usize,
    pub items_per_page: usize,
    pub start_index: usize,
    #[serde(rename = "Resources", default = "Vec::new")]
    pub resources: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(resources: Vec<T>, total_results: usize, start_index: usize) -> Self {
        Self {
            schemas: vec![LIST_RESPONSE_SCHEMA.to_string()],
            total_results,
            items_per_page: resources.len(),
            start_index,
            resources,
        }
    }

    /// Every item on one page.
    pub fn complete(resources: Vec<T>) -> Self {
        let total = resources.len();
        Self::new(resources, total, 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Text(String),
    Number(f64),
    Flag(bool),
    Time(DateTime<FixedOffset>),
}

impl SortKey {
    fn of(definition: &AttributeDefinition, value: &Value) -> Option<Self> {
        match definition.data_type {
            AttributeType::Boolean => value.as_bool().map(SortKey::Flag),
            AttributeType::Integer | AttributeType::Decimal => value.as_f64().map(SortKey::Number),
            AttributeType::DateTime => value
                .as_str()
                .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
                .map(SortKey::Time),
            AttributeType::Complex => None,
            _ => value.as_str().map(|text| {
                if definition.case_exact {
                    SortKey::Text(text.to_string())
                } else {
                    SortKey::Text(text.to_lowercase())
                }
            }),
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            (SortKey::Number(a), SortKey::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (SortKey::Flag(a), SortKey::Flag(b)) => a.cmp(b),
            (SortKey::Time(a), SortKey::Time(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

/// Sort key of one resource: the primary value of a multi-valued attribute
/// when one is flagged, otherwise its first value.
fn sort_key(
    schemas: &ResourceSchemas<'_>,
    path: &AttributePath,
    resource: &Map<String, Value>,
) -> Option<SortKey> {
    if path.sub_attribute.is_none() {
        if let Some(primary) = primary_value(schemas, path, resource) {
            return Some(primary);
        }
    }
    let (definition, values) = attribute_values(schemas, path, resource)?;
    values.into_iter().find_map(|value| SortKey::of(definition, value))
}

fn primary_value(
    schemas: &ResourceSchemas<'_>,
    path: &AttributePath,
    resource: &Map<String, Value>,
) -> Option<SortKey> {
    let resolved = schemas.resolve(path)?;
    if !resolved.attribute.has_primary_flag() {
        return None;
    }
    let definition = resolved.attribute.sub_attribute("value")?;
    let elements = resolved
        .container(resource)
        .and_then(|container| get_ignore_case(container, &resolved.attribute.name))
        .and_then(Value::as_array)?;
    elements
        .iter()
        .filter_map(Value::as_object)
        .find(|element| {
            get_ignore_case(element, "primary").and_then(Value::as_bool) == Some(true)
        })
        .and_then(|element| get_ignore_case(element, "value"))
        .and_then(|value| SortKey::of(definition, value))
}

/// Sort `(id, representation)` records in place.
///
/// Resources without a value sort last ascending and first descending. Ties
/// are broken by id so the order is stable across calls.
pub(crate) fn sort_records(
    records: &mut [(String, Value)],
    schemas: &ResourceSchemas<'_>,
    path: &AttributePath,
    order: SortOrder,
) {
    let mut keyed: Vec<(Option<SortKey>, usize)> = records
        .iter()
        .enumerate()
        .map(|(position, (_, value))| {
            let key = value
                .as_object()
                .and_then(|object| sort_key(schemas, path, object));
            (key, position)
        })
        .collect();

    keyed.sort_by(|(a, a_pos), (b, b_pos)| {
        let by_value = match (a, b) {
            (Some(a), Some(b)) => a.compare(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let by_value = match order {
            SortOrder::Ascending => by_value,
            SortOrder::Descending => by_value.reverse(),
        };
        by_value.then_with(|| records[*a_pos].0.cmp(&records[*b_pos].0))
    });

    let order: Vec<usize> = keyed.into_iter().map(|(_, position)| position).collect();
    let mut sorted: Vec<(String, Value)> = order.iter().map(|&i| records[i].clone()).collect();
    records.swap_with_slice(&mut sorted);
}
