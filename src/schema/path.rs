//! Attribute path syntax (`[schemaUrn:]attr[.subAttr]`).
//!
//! Parsing here is purely syntactic. Whether a path names a declared
//! attribute is decided by [`ResourceSchemas::resolve`](super::ResourceSchemas::resolve).

use std::fmt;

/// A parsed SCIM attribute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePath {
    /// Schema URN prefix, when the path was fully qualified
    pub schema: Option<String>,
    pub attribute: String,
    pub sub_attribute: Option<String>,
}

impl AttributePath {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            schema: None,
            attribute: attribute.into(),
            sub_attribute: None,
        }
    }

    pub fn with_sub_attribute(mut self, sub_attribute: impl Into<String>) -> Self {
        self.sub_attribute = Some(sub_attribute.into());
        self
    }

    /// Parse `attr`, `attr.sub`, or `urn:...:attr[.sub]`.
    ///
    /// Returns a human-readable reason on failure; callers wrap it in the
    /// error that fits their context (filter or PATCH path).
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();
        if input.is_empty() {
            return Err("attribute path is empty".to_string());
        }

        // Attribute names never contain ':', so the last colon ends the URN.
        let (schema, rest) = match input.rfind(':') {
            Some(index) => {
                let urn = &input[..index];
                if !urn.to_ascii_lowercase().starts_with("urn:") {
                    return Err(format!("'{}' is not a schema URN", urn));
                }
                (Some(urn.to_string()), &input[index + 1..])
            }
            None => (None, input),
        };

        let mut segments = rest.split('.');
        let attribute = segments.next().unwrap_or_default();
        let sub_attribute = segments.next();
        if segments.next().is_some() {
            return Err(format!("'{}' nests deeper than one sub-attribute", input));
        }

        validate_name(attribute)?;
        if let Some(sub) = sub_attribute {
            validate_name(sub)?;
        }

        Ok(Self {
            schema,
            attribute: attribute.to_string(),
            sub_attribute: sub_attribute.map(str::to_string),
        })
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(schema) = &self.schema {
            write!(f, "{}:", schema)?;
        }
        write!(f, "{}", self.attribute)?;
        if let Some(sub) = &self.sub_attribute {
            write!(f, ".{}", sub)?;
        }
        Ok(())
    }
}

/// ATTRNAME = ALPHA *(nameChar), plus the reserved `$ref`.
fn validate_name(name: &str) -> Result<(), String> {
    if name == "$ref" {
        return Ok(());
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        Some(_) => return Err(format!("attribute name '{}' must start with a letter", name)),
        None => return Err("attribute name is empty".to_string()),
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-')) {
        return Err(format!("invalid character '{}' in attribute name '{}'", bad, name));
    }
    Ok(())
}
