//! Error types for SCIM engine operations.
//!
//! Every failure the engine can report is a typed value. [`ScimError`] is the
//! boundary type returned by the resource store; [`ValidationError`] describes a
//! single violated schema constraint and [`ValidationErrors`] aggregates all of
//! the violations found in one document, so a client sees every problem at once.
//! [`BuildError`] covers configuration-time mistakes (schema registration,
//! store configuration) that should surface during startup.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema URN carried by every SCIM error response body.
pub const ERROR_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:Error";

/// Flat classification of engine failures.
///
/// The HTTP layer maps these to status codes; tests use them to assert on the
/// class of a failure without matching on payload fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownResourceType,
    UnknownAttribute,
    TypeMismatch,
    MultiplicityMismatch,
    RequiredAttributeMissing,
    ImmutableAttributeModified,
    MultiplePrimaryValues,
    UniquenessConflict,
    MalformedPath,
    PathRequired,
    UnsupportedOperation,
    NoTargetMatched,
    MalformedFilter,
    NotFound,
    VersionConflict,
    StorageUnavailable,
    InvalidRequest,
    Internal,
}

/// A single violated schema constraint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Attribute is not declared by the schema or any of its extensions
    #[error("Unknown attribute '{attribute}' in schema '{schema_id}'")]
    UnknownAttribute {
        attribute: String,
        schema_id: String,
    },

    /// Attribute value doesn't match the declared data type
    #[error("Attribute '{attribute}' has invalid type, expected {expected}, got {actual}")]
    TypeMismatch {
        attribute: String,
        expected: String,
        actual: String,
    },

    /// Array supplied for a single-valued attribute, or scalar for a multi-valued one
    #[error("Attribute '{attribute}' must be {expected}")]
    MultiplicityMismatch { attribute: String, expected: String },

    /// Required attribute is absent or empty
    #[error("Required attribute '{attribute}' is missing")]
    RequiredAttributeMissing { attribute: String },

    /// Immutable or writeOnce attribute changed after it was set
    #[error("Attribute '{attribute}' cannot be modified once set")]
    ImmutableAttributeModified { attribute: String },

    /// More than one element of a multi-valued attribute is marked primary
    #[error("Attribute '{attribute}' cannot have multiple primary values")]
    MultiplePrimaryValues { attribute: String },

    /// Value already claimed by another resource
    #[error("Attribute '{attribute}' value '{value}' is already in use")]
    UniquenessConflict { attribute: String, value: String },
}

impl ValidationError {
    /// Create an unknown attribute error
    pub fn unknown_attribute(attribute: impl Into<String>, schema_id: impl Into<String>) -> Self {
        Self::UnknownAttribute {
            attribute: attribute.into(),
            schema_id: schema_id.into(),
        }
    }

    /// Create a type mismatch error
    pub fn type_mismatch(
        attribute: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            attribute: attribute.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a multiplicity mismatch error
    pub fn multiplicity(attribute: impl Into<String>, multi_valued: bool) -> Self {
        let expected = if multi_valued {
            "multi-valued (array)"
        } else {
            "single-valued (not array)"
        };
        Self::MultiplicityMismatch {
            attribute: attribute.into(),
            expected: expected.to_string(),
        }
    }

    /// Create a missing required attribute error
    pub fn missing_required(attribute: impl Into<String>) -> Self {
        Self::RequiredAttributeMissing {
            attribute: attribute.into(),
        }
    }

    /// Create an immutability violation error
    pub fn immutable(attribute: impl Into<String>) -> Self {
        Self::ImmutableAttributeModified {
            attribute: attribute.into(),
        }
    }

    /// Create a uniqueness conflict error
    pub fn uniqueness(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::UniquenessConflict {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownAttribute { .. } => ErrorKind::UnknownAttribute,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::MultiplicityMismatch { .. } => ErrorKind::MultiplicityMismatch,
            Self::RequiredAttributeMissing { .. } => ErrorKind::RequiredAttributeMissing,
            Self::ImmutableAttributeModified { .. } => ErrorKind::ImmutableAttributeModified,
            Self::MultiplePrimaryValues { .. } => ErrorKind::MultiplePrimaryValues,
            Self::UniquenessConflict { .. } => ErrorKind::UniquenessConflict,
        }
    }

    /// Attribute path the violation concerns.
    pub fn attribute(&self) -> &str {
        match self {
            Self::UnknownAttribute { attribute, .. }
            | Self::TypeMismatch { attribute, .. }
            | Self::MultiplicityMismatch { attribute, .. }
            | Self::RequiredAttributeMissing { attribute }
            | Self::ImmutableAttributeModified { attribute }
            | Self::MultiplePrimaryValues { attribute }
            | Self::UniquenessConflict { attribute, .. } => attribute,
        }
    }
}

/// Every violation found while checking one document.
///
/// Never empty: construct it through [`ValidationErrors::from_vec`] or
/// `From<ValidationError>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    /// Wrap collected violations, returning `None` when there are none.
    pub fn from_vec(errors: Vec<ValidationError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.errors.iter()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn first(&self) -> &ValidationError {
        &self.errors[0]
    }

    pub fn contains_kind(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind() == kind)
    }

    pub fn into_vec(self) -> Vec<ValidationError> {
        self.errors
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.len() == 1 {
            return write!(f, "{}", self.errors[0]);
        }
        write!(f, "{} violations: ", self.errors.len())?;
        for (index, error) in self.errors.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

/// Main error type for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum ScimError {
    /// No resource type is registered under this name
    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    /// Resource data doesn't conform to its schema
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),

    /// PATCH path could not be parsed
    #[error("Malformed path '{path}': {reason}")]
    MalformedPath { path: String, reason: String },

    /// PATCH operation that needs a path was sent without one
    #[error("'{operation}' operation requires a path")]
    PathRequired { operation: String },

    /// PATCH op kind outside add/remove/replace
    #[error("Unsupported PATCH operation '{operation}'")]
    UnsupportedOperation { operation: String },

    /// Filtered PATCH path selected no elements
    #[error("No values matched path '{path}'")]
    NoTargetMatched { path: String },

    /// Filtered `add` selected elements that already exist
    #[error("'add' cannot target existing values at '{path}'")]
    TargetExists { path: String },

    /// Filter expression could not be parsed
    #[error("Malformed filter '{filter}': {reason}")]
    MalformedFilter { filter: String, reason: String },

    /// Resource not found
    #[error("Resource not found: {resource_type} with ID {id}")]
    NotFound { resource_type: String, id: String },

    /// Expected version does not match the stored one
    #[error("Version mismatch for {resource_type} {id}: expected {expected}, current {current}")]
    VersionConflict {
        resource_type: String,
        id: String,
        expected: String,
        current: String,
    },

    /// Storage backend could not complete the operation; safe to retry
    #[error("Storage unavailable: {message}")]
    StorageUnavailable { message: String },

    /// Request body or parameters are structurally invalid
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Internal engine errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Independent failures collected from one PATCH batch, in operation order
    #[error("{} failures: {}", .0.len(), join_errors(.0))]
    Batch(Vec<ScimError>),
}

fn join_errors(errors: &[ScimError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<ValidationError> for ScimError {
    fn from(error: ValidationError) -> Self {
        Self::Validation(ValidationErrors::from(error))
    }
}

impl ScimError {
    /// Create a resource not found error
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Create a malformed path error
    pub fn malformed_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a malformed filter error
    pub fn malformed_filter(filter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedFilter {
            filter: filter.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Combine collected failures into one error, or `None` when there are
    /// none. Schema violations are merged into a single validation error at
    /// the position of the first one.
    pub fn combine(errors: Vec<ScimError>) -> Option<Self> {
        let mut combined: Vec<ScimError> = Vec::new();
        for error in errors {
            let parts = match error {
                Self::Batch(nested) => nested,
                single => vec![single],
            };
            for part in parts {
                match part {
                    Self::Validation(found) => {
                        let existing = combined.iter_mut().find_map(|e| match e {
                            Self::Validation(existing) => Some(existing),
                            _ => None,
                        });
                        match existing {
                            Some(existing) => existing.errors.extend(found.into_vec()),
                            None => combined.push(Self::Validation(found)),
                        }
                    }
                    other => combined.push(other),
                }
            }
        }
        match combined.len() {
            0 => None,
            1 => combined.pop(),
            _ => Some(Self::Batch(combined)),
        }
    }

    /// Primary classification. For aggregated validation failures this is the
    /// kind of the first violation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownResourceType(_) => ErrorKind::UnknownResourceType,
            Self::Validation(errors) => errors.first().kind(),
            Self::MalformedPath { .. } => ErrorKind::MalformedPath,
            Self::PathRequired { .. } => ErrorKind::PathRequired,
            Self::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            Self::NoTargetMatched { .. } => ErrorKind::NoTargetMatched,
            Self::TargetExists { .. } => ErrorKind::InvalidRequest,
            Self::MalformedFilter { .. } => ErrorKind::MalformedFilter,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::VersionConflict { .. } => ErrorKind::VersionConflict,
            Self::StorageUnavailable { .. } => ErrorKind::StorageUnavailable,
            Self::InvalidRequest { .. } | Self::Json(_) => ErrorKind::InvalidRequest,
            Self::Internal { .. } => ErrorKind::Internal,
            Self::Batch(errors) => errors
                .first()
                .map_or(ErrorKind::InvalidRequest, ScimError::kind),
        }
    }

    /// Every kind carried by this error, in report order.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self {
            Self::Validation(errors) => errors.iter().map(ValidationError::kind).collect(),
            Self::Batch(errors) => errors.iter().flat_map(ScimError::kinds).collect(),
            other => vec![other.kind()],
        }
    }

    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        self.kinds().contains(&kind)
    }

    /// Individual violations when this is a validation failure.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            Self::Validation(errors) => &errors.errors,
            Self::Batch(errors) => errors
                .iter()
                .find_map(|e| match e {
                    Self::Validation(found) => Some(found.errors.as_slice()),
                    _ => None,
                })
                .unwrap_or(&[]),
            _ => &[],
        }
    }

    /// HTTP status the resource-handler layer should answer with.
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(errors)
                if errors
                    .iter()
                    .all(|e| e.kind() == ErrorKind::UniquenessConflict) =>
            {
                409
            }
            Self::NotFound { .. } | Self::UnknownResourceType(_) => 404,
            Self::VersionConflict { .. } => 412,
            Self::StorageUnavailable { .. } => 503,
            Self::Internal { .. } => 500,
            Self::Batch(errors) => errors.first().map_or(400, ScimError::status),
            _ => 400,
        }
    }

    /// RFC 7644 `scimType` detail keyword, where one applies.
    pub fn scim_type(&self) -> Option<&'static str> {
        match self {
            Self::Validation(errors) => Some(match errors.first().kind() {
                ErrorKind::UniquenessConflict => "uniqueness",
                ErrorKind::ImmutableAttributeModified => "mutability",
                ErrorKind::UnknownAttribute => "invalidPath",
                _ => "invalidValue",
            }),
            Self::MalformedPath { .. } => Some("invalidPath"),
            Self::PathRequired { .. } | Self::NoTargetMatched { .. } => Some("noTarget"),
            Self::TargetExists { .. } => Some("invalidValue"),
            Self::MalformedFilter { .. } => Some("invalidFilter"),
            Self::VersionConflict { .. } => Some("invalidVers"),
            Self::Batch(errors) => errors.first().and_then(ScimError::scim_type),
            Self::UnsupportedOperation { .. } | Self::InvalidRequest { .. } | Self::Json(_) => {
                Some("invalidSyntax")
            }
            _ => None,
        }
    }

    /// Only storage outages are transient; everything else is deterministic
    /// for the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }

    /// Render the SCIM error response body.
    pub fn to_error_body(&self) -> ScimErrorBody {
        ScimErrorBody {
            schemas: vec![ERROR_SCHEMA.to_string()],
            status: self.status().to_string(),
            scim_type: self.scim_type().map(str::to_string),
            detail: self.to_string(),
        }
    }
}

/// SCIM error response body (RFC 7644 §3.12).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScimErrorBody {
    pub schemas: Vec<String>,
    pub status: String,
    #[serde(rename = "scimType", skip_serializing_if = "Option::is_none")]
    pub scim_type: Option<String>,
    pub detail: String,
}

/// Errors that can occur while assembling schemas and configuring the store.
///
/// These are programming or deployment errors and should be caught during
/// startup rather than at request time.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A schema with this URN is already registered
    #[error("Duplicate schema ID: {schema_id}")]
    DuplicateSchemaId { schema_id: String },

    /// Schema declaration breaks a structural rule
    #[error("Invalid schema '{schema_id}': {message}")]
    InvalidSchema { schema_id: String, message: String },

    /// Resource type refers to an unregistered schema
    #[error("Unknown schema: {schema_id}")]
    UnknownSchema { schema_id: String },

    /// A resource type with this name is already registered
    #[error("Duplicate resource type: {name}")]
    DuplicateResourceType { name: String },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Schema file could not be read or parsed
    #[error("Failed to load schema from {path}: {message}")]
    SchemaLoad { path: String, message: String },
}

// Result type aliases for convenience
pub type ScimResult<T> = Result<T, ScimError>;
pub type ValidationResult<T> = Result<T, ValidationErrors>;
pub type BuildResult<T> = Result<T, BuildError>;
