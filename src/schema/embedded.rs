//! Built-in schema declarations.
//!
//! The User, Group and EnterpriseUser schemas served by default, embedded as
//! JSON so they are published through `/Schemas` exactly as declared. Omitted
//! characteristics take their RFC 7643 defaults (single-valued, optional,
//! readWrite, not unique, case-insensitive).

use super::types::{AttributeDefinition, AttributeType, Mutability, Uniqueness};

pub const USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
pub const GROUP_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:Group";
pub const ENTERPRISE_USER_SCHEMA: &str =
    "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User";

/// Attributes every resource carries regardless of its schema (RFC 7643 §3.1).
///
/// `id` and `meta` are server-managed; `externalId` belongs to the client.
pub fn common_attributes() -> Vec<AttributeDefinition> {
    vec![
        AttributeDefinition::new("id", AttributeType::String)
            .case_exact()
            .with_mutability(Mutability::ReadOnly)
            .with_uniqueness(Uniqueness::Server),
        AttributeDefinition::new("externalId", AttributeType::String).case_exact(),
        AttributeDefinition::complex(
            "meta",
            vec![
                AttributeDefinition::new("resourceType", AttributeType::String)
                    .case_exact()
                    .with_mutability(Mutability::ReadOnly),
                AttributeDefinition::new("created", AttributeType::DateTime)
                    .with_mutability(Mutability::ReadOnly),
                AttributeDefinition::new("lastModified", AttributeType::DateTime)
                    .with_mutability(Mutability::ReadOnly),
                AttributeDefinition::new("location", AttributeType::Reference)
                    .case_exact()
                    .with_mutability(Mutability::ReadOnly),
                AttributeDefinition::new("version", AttributeType::String)
                    .case_exact()
                    .with_mutability(Mutability::ReadOnly),
            ],
        )
        .with_mutability(Mutability::ReadOnly),
    ]
}

/// Core User schema.
pub fn core_user_schema() -> &'static str {
    r#"{
  "id": "urn:ietf:params:scim:schemas:core:2.0:User",
  "name": "User",
  "description": "User Account",
  "attributes": [
    {
      "name": "userName",
      "type": "string",
      "description": "Unique identifier for the User, typically used to authenticate.",
      "required": true,
      "uniqueness": "server"
    },
    {
      "name": "name",
      "type": "complex",
      "description": "The components of the user's real name.",
      "required": true,
      "subAttributes": [
        { "name": "formatted", "type": "string" },
        { "name": "familyName", "type": "string" },
        { "name": "givenName", "type": "string" },
        { "name": "middleName", "type": "string" },
        { "name": "honorificPrefix", "type": "string" },
        { "name": "honorificSuffix", "type": "string" }
      ]
    },
    { "name": "displayName", "type": "string" },
    { "name": "nickName", "type": "string" },
    { "name": "profileUrl", "type": "reference", "referenceTypes": ["external"] },
    { "name": "title", "type": "string" },
    { "name": "userType", "type": "string" },
    { "name": "preferredLanguage", "type": "string" },
    { "name": "locale", "type": "string" },
    {
      "name": "timezone",
      "type": "string",
      "description": "The User's time zone in IANA Time Zone database format."
    },
    {
      "name": "active",
      "type": "boolean",
      "description": "A Boolean value indicating the user's administrative status."
    },
    {
      "name": "emails",
      "type": "complex",
      "multiValued": true,
      "subAttributes": [
        { "name": "value", "type": "string", "required": true },
        { "name": "display", "type": "string" },
        {
          "name": "type",
          "type": "string",
          "required": true,
          "canonicalValues": ["work", "home", "other"]
        },
        { "name": "primary", "type": "boolean" }
      ]
    },
    {
      "name": "phoneNumbers",
      "type": "complex",
      "multiValued": true,
      "subAttributes": [
        { "name": "value", "type": "string", "required": true },
        { "name": "display", "type": "string" },
        {
          "name": "type",
          "type": "string",
          "required": true,
          "canonicalValues": ["work", "home", "mobile", "fax", "pager", "other"]
        },
        { "name": "primary", "type": "boolean" }
      ]
    },
    {
      "name": "photos",
      "type": "reference",
      "multiValued": true,
      "referenceTypes": ["external"]
    }
  ]
}"#
}

/// Core Group schema.
pub fn core_group_schema() -> &'static str {
    r#"{
  "id": "urn:ietf:params:scim:schemas:core:2.0:Group",
  "name": "Group",
  "description": "Group",
  "attributes": [
    {
      "name": "displayName",
      "type": "string",
      "description": "A human-readable name for the Group.",
      "required": true
    },
    {
      "name": "members",
      "type": "complex",
      "multiValued": true,
      "description": "A list of members of the Group.",
      "subAttributes": [
        {
          "name": "value",
          "type": "string",
          "caseExact": true,
          "mutability": "immutable"
        },
        {
          "name": "$ref",
          "type": "reference",
          "mutability": "immutable",
          "referenceTypes": ["User", "Group"]
        },
        { "name": "display", "type": "string" },
        {
          "name": "type",
          "type": "string",
          "mutability": "immutable",
          "canonicalValues": ["User", "Group"]
        }
      ]
    }
  ]
}"#
}

/// Enterprise User extension.
pub fn enterprise_user_schema() -> &'static str {
    r#"{
  "id": "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User",
  "name": "EnterpriseUser",
  "description": "Enterprise User",
  "attributes": [
    { "name": "employeeNumber", "type": "string" },
    { "name": "costCenter", "type": "string" },
    { "name": "organization", "type": "string" },
    { "name": "division", "type": "string" },
    { "name": "department", "type": "string" },
    {
      "name": "manager",
      "type": "complex",
      "subAttributes": [
        { "name": "value", "type": "string", "caseExact": true },
        { "name": "$ref", "type": "reference", "referenceTypes": ["User"] },
        { "name": "displayName", "type": "string", "mutability": "readOnly" }
      ]
    }
  ]
}"#
}
