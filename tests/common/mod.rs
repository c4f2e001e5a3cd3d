//! Shared fixtures for the integration tests.

use scim_engine::error::{ErrorKind, ScimError};
use scim_engine::schema::{
    AttributeDefinition, AttributeType, Mutability, ResourceType, Schema, SchemaRegistry,
    Uniqueness,
};
use scim_engine::storage::InMemoryStorage;
use scim_engine::ResourceStore;
use serde_json::{Value, json};
use std::sync::{Arc, Once};

pub const USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
pub const ENTERPRISE_USER_SCHEMA: &str =
    "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User";
pub const DEVICE_SCHEMA: &str = "urn:example:params:scim:schemas:core:2.0:Device";
pub const PERIPHERAL_SCHEMA: &str = "urn:example:params:scim:schemas:core:2.0:Peripheral";

static LOGGER: Once = Once::new();

/// Route `log` output through env_logger once per test binary.
pub fn init_logging() {
    LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Store over the embedded User/Group schemas.
pub fn user_store() -> ResourceStore<InMemoryStorage> {
    init_logging();
    let registry = SchemaRegistry::with_embedded_schemas().expect("embedded schemas load");
    ResourceStore::new(Arc::new(registry), InMemoryStorage::new())
}

/// Registry with two resource types sharing a globally unique `assetTag`.
///
/// `Device.serialNumber` is required, immutable and unique per type;
/// `assetTag` is writeOnce on both types.
pub fn device_registry() -> SchemaRegistry {
    let asset_tag = || {
        AttributeDefinition::new("assetTag", AttributeType::String)
            .with_mutability(Mutability::WriteOnce)
            .with_uniqueness(Uniqueness::Global)
    };

    let mut registry = SchemaRegistry::new();
    registry
        .register(Schema {
            id: DEVICE_SCHEMA.to_string(),
            name: "Device".to_string(),
            description: "Managed hardware".to_string(),
            attributes: vec![
                AttributeDefinition::new("serialNumber", AttributeType::String)
                    .required()
                    .with_mutability(Mutability::Immutable)
                    .with_uniqueness(Uniqueness::Server),
                asset_tag(),
                AttributeDefinition::new("label", AttributeType::String),
                AttributeDefinition::new("slots", AttributeType::Integer),
            ],
        })
        .expect("device schema registers");
    registry
        .register(Schema {
            id: PERIPHERAL_SCHEMA.to_string(),
            name: "Peripheral".to_string(),
            description: String::new(),
            attributes: vec![
                AttributeDefinition::new("model", AttributeType::String).required(),
                asset_tag(),
            ],
        })
        .expect("peripheral schema registers");
    registry
        .register_resource_type(ResourceType::new("Device", "/Devices", DEVICE_SCHEMA))
        .expect("device type registers");
    registry
        .register_resource_type(ResourceType::new(
            "Peripheral",
            "/Peripherals",
            PERIPHERAL_SCHEMA,
        ))
        .expect("peripheral type registers");
    registry
}

pub fn device_store() -> ResourceStore<InMemoryStorage> {
    init_logging();
    ResourceStore::new(Arc::new(device_registry()), InMemoryStorage::new())
}

/// Minimal valid user.
pub fn user(user_name: &str) -> Value {
    json!({
        "schemas": [USER_SCHEMA],
        "userName": user_name,
        "name": { "givenName": user_name }
    })
}

/// User with a work email marked primary.
pub fn user_with_email(user_name: &str, email: &str) -> Value {
    json!({
        "schemas": [USER_SCHEMA],
        "userName": user_name,
        "name": { "givenName": user_name },
        "emails": [{ "value": email, "type": "work", "primary": true }]
    })
}

pub fn device(serial: &str, asset_tag: Option<&str>) -> Value {
    let mut document = json!({ "serialNumber": serial, "label": "rack unit" });
    if let Some(tag) = asset_tag {
        document["assetTag"] = json!(tag);
    }
    document
}

/// Assert that an operation failed with the given error kind, reporting
/// the full error otherwise.
pub fn assert_kind<T: std::fmt::Debug>(result: Result<T, ScimError>, kind: ErrorKind) -> ScimError {
    match result {
        Ok(value) => panic!("expected {:?}, got success: {:?}", kind, value),
        Err(error) => {
            assert!(
                error.has_kind(kind),
                "expected {:?}, got {:?} ({})",
                kind,
                error.kinds(),
                error
            );
            error
        }
    }
}
