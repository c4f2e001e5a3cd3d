//! Create, read, replace and delete through the resource store.

use crate::common::{
    ENTERPRISE_USER_SCHEMA, USER_SCHEMA, assert_kind, device, device_registry, device_store, user,
    user_store, user_with_email,
};
use scim_engine::error::ErrorKind;
use scim_engine::{HttpVersion, RawVersion, ResourceStore, ResourceStoreBuilder, SchemaRegistry};
use scim_engine::storage::InMemoryStorage;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_create_then_get_round_trip() {
    let store = user_store();

    let created = store
        .create(
            "User",
            &json!({
                "schemas": [USER_SCHEMA, ENTERPRISE_USER_SCHEMA],
                "USERNAME": "bjensen",
                "name": { "givenname": "Barbara", "familyName": "Jensen" },
                "emails": [
                    { "value": "bjensen@example.com", "type": "work", "primary": true },
                    { "value": "babs@example.org", "type": "home" }
                ],
                ENTERPRISE_USER_SCHEMA: { "employeeNumber": "701984" }
            }),
        )
        .await
        .expect("Failed to create user");

    assert!(!created.id.is_empty());
    assert_eq!(created.resource_type, "User");
    assert_eq!(created.get("userName"), Some(&json!("bjensen")));
    assert_eq!(created.get("name").unwrap()["givenName"], "Barbara");
    assert_eq!(
        created.extension(ENTERPRISE_USER_SCHEMA).unwrap()["employeeNumber"],
        "701984"
    );
    assert_eq!(created.schemas, vec![USER_SCHEMA, ENTERPRISE_USER_SCHEMA]);
    assert_eq!(
        created.location(),
        Some(format!("https://localhost/v2/Users/{}", created.id).as_str())
    );
    assert_eq!(created.meta.created, created.meta.last_modified);

    let fetched = store.get("User", &created.id).await.expect("Failed to get user");
    assert_eq!(fetched, created);

    let json = fetched.to_json().unwrap();
    assert_eq!(json["meta"]["resourceType"], "User");
    assert_eq!(json["meta"]["version"], created.etag());
}

#[tokio::test]
async fn test_client_supplied_server_fields_ignored() {
    let store = user_store();

    let created = store
        .create(
            "User",
            &json!({
                "id": "client-chosen",
                "userName": "alice",
                "name": { "givenName": "Alice" },
                "meta": { "resourceType": "Group", "version": "W/\"bogus\"" }
            }),
        )
        .await
        .unwrap();

    assert_ne!(created.id, "client-chosen");
    assert_eq!(created.meta.resource_type, "User");
    assert_ne!(created.version().as_str(), "bogus");
}

#[tokio::test]
async fn test_replace_with_matching_version() {
    let store = user_store();
    let created = store
        .create(
            "User",
            &json!({ "userName": "alice", "name": { "givenName": "Alice" }, "nickName": "Al" }),
        )
        .await
        .unwrap();

    let replaced = store
        .replace(
            "User",
            &created.id,
            Some(created.version()),
            &json!({ "userName": "alice", "name": { "givenName": "Alice" }, "title": "Engineer" }),
        )
        .await
        .expect("Failed to replace user");

    assert_eq!(replaced.id, created.id);
    assert_eq!(replaced.get("title"), Some(&json!("Engineer")));
    assert_eq!(replaced.get("nickName"), None, "replace drops omitted attributes");
    assert_ne!(replaced.version(), created.version());
    assert_eq!(replaced.meta.created, created.meta.created);
    assert!(replaced.meta.last_modified >= created.meta.last_modified);
}

#[tokio::test]
async fn test_etag_header_round_trip() {
    let store = user_store();
    let created = store.create("User", &user("etag.test")).await.unwrap();

    let header = created.etag();
    assert!(header.starts_with("W/\""));
    let parsed: HttpVersion = header.parse().expect("ETag parses");
    let expected = RawVersion::from(parsed);

    store
        .replace("User", &created.id, Some(&expected), &user("etag.test"))
        .await
        .expect("the version from the ETag header is current");
}

#[tokio::test]
async fn test_stale_version_rejected() {
    let store = user_store();
    let created = store.create("User", &user("alice")).await.unwrap();
    let stale = created.version().clone();

    store
        .replace("User", &created.id, Some(&stale), &user("alice"))
        .await
        .unwrap();

    let error = assert_kind(
        store.replace("User", &created.id, Some(&stale), &user("alice")).await,
        ErrorKind::VersionConflict,
    );
    assert_eq!(error.status(), 412);

    assert_kind(
        store.delete("User", &created.id, Some(&stale)).await,
        ErrorKind::VersionConflict,
    );
    assert!(store.get("User", &created.id).await.is_ok());
}

#[tokio::test]
async fn test_missing_resources() {
    let store = user_store();

    let error = assert_kind(store.get("User", "nope").await, ErrorKind::NotFound);
    assert_eq!(error.status(), 404);
    assert_kind(
        store.replace("User", "nope", None, &user("x")).await,
        ErrorKind::NotFound,
    );
    assert_kind(store.delete("User", "nope", None).await, ErrorKind::NotFound);
    assert_kind(store.get("Widget", "1").await, ErrorKind::UnknownResourceType);
    assert_kind(
        store.create("Widget", &user("x")).await,
        ErrorKind::UnknownResourceType,
    );
}

#[tokio::test]
async fn test_delete_releases_unique_values() {
    let store = user_store();
    let first = store.create("User", &user("alice")).await.unwrap();

    let error = assert_kind(
        store.create("User", &user("ALICE")).await,
        ErrorKind::UniquenessConflict,
    );
    assert_eq!(error.status(), 409);
    assert_eq!(error.scim_type(), Some("uniqueness"));

    store.delete("User", &first.id, None).await.unwrap();
    assert_kind(store.get("User", &first.id).await, ErrorKind::NotFound);

    let second = store.create("User", &user("alice")).await.unwrap();
    assert_ne!(second.id, first.id);
}

#[tokio::test]
async fn test_replace_keeps_own_unique_value() {
    let store = user_store();
    let alice = store.create("User", &user("alice")).await.unwrap();
    store.create("User", &user("bob")).await.unwrap();

    store
        .replace("User", &alice.id, None, &user("Alice"))
        .await
        .expect("a resource never conflicts with itself");

    assert_kind(
        store.replace("User", &alice.id, None, &user("bob")).await,
        ErrorKind::UniquenessConflict,
    );

    store
        .replace("User", &alice.id, None, &user("carol"))
        .await
        .unwrap();
    store
        .create("User", &user("alice"))
        .await
        .expect("the old value was released by the rename");
}

#[tokio::test]
async fn test_validation_failures_store_nothing() {
    let store = user_store();

    let error = assert_kind(
        store
            .create(
                "User",
                &json!({ "userName": 42, "active": "yes", "nickname2": true }),
            )
            .await,
        ErrorKind::TypeMismatch,
    );
    assert_eq!(error.status(), 400);
    assert!(error.has_kind(ErrorKind::UnknownAttribute));
    assert!(error.has_kind(ErrorKind::RequiredAttributeMissing));
    assert_eq!(error.validation_errors().len(), 4);

    assert_kind(
        store.create("User", &json!({ "displayName": "No Name" })).await,
        ErrorKind::RequiredAttributeMissing,
    );

    assert_eq!(store.storage().stats().await.total_resources, 0);
}

#[tokio::test]
async fn test_multiple_primary_rejected() {
    let store = user_store();

    let error = assert_kind(
        store
            .create(
                "User",
                &json!({
                    "userName": "twoprimary",
                    "name": { "givenName": "Two" },
                    "emails": [
                        { "value": "a@example.com", "type": "work", "primary": true },
                        { "value": "b@example.com", "type": "home", "primary": true }
                    ]
                }),
            )
            .await,
        ErrorKind::MultiplePrimaryValues,
    );
    assert_eq!(error.validation_errors()[0].attribute(), "emails");

    store
        .create("User", &user_with_email("oneprimary", "a@example.com"))
        .await
        .expect("a single primary is fine");
}

#[tokio::test]
async fn test_immutable_attribute_cannot_change() {
    let store = device_store();
    let created = store
        .create("Device", &device("SN-001", Some("AT-1")))
        .await
        .unwrap();

    let error = assert_kind(
        store
            .replace("Device", &created.id, None, &device("SN-002", Some("AT-1")))
            .await,
        ErrorKind::ImmutableAttributeModified,
    );
    assert_eq!(error.scim_type(), Some("mutability"));

    let unchanged = store.get("Device", &created.id).await.unwrap();
    assert_eq!(unchanged.get("serialNumber"), Some(&json!("SN-001")));
    assert_eq!(unchanged.version(), created.version());

    store
        .replace("Device", &created.id, None, &device("sn-001", Some("AT-1")))
        .await
        .expect("case-insensitive equal value is not a modification");
}

#[tokio::test]
async fn test_write_once_attribute() {
    let store = device_store();
    let created = store.create("Device", &device("SN-1", None)).await.unwrap();

    let tagged = store
        .replace("Device", &created.id, None, &device("SN-1", Some("AT-9")))
        .await
        .expect("an unset writeOnce attribute may be set");
    assert_eq!(tagged.get("assetTag"), Some(&json!("AT-9")));

    assert_kind(
        store
            .replace("Device", &created.id, None, &device("SN-1", Some("AT-10")))
            .await,
        ErrorKind::ImmutableAttributeModified,
    );
}

#[tokio::test]
async fn test_server_uniqueness_is_per_type_and_global_spans_types() {
    let store = device_store();
    store
        .create("Device", &device("SN-1", Some("TAG-1")))
        .await
        .unwrap();

    assert_kind(
        store.create("Device", &device("sn-1", None)).await,
        ErrorKind::UniquenessConflict,
    );

    let error = assert_kind(
        store
            .create("Peripheral", &json!({ "model": "K120", "assetTag": "tag-1" }))
            .await,
        ErrorKind::UniquenessConflict,
    );
    assert_eq!(error.validation_errors()[0].attribute(), "assetTag");

    store
        .create("Peripheral", &json!({ "model": "K120", "assetTag": "TAG-2" }))
        .await
        .expect("distinct tags do not conflict");
}

#[tokio::test]
async fn test_builder_configuration() {
    let registry = Arc::new(SchemaRegistry::with_embedded_schemas().unwrap());
    let store = ResourceStoreBuilder::new(registry.clone(), InMemoryStorage::new())
        .with_base_url("https://scim.example.com/")
        .with_scim_version("v2")
        .with_max_results(10)
        .build()
        .expect("valid configuration");

    let created = store.create("Group", &json!({ "displayName": "Admins" })).await.unwrap();
    assert_eq!(
        created.location(),
        Some(format!("https://scim.example.com/v2/Groups/{}", created.id).as_str())
    );
    assert_eq!(store.config().max_results, 10);

    assert!(
        ResourceStoreBuilder::new(registry.clone(), InMemoryStorage::new())
            .with_base_url("ftp://nope")
            .build()
            .is_err()
    );
    assert!(
        ResourceStoreBuilder::new(registry, InMemoryStorage::new())
            .with_max_results(0)
            .build()
            .is_err()
    );
}

#[tokio::test]
async fn test_reopened_store_keeps_uniqueness() {
    let registry = Arc::new(SchemaRegistry::with_embedded_schemas().unwrap());
    let storage = InMemoryStorage::new();

    let first = ResourceStore::new(registry.clone(), storage.clone());
    let alice = first.create("User", &user("alice")).await.unwrap();

    let second = ResourceStore::new(registry.clone(), storage.clone());
    assert_kind(second.create("User", &user("ALICE")).await, ErrorKind::UniquenessConflict);
    assert_eq!(storage.stats().await.total_resources, 1);

    second.delete("User", &alice.id, None).await.unwrap();
    let third = ResourceStoreBuilder::new(registry, storage.clone()).build().unwrap();
    assert_eq!(third.rebuild_index().await.unwrap(), 0);
    third
        .create("User", &user("Alice"))
        .await
        .expect("the deleted user released its name");
}

#[tokio::test]
async fn test_reopened_store_keeps_global_uniqueness() {
    let registry = Arc::new(device_registry());
    let storage = InMemoryStorage::new();

    let first = ResourceStore::new(registry.clone(), storage.clone());
    first.create("Device", &device("SN-1", Some("tag-1"))).await.unwrap();

    let second = ResourceStore::new(registry, storage);
    assert_eq!(second.rebuild_index().await.unwrap(), 2);
    assert_kind(
        second
            .create("Peripheral", &json!({ "model": "K120", "assetTag": "TAG-1" }))
            .await,
        ErrorKind::UniquenessConflict,
    );
    assert_kind(
        second.create("Device", &device("sn-1", None)).await,
        ErrorKind::UniquenessConflict,
    );
}
