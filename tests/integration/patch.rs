//! PATCH requests through the resource store.

use crate::common::{ENTERPRISE_USER_SCHEMA, assert_kind, device, device_store, user, user_store};
use scim_engine::error::ErrorKind;
use scim_engine::{PatchOperation, PatchRequest};
use serde_json::json;

fn parse_request(body: serde_json::Value) -> PatchRequest {
    serde_json::from_value(body).expect("PATCH body deserializes")
}

#[tokio::test]
async fn test_patch_request_from_wire_format() {
    let store = user_store();
    let created = store
        .create(
            "User",
            &json!({
                "userName": "bjensen",
                "name": { "givenName": "Barbara" },
                "emails": [
                    { "value": "bjensen@example.com", "type": "work", "primary": true },
                    { "value": "babs@example.org", "type": "home" }
                ]
            }),
        )
        .await
        .unwrap();

    let request = parse_request(json!({
        "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
        "Operations": [
            { "op": "replace", "path": "emails[type eq \"work\"].value", "value": "barbara@example.com" },
            { "op": "Add", "path": "title", "value": "Tour Guide" },
            { "op": "add", "value": { ENTERPRISE_USER_SCHEMA: { "department": "Tours" } } },
            { "op": "remove", "path": "emails[type eq \"home\"]" }
        ]
    }));

    let patched = store
        .patch("User", &created.id, Some(created.version()), &request)
        .await
        .expect("Failed to patch user");

    let emails = patched.get("emails").unwrap().as_array().unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0]["value"], "barbara@example.com");
    assert_eq!(emails[0]["primary"], true);
    assert_eq!(patched.get("title"), Some(&json!("Tour Guide")));
    assert_eq!(
        patched.extension(ENTERPRISE_USER_SCHEMA).unwrap()["department"],
        "Tours"
    );
    assert!(patched.schemas.iter().any(|s| s == ENTERPRISE_USER_SCHEMA));
    assert_ne!(patched.version(), created.version());

    let fetched = store.get("User", &created.id).await.unwrap();
    assert_eq!(fetched, patched);
}

#[tokio::test]
async fn test_failed_batch_leaves_resource_untouched() {
    let store = user_store();
    let created = store
        .create("User", &json!({ "userName": "atomic", "name": { "givenName": "A" }, "title": "Before" }))
        .await
        .unwrap();

    let operations = vec![
        PatchOperation::replace(Some("title"), json!("After")),
        PatchOperation::replace(Some("active"), json!("not-a-bool")),
    ];
    assert_kind(
        store
            .patch_operations("User", &created.id, None, &operations)
            .await,
        ErrorKind::TypeMismatch,
    );

    let operations = vec![
        PatchOperation::replace(Some("title"), json!("After")),
        PatchOperation::remove("userName"),
    ];
    assert_kind(
        store
            .patch_operations("User", &created.id, None, &operations)
            .await,
        ErrorKind::RequiredAttributeMissing,
    );

    let operations = vec![
        PatchOperation::replace(Some("title"), json!("After")),
        PatchOperation::replace(Some(r#"emails[type eq "work"].value"#), json!("x@example.com")),
    ];
    assert_kind(
        store
            .patch_operations("User", &created.id, None, &operations)
            .await,
        ErrorKind::NoTargetMatched,
    );

    let current = store.get("User", &created.id).await.unwrap();
    assert_eq!(current.get("title"), Some(&json!("Before")));
    assert_eq!(current.version(), created.version());
    assert_eq!(current.meta.last_modified, created.meta.last_modified);
}

#[tokio::test]
async fn test_patch_error_kinds() {
    let store = user_store();
    let created = store
        .create("User", &user("errors"))
        .await
        .unwrap();
    let id = created.id.as_str();

    let op = |op: &str, path: Option<&str>| PatchOperation {
        op: op.to_string(),
        path: path.map(str::to_string),
        value: Some(json!("v")),
    };

    assert_kind(
        store.patch_operations("User", id, None, &[op("move", Some("title"))]).await,
        ErrorKind::UnsupportedOperation,
    );
    assert_kind(
        store.patch_operations("User", id, None, &[op("remove", None)]).await,
        ErrorKind::PathRequired,
    );
    assert_kind(
        store
            .patch_operations("User", id, None, &[op("replace", Some("emails[type eq"))])
            .await,
        ErrorKind::MalformedPath,
    );
    assert_kind(
        store
            .patch_operations("User", id, None, &[op("add", Some("favoriteColor"))])
            .await,
        ErrorKind::UnknownAttribute,
    );
    assert_kind(
        store
            .patch("User", id, None, &PatchRequest::new(Vec::new()))
            .await,
        ErrorKind::InvalidRequest,
    );
    assert_kind(
        store
            .patch_operations("User", "missing", None, &[op("add", Some("title"))])
            .await,
        ErrorKind::NotFound,
    );
}

#[tokio::test]
async fn test_patch_respects_uniqueness_and_versions() {
    let store = user_store();
    let alice = store.create("User", &user("alice")).await.unwrap();
    store.create("User", &user("bob")).await.unwrap();

    assert_kind(
        store
            .patch_operations(
                "User",
                &alice.id,
                None,
                &[PatchOperation::replace(Some("userName"), json!("BOB"))],
            )
            .await,
        ErrorKind::UniquenessConflict,
    );

    let renamed = store
        .patch_operations(
            "User",
            &alice.id,
            Some(alice.version()),
            &[PatchOperation::replace(Some("userName"), json!("alicia"))],
        )
        .await
        .unwrap();
    assert_eq!(renamed.get("userName"), Some(&json!("alicia")));

    assert_kind(
        store
            .patch_operations(
                "User",
                &alice.id,
                Some(alice.version()),
                &[PatchOperation::replace(Some("title"), json!("stale"))],
            )
            .await,
        ErrorKind::VersionConflict,
    );

    store
        .create("User", &user("alice"))
        .await
        .expect("renaming through PATCH released the old value");
}

#[tokio::test]
async fn test_patch_immutable_attribute() {
    let store = device_store();
    let created = store
        .create("Device", &device("SN-100", None))
        .await
        .unwrap();

    assert_kind(
        store
            .patch_operations(
                "Device",
                &created.id,
                None,
                &[PatchOperation::replace(Some("serialNumber"), json!("SN-200"))],
            )
            .await,
        ErrorKind::ImmutableAttributeModified,
    );
    assert_kind(
        store
            .patch_operations(
                "Device",
                &created.id,
                None,
                &[PatchOperation::remove("serialNumber")],
            )
            .await,
        ErrorKind::ImmutableAttributeModified,
    );

    let patched = store
        .patch_operations(
            "Device",
            &created.id,
            None,
            &[
                PatchOperation::add(Some("assetTag"), json!("AT-7")),
                PatchOperation::replace(Some("slots"), json!(4)),
            ],
        )
        .await
        .unwrap();
    assert_eq!(patched.get("assetTag"), Some(&json!("AT-7")));
    assert_eq!(patched.get("slots"), Some(&json!(4)));
}

#[tokio::test]
async fn test_patch_multiple_primary_rejected() {
    let store = user_store();
    let created = store
        .create(
            "User",
            &json!({
                "userName": "primaries",
                "name": { "givenName": "P" },
                "emails": [{ "value": "a@example.com", "type": "work", "primary": true }]
            }),
        )
        .await
        .unwrap();

    assert_kind(
        store
            .patch_operations(
                "User",
                &created.id,
                None,
                &[PatchOperation::add(
                    Some("emails"),
                    json!([{ "value": "b@example.com", "type": "home", "primary": true }]),
                )],
            )
            .await,
        ErrorKind::MultiplePrimaryValues,
    );

    let patched = store
        .patch_operations(
            "User",
            &created.id,
            None,
            &[
                PatchOperation::replace(Some("emails[primary eq true].primary"), json!(false)),
                PatchOperation::add(
                    Some("emails"),
                    json!([{ "value": "b@example.com", "type": "home", "primary": true }]),
                ),
            ],
        )
        .await
        .expect("moving the primary flag in one batch is valid");
    let emails = patched.get("emails").unwrap().as_array().unwrap();
    assert_eq!(emails.len(), 2);
    assert_eq!(emails[1]["primary"], true);
    assert_eq!(emails[0]["primary"], false);
}

#[tokio::test]
async fn test_batch_reports_every_failure() {
    let store = user_store();
    let created = store
        .create(
            "User",
            &json!({
                "userName": "several",
                "name": { "givenName": "S" },
                "emails": [{ "value": "s@example.com", "type": "work" }]
            }),
        )
        .await
        .unwrap();

    let error = store
        .patch_operations(
            "User",
            &created.id,
            None,
            &[
                PatchOperation::replace(Some("shoeSize"), json!(1)),
                PatchOperation::add(Some(r#"emails[type eq "work"].value"#), json!("changed@example.com")),
                PatchOperation::replace(Some("active"), json!("yes")),
            ],
        )
        .await
        .unwrap_err();
    assert_eq!(
        error.kinds(),
        vec![
            ErrorKind::UnknownAttribute,
            ErrorKind::TypeMismatch,
            ErrorKind::InvalidRequest
        ]
    );
    assert_eq!(error.status(), 400);

    let current = store.get("User", &created.id).await.unwrap();
    assert_eq!(current, created);
}
