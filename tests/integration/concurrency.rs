//! Racing writers and storage outages.

use crate::common::{assert_kind, init_logging, user, user_store};
use futures::future::join_all;
use scim_engine::error::ErrorKind;
use scim_engine::storage::{StorageError, StorageKey, StoragePrefix, StorageProvider};
use scim_engine::{ListQuery, PatchOperation, ResourceStore, SchemaRegistry};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinSet;

#[tokio::test]
async fn test_racing_creates_exactly_one_wins() {
    let store = user_store();

    let documents: Vec<Value> = (0..16).map(|_| user("contested")).collect();
    let results = join_all(documents.iter().map(|doc| store.create("User", doc))).await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(result.has_kind(ErrorKind::UniquenessConflict), "{}", result);
    }

    let listed = store
        .list("User", &ListQuery::new().with_filter(r#"userName eq "contested""#))
        .await
        .unwrap();
    assert_eq!(listed.total_results, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_creates_across_tasks() {
    let store = Arc::new(user_store());

    let mut tasks = JoinSet::new();
    for i in 0..32 {
        let store = store.clone();
        // Pairs of tasks contend for each name
        tasks.spawn(async move { store.create("User", &user(&format!("racer{}", i / 2))).await });
    }

    let mut created = 0;
    let mut conflicts = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.expect("task panicked") {
            Ok(_) => created += 1,
            Err(e) if e.has_kind(ErrorKind::UniquenessConflict) => conflicts += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(created, 16);
    assert_eq!(conflicts, 16);
    assert_eq!(store.storage().stats().await.total_resources, 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_conditional_writers_one_succeeds() {
    let store = Arc::new(user_store());
    let created = store
        .create("User", &json!({ "userName": "shared", "name": { "givenName": "S" }, "title": "v0" }))
        .await
        .unwrap();
    let version = created.version().clone();

    let mut tasks = JoinSet::new();
    for i in 0..8 {
        let store = store.clone();
        let id = created.id.clone();
        let version = version.clone();
        tasks.spawn(async move {
            store
                .patch_operations(
                    "User",
                    &id,
                    Some(&version),
                    &[PatchOperation::replace(Some("title"), json!(format!("v{}", i + 1)))],
                )
                .await
        });
    }

    let mut winners = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined.expect("task panicked") {
            Ok(resource) => winners.push(resource),
            Err(e) => assert_eq!(e.kind(), ErrorKind::VersionConflict),
        }
    }
    assert_eq!(winners.len(), 1);

    let current = store.get("User", &created.id).await.unwrap();
    assert_eq!(current, winners[0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_partial_patches() {
    let store = Arc::new(user_store());
    let created = store
        .create("User", &json!({ "userName": "pair", "name": { "givenName": "P" }, "title": "0", "nickName": "0" }))
        .await
        .unwrap();

    let writer = {
        let store = store.clone();
        let id = created.id.clone();
        tokio::spawn(async move {
            for i in 1..=50 {
                let value = json!(i.to_string());
                store
                    .patch_operations(
                        "User",
                        &id,
                        None,
                        &[
                            PatchOperation::replace(Some("title"), value.clone()),
                            PatchOperation::replace(Some("nickName"), value),
                        ],
                    )
                    .await
                    .unwrap();
            }
        })
    };

    for _ in 0..200 {
        let current = store.get("User", &created.id).await.unwrap();
        assert_eq!(current.get("title"), current.get("nickName"));
    }
    writer.await.unwrap();
}

/// Storage that can be switched into an outage.
#[derive(Default)]
struct FlakyStorage {
    inner: scim_engine::storage::InMemoryStorage,
    down: AtomicBool,
}

impl FlakyStorage {
    fn check(&self) -> Result<(), StorageError> {
        if self.down.load(Ordering::SeqCst) {
            Err(StorageError::unavailable("backend offline"))
        } else {
            Ok(())
        }
    }
}

impl StorageProvider for FlakyStorage {
    type Error = StorageError;

    async fn put(&self, key: StorageKey, data: Value) -> Result<Value, Self::Error> {
        self.check()?;
        self.inner.put(key, data).await
    }

    async fn get(&self, key: StorageKey) -> Result<Option<Value>, Self::Error> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn delete(&self, key: StorageKey) -> Result<bool, Self::Error> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: StoragePrefix) -> Result<Vec<(StorageKey, Value)>, Self::Error> {
        self.check()?;
        self.inner.list(prefix).await
    }

    async fn exists(&self, key: StorageKey) -> Result<bool, Self::Error> {
        self.check()?;
        self.inner.exists(key).await
    }

    async fn count(&self, prefix: StoragePrefix) -> Result<usize, Self::Error> {
        self.check()?;
        self.inner.count(prefix).await
    }
}

#[tokio::test]
async fn test_storage_outage_is_retryable_and_reserves_nothing() {
    init_logging();
    let registry = Arc::new(SchemaRegistry::with_embedded_schemas().unwrap());
    let store = ResourceStore::new(registry, FlakyStorage::default());
    let existing = store.create("User", &user("before")).await.unwrap();

    store.storage().down.store(true, Ordering::SeqCst);

    let error = assert_kind(store.create("User", &user("during")).await, ErrorKind::StorageUnavailable);
    assert!(error.is_retryable());
    assert_eq!(error.status(), 503);
    assert_eq!(error.scim_type(), None);

    assert_kind(store.get("User", &existing.id).await, ErrorKind::StorageUnavailable);
    assert_kind(store.list("User", &ListQuery::new()).await, ErrorKind::StorageUnavailable);

    store.storage().down.store(false, Ordering::SeqCst);

    store
        .create("User", &user("during"))
        .await
        .expect("the failed write reserved no unique values");
    let validation = store.create("User", &user("before")).await.unwrap_err();
    assert!(!validation.is_retryable());
}
