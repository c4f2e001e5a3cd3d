//! Filtered list queries.

use crate::common::{assert_kind, user_store};
use scim_engine::error::ErrorKind;
use scim_engine::storage::InMemoryStorage;
use scim_engine::{ListQuery, ResourceStore};
use serde_json::json;

async fn alice_and_bob() -> (ResourceStore<InMemoryStorage>, String, String) {
    let store = user_store();
    let alice = store
        .create(
            "User",
            &json!({
                "userName": "alice",
                "active": true,
                "title": "Senior Engineer",
                "name": { "givenName": "Alice", "familyName": "Liddell" },
                "emails": [
                    { "value": "alice@example.com", "type": "work", "primary": true },
                    { "value": "alice@home.example.org", "type": "home" }
                ],
                "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User": {
                    "department": "Research"
                }
            }),
        )
        .await
        .unwrap();
    let bob = store
        .create(
            "User",
            &json!({
                "userName": "bob",
                "name": { "givenName": "Bob" },
                "active": false,
                "emails": [{ "value": "bob@example.net", "type": "home" }]
            }),
        )
        .await
        .unwrap();
    (store, alice.id, bob.id)
}

async fn ids(store: &ResourceStore<InMemoryStorage>, filter: &str) -> Vec<String> {
    let page = store
        .list("User", &ListQuery::new().with_filter(filter))
        .await
        .unwrap_or_else(|e| panic!("filter {:?} failed: {}", filter, e));
    assert_eq!(page.total_results, page.resources.len());
    page.resources.into_iter().map(|r| r.id).collect()
}

#[tokio::test]
async fn test_basic_filters() {
    let (store, alice, bob) = alice_and_bob().await;

    assert_eq!(ids(&store, r#"userName eq "alice""#).await, vec![alice.clone()]);
    assert_eq!(ids(&store, "active eq true").await, vec![alice.clone()]);
    assert_eq!(ids(&store, "not (active eq true)").await, vec![bob.clone()]);
    assert_eq!(ids(&store, r#"userName eq "ALICE""#).await, vec![alice.clone()]);
    assert_eq!(ids(&store, r#"USERNAME Eq "alice""#).await, vec![alice.clone()]);
}

#[tokio::test]
async fn test_malformed_filter() {
    let (store, _, _) = alice_and_bob().await;

    for filter in ["active eq", "userName eq \"open", "(active eq true", "active xx true"] {
        let error = assert_kind(
            store.list("User", &ListQuery::new().with_filter(filter)).await,
            ErrorKind::MalformedFilter,
        );
        assert_eq!(error.status(), 400);
        assert_eq!(error.scim_type(), Some("invalidFilter"));
    }
}

#[tokio::test]
async fn test_string_operators_and_presence() {
    let (store, alice, bob) = alice_and_bob().await;

    assert_eq!(ids(&store, r#"userName sw "al""#).await, vec![alice.clone()]);
    assert_eq!(ids(&store, r#"userName ew "OB""#).await, vec![bob.clone()]);
    assert_eq!(ids(&store, r#"name.familyName co "dde""#).await, vec![alice.clone()]);
    assert_eq!(ids(&store, "title pr").await, vec![alice.clone()]);
    assert_eq!(ids(&store, "not (title pr)").await, vec![bob.clone()]);
    assert_eq!(ids(&store, "title eq null").await, vec![bob.clone()]);
}

#[tokio::test]
async fn test_multi_valued_and_value_paths() {
    let (store, alice, bob) = alice_and_bob().await;

    let mut both = vec![alice.clone(), bob.clone()];
    both.sort();
    let mut home = ids(&store, r#"emails.type eq "home""#).await;
    home.sort();
    assert_eq!(home, both);

    assert_eq!(
        ids(&store, r#"emails[type eq "work" and value ew "example.com"]"#).await,
        vec![alice.clone()]
    );
    assert_eq!(
        ids(&store, r#"emails[type eq "home" and value co "example.net"]"#).await,
        vec![bob.clone()]
    );
    assert!(ids(&store, r#"emails[type eq "work" and value co "example.net"]"#).await.is_empty());
    assert_eq!(ids(&store, r#"emails co "example.net""#).await, vec![bob.clone()]);
}

#[tokio::test]
async fn test_logical_precedence() {
    let (store, alice, bob) = alice_and_bob().await;

    let mut both = vec![alice.clone(), bob.clone()];
    both.sort();

    // and binds tighter than or
    let mut found = ids(&store, r#"userName eq "bob" or userName eq "alice" and active eq false"#).await;
    found.sort();
    assert_eq!(found, vec![bob.clone()]);

    let mut found = ids(&store, r#"(userName eq "bob" or userName eq "alice") and active eq true"#).await;
    found.sort();
    assert_eq!(found, vec![alice.clone()]);

    let mut found = ids(&store, r#"userName eq "bob" or not (active eq false)"#).await;
    found.sort();
    assert_eq!(found, both);
}

#[tokio::test]
async fn test_lenient_comparisons() {
    let (store, alice, _) = alice_and_bob().await;

    // Literal of the wrong kind never matches, and is not an error
    assert!(ids(&store, r#"active eq "yes""#).await.is_empty());
    assert!(ids(&store, "userName eq 5").await.is_empty());
    // Undeclared attributes behave as absent
    assert!(ids(&store, r#"favoriteColor eq "blue""#).await.is_empty());
    assert_eq!(ids(&store, r#"not (favoriteColor eq "blue") and active eq true"#).await, vec![alice]);
}

#[tokio::test]
async fn test_extension_and_meta_filters() {
    let (store, alice, bob) = alice_and_bob().await;

    assert_eq!(
        ids(
            &store,
            r#"urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:department eq "research""#
        )
        .await,
        vec![alice.clone()]
    );
    assert_eq!(ids(&store, r#"meta.resourceType eq "User""#).await.len(), 2);
    assert_eq!(ids(&store, &format!(r#"id eq "{}""#, bob)).await, vec![bob.clone()]);

    let page = store
        .list(
            "User",
            &ListQuery::new().with_filter(r#"meta.created gt "2000-01-01T00:00:00Z""#),
        )
        .await
        .unwrap();
    assert_eq!(page.total_results, 2);
}
