//! Sorting, paging and the ListResponse envelope.

use crate::common::{assert_kind, init_logging, user_store};
use scim_engine::error::ErrorKind;
use scim_engine::storage::InMemoryStorage;
use scim_engine::store::LIST_RESPONSE_SCHEMA;
use scim_engine::{ListQuery, ResourceStore, ResourceStoreBuilder, SchemaRegistry, SortOrder};
use serde_json::json;
use std::sync::Arc;

async fn populated(count: usize) -> ResourceStore<InMemoryStorage> {
    let store = user_store();
    for i in 1..=count {
        store
            .create(
                "User",
                &json!({
                    "userName": format!("user{:02}", i),
                    "name": { "givenName": format!("User {}", i) },
                    "nickName": format!("n{}", i % 5)
                }),
            )
            .await
            .unwrap();
    }
    store
}

fn user_names(page: &scim_engine::ListResponse<scim_engine::Resource>) -> Vec<String> {
    page.resources
        .iter()
        .map(|r| r.get("userName").and_then(|v| v.as_str()).unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn test_last_partial_page() {
    let store = populated(25).await;

    let page = store
        .list(
            "User",
            &ListQuery::new()
                .with_sort("userName", SortOrder::Ascending)
                .with_start_index(21)
                .with_count(10),
        )
        .await
        .unwrap();

    assert_eq!(page.total_results, 25);
    assert_eq!(page.items_per_page, 5);
    assert_eq!(page.start_index, 21);
    assert_eq!(
        user_names(&page),
        vec!["user21", "user22", "user23", "user24", "user25"]
    );
}

#[tokio::test]
async fn test_window_edges() {
    let store = populated(25).await;

    let beyond = store
        .list("User", &ListQuery::new().with_start_index(40).with_count(10))
        .await
        .unwrap();
    assert_eq!(beyond.total_results, 25);
    assert!(beyond.resources.is_empty());

    let zero = store
        .list("User", &ListQuery::new().with_count(0))
        .await
        .unwrap();
    assert_eq!(zero.total_results, 25);
    assert_eq!(zero.items_per_page, 0);

    let from_zero = store
        .list("User", &ListQuery::new().with_start_index(0).with_count(3))
        .await
        .unwrap();
    assert_eq!(from_zero.start_index, 1);
    assert_eq!(from_zero.resources.len(), 3);
}

#[tokio::test]
async fn test_pages_cover_every_resource_once() {
    let store = populated(25).await;

    let mut seen = Vec::new();
    let mut start = 1;
    loop {
        let page = store
            .list(
                "User",
                &ListQuery::new()
                    .with_sort("userName", SortOrder::Descending)
                    .with_start_index(start)
                    .with_count(7),
            )
            .await
            .unwrap();
        if page.resources.is_empty() {
            break;
        }
        start += page.items_per_page;
        seen.extend(user_names(&page));
    }

    let mut expected: Vec<String> = (1..=25).map(|i| format!("user{:02}", i)).collect();
    expected.reverse();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_sort_with_ties_and_missing_values() {
    let store = user_store();
    let with_title = |name: &str, title: Option<&str>| {
        let mut doc = json!({ "userName": name, "name": { "givenName": name } });
        if let Some(title) = title {
            doc["title"] = json!(title);
        }
        doc
    };
    store.create("User", &with_title("a", Some("Manager"))).await.unwrap();
    store.create("User", &with_title("b", None)).await.unwrap();
    store.create("User", &with_title("c", Some("architect"))).await.unwrap();

    let ascending = store
        .list("User", &ListQuery::new().with_sort("title", SortOrder::Ascending))
        .await
        .unwrap();
    assert_eq!(user_names(&ascending), vec!["c", "a", "b"]);

    let descending = store
        .list("User", &ListQuery::new().with_sort("title", SortOrder::Descending))
        .await
        .unwrap();
    assert_eq!(user_names(&descending), vec!["b", "a", "c"]);
}

#[tokio::test]
async fn test_filter_then_page() {
    let store = populated(25).await;

    let page = store
        .list(
            "User",
            &ListQuery::new()
                .with_filter(r#"nickName eq "n0""#)
                .with_sort("userName", SortOrder::Ascending)
                .with_count(2),
        )
        .await
        .unwrap();

    assert_eq!(page.total_results, 5);
    assert_eq!(user_names(&page), vec!["user05", "user10"]);
}

#[tokio::test]
async fn test_max_results_caps_page_size() {
    init_logging();
    let registry = Arc::new(SchemaRegistry::with_embedded_schemas().unwrap());
    let store = ResourceStoreBuilder::new(registry, InMemoryStorage::new())
        .with_max_results(4)
        .build()
        .unwrap();
    for i in 0..6 {
        store
            .create("Group", &json!({ "displayName": format!("group{}", i) }))
            .await
            .unwrap();
    }

    let page = store
        .list("Groups", &ListQuery::new().with_count(100))
        .await
        .unwrap();
    assert_eq!(page.total_results, 6);
    assert_eq!(page.items_per_page, 4);
}

#[tokio::test]
async fn test_list_response_envelope() {
    let store = populated(3).await;
    let page = store
        .list("User", &ListQuery::new().with_count(2))
        .await
        .unwrap();

    let body = serde_json::to_value(&page).unwrap();
    assert_eq!(body["schemas"], json!([LIST_RESPONSE_SCHEMA]));
    assert_eq!(body["totalResults"], 3);
    assert_eq!(body["itemsPerPage"], 2);
    assert_eq!(body["startIndex"], 1);
    assert_eq!(body["Resources"].as_array().unwrap().len(), 2);
    assert!(body["Resources"][0]["meta"]["version"].as_str().unwrap().starts_with("W/\""));
}

#[tokio::test]
async fn test_invalid_sort_path() {
    let store = populated(2).await;
    assert_kind(
        store
            .list("User", &ListQuery::new().with_sort("name..givenName", SortOrder::Ascending))
            .await,
        ErrorKind::MalformedPath,
    );

    let unknown = store
        .list("User", &ListQuery::new().with_sort("favoriteColor", SortOrder::Ascending))
        .await
        .expect("sorting by an undeclared attribute falls back to id order");
    assert_eq!(unknown.total_results, 2);
}
