//! 查询管道端到端场景
//! End-to-end query pipeline scenarios

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use vfood_rust::query::QueryOutput;
use vfood_rust::repo::{
    EntityMeta, GetAllOptions, MutationOptions, PopulateSpec, RelationMap, Repository,
};
use vfood_rust::store::MemoryStore;

const MENU_META: EntityMeta = EntityMeta {
    collection: "menu_items",
    relations: &[],
};

fn repo() -> Repository {
    let store = Arc::new(MemoryStore::new());
    Repository::new(store, MENU_META, Arc::new(RelationMap::new(&[MENU_META])))
}

fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn seed(repo: &Repository, docs: Vec<Value>) {
    for doc in docs {
        repo.create(doc, MutationOptions { populate: PopulateSpec::None, ..Default::default() })
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn filtered_sorted_paginated_listing() {
    let repo = repo();
    seed(
        &repo,
        vec![
            json!({"name": "Idli", "price": 50, "status": "active"}),
            json!({"name": "Dosa", "price": 150, "status": "active"}),
            json!({"name": "Thali", "price": 300, "status": "active"}),
            json!({"name": "Feast", "price": 500, "status": "inactive"}),
        ],
    )
    .await;

    let out = repo
        .get_all(
            &params(&[
                ("status", "active"),
                ("price__gte", "100"),
                ("sortKey", "price"),
                ("sortDir", "asc"),
                ("page", "1"),
                ("limit", "2"),
            ]),
            GetAllOptions::default(),
        )
        .await
        .unwrap();

    let QueryOutput::Paginated(page) = out else {
        panic!("expected paginated envelope")
    };
    assert_eq!(page.pagination.total_items, 2);
    assert_eq!(page.pagination.total_pages, 1);
    assert_eq!(page.pagination.current_page, 1);
    let prices: Vec<i64> = page
        .result
        .iter()
        .map(|row| row["price"].as_i64().unwrap())
        .collect();
    assert_eq!(prices, vec![150, 300]);
}

#[tokio::test]
async fn twelve_items_page_two_of_five() {
    let repo = repo();
    for i in 1..=12 {
        repo.create(
            json!({"name": format!("item-{:02}", i), "price": i, "status": "active"}),
            MutationOptions { populate: PopulateSpec::None, ..Default::default() },
        )
        .await
        .unwrap();
    }

    let out = repo
        .get_all(
            &params(&[
                ("page", "2"),
                ("limit", "5"),
                ("sortKey", "price"),
                ("sortDir", "asc"),
            ]),
            GetAllOptions::default(),
        )
        .await
        .unwrap();

    let QueryOutput::Paginated(page) = out else {
        panic!("expected paginated envelope")
    };
    assert_eq!(page.pagination.total_items, 12);
    assert_eq!(page.pagination.total_pages, 3);
    assert_eq!(page.pagination.current_page, 2);
    let prices: Vec<i64> = page
        .result
        .iter()
        .map(|row| row["price"].as_i64().unwrap())
        .collect();
    assert_eq!(prices, vec![6, 7, 8, 9, 10]);
}

#[tokio::test]
async fn empty_collection_yields_an_empty_envelope() {
    let repo = repo();
    let out = repo
        .get_all(&params(&[]), GetAllOptions::default())
        .await
        .unwrap();
    let QueryOutput::Paginated(page) = out else {
        panic!("expected paginated envelope")
    };
    assert!(page.result.is_empty());
    assert_eq!(page.pagination.total_items, 0);
    assert_eq!(page.pagination.total_pages, 0);
}

#[tokio::test]
async fn anchored_equality_matches_case_insensitively() {
    let repo = repo();
    seed(
        &repo,
        vec![
            json!({"name": "foo", "price": 1}),
            json!({"name": "FOO", "price": 2}),
            json!({"name": "Foo", "price": 3}),
            json!({"name": "Foobar", "price": 4}),
        ],
    )
    .await;

    let out = repo
        .get_all(
            &params(&[("name", "Foo"), ("pagination", "false")]),
            GetAllOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(out.rows().len(), 3);
    assert!(out.rows().iter().all(|row| row["name"].as_str().unwrap().eq_ignore_ascii_case("foo")));
}

#[tokio::test]
async fn get_by_id_is_idempotent() {
    let repo = repo();
    let created = repo
        .create(
            json!({"name": "Vada", "price": 30}),
            MutationOptions { populate: PopulateSpec::None, ..Default::default() },
        )
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();

    let first = repo.get_by_id(id, MutationOptions::default()).await.unwrap();
    let second = repo.get_by_id(id, MutationOptions::default()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first, created);
}
