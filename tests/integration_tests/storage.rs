use super::_support::{ids, storage_with};
use nexusql::query::IndexSpec;
use nexusql::{Connection, Datum, r};
use serde_json::json;
use std::sync::Arc;

async fn people() -> (Arc<nexusql::storage::MemoryStorage>, Connection) {
    let storage = storage_with(
        "people",
        &[
            json!({"id": 1, "city": "oslo", "tags": ["a", "b"]}),
            json!({"id": 2, "city": "rome", "tags": ["b"]}),
            json!({"id": 3, "city": "oslo", "tags": []}),
        ],
    )
    .await;
    storage.index_create("people", "city", &r::expr("city"), false).unwrap();
    storage.index_create("people", "tags", &r::expr("tags"), true).unwrap();
    (Arc::clone(&storage), Connection::new(storage))
}

#[tokio::test]
async fn get_all_uses_secondary_index() {
    let (_, conn) = people().await;
    let out = r::table("people")
        .get_all_by(["oslo"], "city")
        .run(&conn)
        .await
        .unwrap()
        .into_datum()
        .await
        .unwrap();
    assert_eq!(ids(&out), vec![1, 3]);
}

#[tokio::test]
async fn multi_index_matches_each_element() {
    let (storage, conn) = people().await;
    let out = r::table("people")
        .get_all_by(["b"], "tags")
        .run(&conn)
        .await
        .unwrap()
        .into_datum()
        .await
        .unwrap();
    assert_eq!(ids(&out), vec![1, 2]);
    let stats = storage.index_stats("people", "tags").unwrap();
    assert_eq!((stats.keys, stats.entries), (2, 3));
}

#[tokio::test]
async fn index_follows_writes() {
    let (_, conn) = people().await;
    r::table("people").get(2).update(json!({"city": "oslo"})).run(&conn).await.unwrap();
    let n = r::table("people")
        .get_all_by(["oslo"], "city")
        .count()
        .run(&conn)
        .await
        .unwrap()
        .into_datum()
        .await
        .unwrap();
    assert_eq!(n, Datum::from(3));
}

#[tokio::test]
async fn between_on_primary_and_secondary_keys() {
    let (_, conn) = people().await;
    let out = r::table("people").between(2, 3).run(&conn).await.unwrap().into_datum().await.unwrap();
    assert_eq!(ids(&out), vec![2]);
    let out = r::table("people")
        .between_with("p", Datum::Null, &IndexSpec::index("city"))
        .run(&conn)
        .await
        .unwrap()
        .into_datum()
        .await
        .unwrap();
    assert_eq!(ids(&out), vec![2]);
}

#[tokio::test]
async fn open_cursors_read_a_snapshot() {
    let (_, conn) = people().await;
    let mut cursor = r::table("people").run(&conn).await.unwrap().into_cursor().unwrap();
    r::table("people").insert(json!({"id": 4, "city": "nice"})).run(&conn).await.unwrap();
    assert_eq!(cursor.to_array().await.unwrap().len(), 3);
}

#[tokio::test]
async fn index_admin_round_trip() {
    let (storage, _) = people().await;
    let names: Vec<_> = storage.index_list("people").unwrap().into_iter().map(|d| d.name).collect();
    assert_eq!(names, vec!["city", "tags"]);
    assert!(storage.index_create("people", "city", &r::expr("city"), false).is_err());
    storage.index_drop("people", "city").unwrap();
    assert!(storage.index_drop("people", "city").is_err());
    storage.drop_table("people").unwrap();
    assert!(storage.table_list().is_empty());
}
