use super::_support::{FlakyStorage, d, storage_with};
use nexusql::query::InsertOptions;
use nexusql::storage::{Durability, MemoryStorage, TableOptions};
use nexusql::{Connection, Datum, ErrorKind, RunOptions, r};
use serde_json::json;
use std::sync::Arc;

async fn conn() -> (Arc<MemoryStorage>, Connection) {
    let storage = storage_with("t", &[json!({"id": 1, "n": 1}), json!({"id": 2, "n": 2})]).await;
    (Arc::clone(&storage), Connection::new(storage))
}

#[tokio::test]
async fn batch_insert_records_duplicates_without_aborting() {
    let (_, conn) = conn().await;
    let res = r::table("t")
        .insert(json!([{"id": 3}, {"id": 1}, {"id": 4}]))
        .run(&conn)
        .await
        .unwrap()
        .into_write()
        .unwrap();
    assert_eq!((res.inserted, res.errors), (2, 1));
    assert!(res.first_error.unwrap().contains("Duplicate primary key"));
}

#[tokio::test]
async fn upsert_replaces_existing_row() {
    let (_, conn) = conn().await;
    let opts = InsertOptions { upsert: true, return_vals: true, ..Default::default() };
    let res = r::table("t")
        .insert_with(json!({"id": 1, "n": 10}), &opts)
        .run(&conn)
        .await
        .unwrap()
        .into_write()
        .unwrap();
    assert_eq!(res.replaced, 1);
    assert_eq!(res.old_val, Some(d(json!({"id": 1, "n": 1}))));
    assert_eq!(res.new_val, Some(d(json!({"id": 1, "n": 10}))));
}

#[tokio::test]
async fn insert_then_get_round_trips() {
    let (_, conn) = conn().await;
    let doc = json!({"id": "k", "tags": ["a", "b"], "nested": {"x": 1}});
    r::table("t").insert(doc.clone()).run(&conn).await.unwrap();
    let got = r::table("t").get("k").run(&conn).await.unwrap().into_datum().await.unwrap();
    assert_eq!(got, d(doc));
}

#[tokio::test]
async fn missing_key_is_generated() {
    let (_, conn) = conn().await;
    let res = r::table("t").insert(json!({"n": 9})).run(&conn).await.unwrap().into_write().unwrap();
    assert_eq!(res.generated_keys.len(), 1);
    let key = res.generated_keys[0].clone();
    let got = r::table("t").get(key).field("n").run(&conn).await.unwrap().into_datum().await.unwrap();
    assert_eq!(got, Datum::from(9));
}

#[tokio::test]
async fn update_merges_and_counts_unchanged() {
    let (_, conn) = conn().await;
    let res = r::table("t").update(json!({"n": 2})).run(&conn).await.unwrap().into_write().unwrap();
    assert_eq!((res.replaced, res.unchanged), (1, 1));
    let all = r::table("t").run(&conn).await.unwrap().into_datum().await.unwrap();
    assert_eq!(all, d(json!([{"id": 1, "n": 2}, {"id": 2, "n": 2}])));
}

#[tokio::test]
async fn computed_replace_and_delete() {
    let (_, conn) = conn().await;
    let res = r::table("t")
        .get(2)
        .replace_with(|row| r::object([("id", row.field("id")), ("n", row.field("n").mul(3))]))
        .run(&conn)
        .await
        .unwrap()
        .into_write()
        .unwrap();
    assert_eq!(res.replaced, 1);
    let res =
        r::table("t").filter(r::field("n").lt(5)).delete().run(&conn).await.unwrap().into_write().unwrap();
    assert_eq!(res.deleted, 1);
    let left = r::table("t").count().run(&conn).await.unwrap().into_datum().await.unwrap();
    assert_eq!(left, Datum::from(1));
}

#[tokio::test]
async fn get_of_missing_row_is_skipped() {
    let (_, conn) = conn().await;
    let res = r::table("t").get(42).delete().run(&conn).await.unwrap().into_write().unwrap();
    assert_eq!((res.deleted, res.skipped), (0, 1));
}

#[tokio::test]
async fn durability_hint_reaches_storage() {
    let (storage, conn) = conn().await;
    let before = storage.durability_stats("t").unwrap();
    let opts = InsertOptions { durability: Some(Durability::Soft), ..Default::default() };
    r::table("t").insert_with(json!({"id": 5}), &opts).run(&conn).await.unwrap();
    let after = storage.durability_stats("t").unwrap();
    assert_eq!(after.soft, before.soft + 1);
    assert_eq!(after.hard, before.hard);
}

#[tokio::test]
async fn for_each_copies_rows() {
    let (storage, conn) = conn().await;
    storage.create_table("copy", nexusql::storage::TableOptions::default()).unwrap();
    let res = r::table("t")
        .for_each(|row| r::table("copy").insert(row))
        .run(&conn)
        .await
        .unwrap()
        .into_write()
        .unwrap();
    assert_eq!(res.inserted, 2);
}

#[tokio::test]
async fn transport_errors_propagate_unchanged() {
    let inner = storage_with("t", &[json!({"id": 1})]).await;
    let flaky = Arc::new(FlakyStorage::new(inner));
    let conn = Connection::new(Arc::clone(&flaky) as Arc<dyn nexusql::storage::Storage>);
    flaky.trip();
    let err = r::table("t").insert(json!([{"id": 2}, {"id": 3}])).run(&conn).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.is_transport());
    // reads do not touch the failing path
    let n = r::table("t").count().run(&conn).await.unwrap().into_datum().await.unwrap();
    assert_eq!(n, Datum::from(1));
}

#[tokio::test]
async fn for_each_updates_accumulate() {
    let storage = storage_with("t", &[json!({"id": 1, "n": 0})]).await;
    let conn = Connection::new(Arc::clone(&storage) as Arc<dyn nexusql::storage::Storage>);
    let res = r::expr(vec![1, 2, 3])
        .for_each(|_| r::table("t").get(1).update_with(|row| r::object([("n", row.field("n").add(1))])))
        .run(&conn)
        .await
        .unwrap()
        .into_write()
        .unwrap();
    assert_eq!(res.replaced, 3);
    let n = r::table("t").get(1).field("n").run(&conn).await.unwrap().into_datum().await.unwrap();
    assert_eq!(n, Datum::from(3));
}

#[tokio::test]
async fn unhinted_writes_follow_run_then_table_durability() {
    let storage = Arc::new(MemoryStorage::new());
    let soft = TableOptions { primary_key: "id".into(), durability: Some(Durability::Soft) };
    storage.create_table("t", soft).unwrap();
    let conn = Connection::new(Arc::clone(&storage) as Arc<dyn nexusql::storage::Storage>);

    r::table("t").insert(json!({"id": 1})).run(&conn).await.unwrap();
    let stats = storage.durability_stats("t").unwrap();
    assert_eq!((stats.soft, stats.hard), (1, 0));

    let run = RunOptions { durability: Some(Durability::Hard) };
    conn.run_with(&r::table("t").insert(json!({"id": 2})), &run).await.unwrap();
    let stats = storage.durability_stats("t").unwrap();
    assert_eq!((stats.soft, stats.hard), (1, 1));
}
