use super::_support::{connection, storage_with};
use nexusql::config::QueryConfig;
use nexusql::query::CursorState;
use nexusql::{Connection, Datum, ErrorKind, r};
use serde_json::json;

fn five() -> Vec<serde_json::Value> {
    (1..=5).map(|i| json!({"id": i})).collect()
}

#[tokio::test]
async fn next_five_times_then_exhausted() {
    let conn = connection("c", &five()).await;
    let mut cursor = r::table("c").run(&conn).await.unwrap().into_cursor().unwrap();
    for i in 1..=5 {
        let row = cursor.next().await.unwrap();
        assert_eq!(row.field("id"), Some(&Datum::from(i)));
    }
    assert!(!cursor.has_next().await.unwrap());
    let err = cursor.next().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    assert_eq!(cursor.state(), CursorState::Exhausted);
}

#[tokio::test]
async fn has_next_does_not_consume() {
    let conn = connection("c", &five()).await;
    let mut cursor = r::table("c").run(&conn).await.unwrap().into_cursor().unwrap();
    assert!(cursor.has_next().await.unwrap());
    assert!(cursor.has_next().await.unwrap());
    assert_eq!(cursor.next().await.unwrap().field("id"), Some(&Datum::from(1)));
}

#[tokio::test]
async fn each_stops_early_and_closes() {
    let conn = connection("c", &five()).await;
    let mut cursor = r::table("c").run(&conn).await.unwrap().into_cursor().unwrap();
    let mut seen = Vec::new();
    cursor
        .each(|row| {
            seen.push(row);
            Ok(seen.len() < 2)
        })
        .await
        .unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(cursor.state(), CursorState::Closed);
    assert_eq!(cursor.next().await.unwrap_err().kind(), ErrorKind::CursorClosed);
}

#[tokio::test]
async fn infinite_stream_refuses_to_array_but_streams() {
    let conn = connection("c", &[]).await;
    let mut cursor = r::range().run(&conn).await.unwrap().into_cursor().unwrap();
    assert!(cursor.is_infinite());
    assert_eq!(cursor.next().await.unwrap(), Datum::from(0));
    assert_eq!(cursor.next().await.unwrap(), Datum::from(1));
    let err = cursor.to_array().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    cursor.close();
    cursor.close();
    assert_eq!(cursor.state(), CursorState::Closed);
}

#[tokio::test]
async fn array_limit_bounds_to_array() {
    let storage = storage_with("c", &five()).await;
    let cfg = QueryConfig { array_limit: 3, ..QueryConfig::default() };
    let conn = Connection::with_config(storage, cfg);
    let mut cursor = r::table("c").run(&conn).await.unwrap().into_cursor().unwrap();
    let err = cursor.to_array().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
}

#[tokio::test]
async fn independent_cursors_share_nothing() {
    let conn = connection("c", &five()).await;
    let mut a = r::table("c").run(&conn).await.unwrap().into_cursor().unwrap();
    let mut b = r::table("c").run(&conn).await.unwrap().into_cursor().unwrap();
    a.next().await.unwrap();
    a.close();
    assert_eq!(b.to_array().await.unwrap().len(), 5);
}

#[tokio::test]
async fn evaluation_errors_surface_from_next() {
    let conn = connection("c", &[json!({"id": 1, "n": 1}), json!({"id": 2})]).await;
    let mut cursor =
        r::table("c").map(|row| row.field("n")).run(&conn).await.unwrap().into_cursor().unwrap();
    assert_eq!(cursor.next().await.unwrap(), Datum::from(1));
    assert_eq!(cursor.next().await.unwrap_err().kind(), ErrorKind::KeyMissing);
}
