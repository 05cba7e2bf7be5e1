use super::_support::{connection, d, ids};
use nexusql::{Datum, ErrorKind, r};
use serde_json::json;

fn sample() -> Vec<serde_json::Value> {
    vec![json!({"id": 1, "a": 2}), json!({"id": 2, "a": 5}), json!({"id": 3, "a": 2})]
}

#[tokio::test]
async fn filter_by_partial_object() {
    let conn = connection("s", &sample()).await;
    let out = r::table("s").filter(json!({"a": 2})).run(&conn).await.unwrap().into_datum().await.unwrap();
    assert_eq!(ids(&out), vec![1, 3]);
}

#[tokio::test]
async fn order_by_desc_is_stable() {
    let conn = connection("s", &sample()).await;
    let out =
        r::table("s").order_by([r::desc("a")]).run(&conn).await.unwrap().into_datum().await.unwrap();
    assert_eq!(ids(&out), vec![2, 1, 3]);
}

#[tokio::test]
async fn filter_with_function_and_count() {
    let conn = connection("s", &sample()).await;
    let n = r::table("s")
        .filter_with(|row| row.field("a").gt(2))
        .count()
        .run(&conn)
        .await
        .unwrap()
        .into_datum()
        .await
        .unwrap();
    assert_eq!(n, Datum::from(1));
}

#[tokio::test]
async fn reduce_with_and_without_base() {
    let conn = connection("s", &[]).await;
    let six = r::expr(vec![1, 2, 3])
        .reduce_with_base(|acc, v| acc.add(v), 0)
        .run(&conn)
        .await
        .unwrap()
        .into_datum()
        .await
        .unwrap();
    assert_eq!(six, Datum::from(6));

    let err = r::expr(Vec::<i32>::new()).reduce(|acc, v| acc.add(v)).run(&conn).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyReduction);
}

#[tokio::test]
async fn missing_field_needs_default() {
    let conn = connection("s", &[]).await;
    let doc = r::expr(json!({"a": 1}));
    let err = doc.field("b").run(&conn).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::KeyMissing);
    let v = doc.field("b").default(7).run(&conn).await.unwrap().into_datum().await.unwrap();
    assert_eq!(v, Datum::from(7));
}

#[tokio::test]
async fn arithmetic_on_strings_is_a_type_error() {
    let conn = connection("s", &[]).await;
    let err = r::expr("x").sub(1).run(&conn).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
}

#[tokio::test]
async fn branch_skips_the_unchosen_arm() {
    let conn = connection("s", &[]).await;
    let v = r::branch(true, 1, r::expr(json!({})).field("nope"))
        .run(&conn)
        .await
        .unwrap()
        .into_datum()
        .await
        .unwrap();
    assert_eq!(v, Datum::from(1));
}

#[tokio::test]
async fn group_then_count_ungroups_on_return() {
    let conn = connection("s", &sample()).await;
    let out = r::table("s").group("a").count().run(&conn).await.unwrap().into_datum().await.unwrap();
    assert_eq!(
        out,
        d(json!([{"group": 2, "reduction": 2}, {"group": 5, "reduction": 1}]))
    );
}

#[tokio::test]
async fn eq_join_then_zip_merges_right_over_left() {
    let storage = super::_support::storage_with(
        "posts",
        &[json!({"id": 1, "author": "ann", "title": "hi"}), json!({"id": 2, "author": "bob", "title": "yo"})],
    )
    .await;
    storage.create_table("authors", nexusql::storage::TableOptions::default()).unwrap();
    let conn = nexusql::Connection::new(storage);
    r::table("authors")
        .insert(json!([{"id": "ann", "title": "editor"}]))
        .run(&conn)
        .await
        .unwrap();
    let out = r::table("posts")
        .eq_join("author", r::table("authors"))
        .zip()
        .run(&conn)
        .await
        .unwrap()
        .into_datum()
        .await
        .unwrap();
    assert_eq!(out, d(json!([{"id": "ann", "author": "ann", "title": "editor"}])));
}

#[tokio::test]
async fn outer_join_keeps_unmatched_left_rows() {
    let conn = connection("s", &sample()).await;
    let out = r::expr(vec![2, 9])
        .outer_join(r::table("s"), |l, r_| l.eq(r_.field("a")))
        .map(|pair| pair.field("right").default(r::expr(Datum::Null)))
        .run(&conn)
        .await
        .unwrap()
        .into_datum()
        .await
        .unwrap();
    let rows = out.expect_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows[2].is_null());
}

#[tokio::test]
async fn nth_past_the_end_is_out_of_range() {
    let conn = connection("s", &sample()).await;
    let err = r::table("s").nth(10).run(&conn).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
}

#[tokio::test]
async fn concat_map_flattens_one_level() {
    let conn = connection("s", &[]).await;
    let out = r::expr(json!([[1], [2]]))
        .concat_map(|x| r::array([x]))
        .run(&conn)
        .await
        .unwrap()
        .into_datum()
        .await
        .unwrap();
    assert_eq!(out, d(json!([[1], [2]])));
}

#[tokio::test]
async fn unknown_table_is_reported() {
    let conn = connection("s", &[]).await;
    let err = r::table("missing").count().run(&conn).await.unwrap_err();
    assert!(err.to_string().contains("missing"));
}

#[tokio::test]
async fn filter_on_object_valued_field_uses_truthiness() {
    let conn = connection("subs", &[json!({"id": 1, "sub": {"x": 1}}), json!({"id": 2, "sub": null})]).await;
    let out = r::table("subs").filter(r::field("sub")).run(&conn).await.unwrap().into_datum().await.unwrap();
    assert_eq!(ids(&out), vec![1]);
}

#[tokio::test]
async fn inner_join_pairs_every_match() {
    let conn = connection("s", &sample()).await;
    let out = r::expr(vec![2, 5, 7])
        .inner_join(r::table("s"), |l, r_| l.eq(r_.field("a")))
        .map(|pair| r::array([pair.field("left"), pair.field("right").field("id")]))
        .run(&conn)
        .await
        .unwrap()
        .into_datum()
        .await
        .unwrap();
    assert_eq!(out, d(json!([[2, 1], [2, 3], [5, 2]])));
}

#[tokio::test]
async fn in_timezone_keeps_the_instant() {
    let conn = connection("s", &[]).await;
    let utc = r::epoch_time(1_700_000_000);
    let shifted = utc.in_timezone("+05:00");
    let mut got = Vec::new();
    for q in [
        utc.to_epoch_time(),
        shifted.to_epoch_time(),
        utc.hours(),
        shifted.hours(),
        utc.timezone(),
        shifted.timezone(),
    ] {
        got.push(q.run(&conn).await.unwrap().into_datum().await.unwrap());
    }
    assert_eq!(got[0], Datum::from(1_700_000_000));
    assert_eq!(got[0], got[1]);
    assert_eq!((got[2].clone(), got[3].clone()), (Datum::from(22), Datum::from(3)));
    assert_eq!((got[4].clone(), got[5].clone()), (Datum::from("+00:00"), Datum::from("+05:00")));
}
