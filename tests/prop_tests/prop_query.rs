use super::_support::{connection, ids};
use nexusql::{Connection, Datum, Expr, r};
use proptest::prelude::*;
use serde_json::json;

fn rt() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread().worker_threads(1).enable_all().build().unwrap()
}

fn rows(values: &[(i64, i64)]) -> Vec<serde_json::Value> {
    values.iter().enumerate().map(|(i, (a, b))| json!({"id": i, "a": a, "b": b})).collect()
}

async fn eval(conn: &Connection, q: &Expr) -> Datum {
    q.run(conn).await.unwrap().into_datum().await.unwrap()
}

proptest! {
    #![proptest_config(proptest::test_runner::Config {
        failure_persistence: Some(Box::new(proptest::test_runner::FileFailurePersistence::WithSource("proptest-regressions"))),
        cases: 32,
        .. proptest::test_runner::Config::default()
    })]

    #[test]
    fn prop_filter_composition(v in proptest::collection::vec((-5i64..5, -5i64..5), 0..30), x in -5i64..5, y in -5i64..5) {
        rt().block_on(async {
            let conn = connection("p", &rows(&v)).await;
            let chained = eval(&conn, &r::table("p").filter(r::field("a").gt(x)).filter(r::field("b").le(y))).await;
            let joined = eval(&conn, &r::table("p").filter(r::field("a").gt(x).and(r::field("b").le(y)))).await;
            assert_eq!(chained, joined);
        });
    }

    #[test]
    fn prop_asc_desc_are_reverses_without_ties(v in proptest::collection::btree_set(-1000i64..1000, 0..30)) {
        rt().block_on(async {
            let values: Vec<(i64, i64)> = v.iter().map(|a| (*a, 0)).collect();
            let conn = connection("p", &rows(&values)).await;
            let asc = eval(&conn, &r::table("p").order_by([r::asc("a")])).await;
            let desc = eval(&conn, &r::table("p").order_by([r::desc("a")])).await;
            let mut reversed = ids(&desc);
            reversed.reverse();
            assert_eq!(ids(&asc), reversed);
        });
    }

    #[test]
    fn prop_distinct_is_idempotent(v in proptest::collection::vec(-3i64..3, 0..40)) {
        rt().block_on(async {
            let conn = connection("p", &[]).await;
            let once = eval(&conn, &r::expr(v.clone()).distinct()).await;
            let twice = eval(&conn, &r::expr(v.clone()).distinct().distinct()).await;
            assert_eq!(once, twice);
        });
    }

    #[test]
    fn prop_map_preserves_count(v in proptest::collection::vec((-5i64..5, -5i64..5), 0..30)) {
        rt().block_on(async {
            let conn = connection("p", &rows(&v)).await;
            let before = eval(&conn, &r::table("p").count()).await;
            let after = eval(&conn, &r::table("p").map(|row| row.field("a").mul(2)).count()).await;
            assert_eq!(before, after);
            assert_eq!(before, Datum::from(v.len()));
        });
    }

    #[test]
    fn prop_field_default(present in any::<bool>(), value in -100i64..100, fallback in -100i64..100) {
        rt().block_on(async {
            let conn = connection("p", &[]).await;
            let doc = if present { json!({"f": value}) } else { json!({}) };
            let got = eval(&conn, &r::expr(doc).field("f").default(fallback)).await;
            let want = if present { value } else { fallback };
            assert_eq!(got, Datum::from(want));
        });
    }
}
