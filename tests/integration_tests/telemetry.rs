use super::_support::connection;
use nexusql::query::telemetry;
use nexusql::r;
use serde_json::json;

#[tokio::test]
async fn query_log_records_hash_and_root() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queries.log");
    telemetry::set_query_log(path.clone(), Some(true));
    let conn = connection("tl", &[json!({"id": 1})]).await;
    let q = r::table("tl").count();
    q.run(&conn).await.unwrap();
    let hash = telemetry::query_hash(q.term());
    let text = std::fs::read_to_string(&path).unwrap();
    let line = text.lines().find(|l| l.contains(&hash)).expect("query line");
    let v: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(v["root"], "count");
    assert_eq!(v["ok"], true);
}

#[tokio::test]
async fn counters_move_with_traffic() {
    let conn = connection("tm", &[json!({"id": 1})]).await;
    let total = |text: &str, name: &str| -> u64 {
        text.lines()
            .find_map(|l| l.strip_prefix(&format!("{name} ")))
            .and_then(|n| n.parse().ok())
            .unwrap()
    };
    let before = telemetry::metrics_text();
    r::table("tm").insert(json!({"id": 2})).run(&conn).await.unwrap();
    let _ = r::table("tm").get(1).field("missing").run(&conn).await;
    let after = telemetry::metrics_text();
    assert!(total(&after, "nexusql_writes_total") > total(&before, "nexusql_writes_total"));
    assert!(
        total(&after, "nexusql_queries_failed_total") > total(&before, "nexusql_queries_failed_total")
    );
}
