use nexusql::cli::{Command, OutputMode, TableSpec, run_with_format};
use nexusql::config::Config;
use std::io::Write;

fn table_file(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("s.ndjson");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, r#"{{"id": 1, "a": 2}}"#).unwrap();
    writeln!(f).unwrap();
    writeln!(f, r#"{{"id": 2, "a": 5}}"#).unwrap();
    writeln!(f, r#"{{"id": 3, "a": 2}}"#).unwrap();
    path
}

async fn run(cmd: Command, mode: OutputMode) -> String {
    let mut buf = Vec::new();
    run_with_format(cmd, &Config::default(), mode, &mut buf).await.unwrap();
    String::from_utf8(buf).unwrap()
}

#[tokio::test]
async fn query_streams_ndjson() {
    let dir = tempfile::tempdir().unwrap();
    let spec = TableSpec::parse(&format!("s={}", table_file(dir.path()).display())).unwrap();
    let cmd = Command::Query {
        tables: vec![spec],
        query: r#"["filter", [["table", ["s"]], {"a": 2}]]"#.into(),
    };
    let out = run(cmd, OutputMode::Plain).await;
    let lines: Vec<_> = out.lines().collect();
    assert_eq!(lines, vec![r#"{"a":2,"id":1}"#, r#"{"a":2,"id":3}"#]);
}

#[tokio::test]
async fn query_json_mode_prints_one_document() {
    let dir = tempfile::tempdir().unwrap();
    let spec = TableSpec::parse(&format!("s={}", table_file(dir.path()).display())).unwrap();
    let cmd = Command::Query { tables: vec![spec], query: r#"["count", [["table", ["s"]]]]"#.into() };
    assert_eq!(run(cmd, OutputMode::Json).await.trim(), "3");
}

#[tokio::test]
async fn write_summary_in_plain_mode() {
    let dir = tempfile::tempdir().unwrap();
    let spec = TableSpec::parse(&format!("s={}", table_file(dir.path()).display())).unwrap();
    let cmd = Command::Query {
        tables: vec![spec],
        query: r#"["insert", [["table", ["s"]], [{"id": 4}, {"id": 1}]]]"#.into(),
    };
    let out = run(cmd, OutputMode::Plain).await;
    assert!(out.starts_with("inserted=1 replaced=0 unchanged=0 errors=1"));
}

#[tokio::test]
async fn metrics_lists_counters() {
    let out = run(Command::Metrics, OutputMode::Plain).await;
    assert!(out.contains("nexusql_queries_total"));
}

#[tokio::test]
async fn bad_query_is_an_error() {
    let mut buf = Vec::new();
    let cmd = Command::Explain { query: "not json".into() };
    assert!(run_with_format(cmd, &Config::default(), OutputMode::Plain, &mut buf).await.is_err());
}
