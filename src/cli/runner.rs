use crate::config::Config;
use crate::connection::{Connection, Response, RunOptions};
use crate::datum::Datum;
use crate::query::parse::to_wire;
use crate::query::{parse_query_json, telemetry, to_query_json};
use crate::storage::MemoryStorage;
use std::io::Write;
use std::sync::Arc;

use super::command::Command;
use super::util::load_table;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputMode {
    /// One JSON value per line.
    Plain,
    /// A single JSON document.
    Json,
}

impl OutputMode {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "plain" | "ndjson" => Some(Self::Plain),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

fn write_rows(out: &mut dyn Write, rows: &[Datum], mode: OutputMode) -> std::io::Result<()> {
    match mode {
        OutputMode::Json => writeln!(out, "{}", Datum::Array(rows.to_vec()).to_json()),
        OutputMode::Plain => rows.iter().try_for_each(|r| writeln!(out, "{}", r.to_json())),
    }
}

pub async fn run_with_format(
    cmd: Command,
    cfg: &Config,
    mode: OutputMode,
    out: &mut dyn Write,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        Command::Query { tables, query } => {
            let storage = Arc::new(MemoryStorage::new());
            for spec in &tables {
                load_table(&storage, spec, cfg.query.default_durability).await?;
            }
            let term = Arc::new(parse_query_json(&query)?);
            let conn = Connection::with_config(storage, cfg.query.clone());
            match conn.run_term(&term, &RunOptions::default()).await? {
                Response::Atom(Datum::Array(rows)) if mode == OutputMode::Plain => {
                    write_rows(out, &rows, mode)?;
                }
                Response::Atom(d) => writeln!(out, "{}", d.to_json())?,
                Response::Cursor(mut cursor) => {
                    if mode == OutputMode::Json {
                        write_rows(out, &cursor.to_array().await?, mode)?;
                    } else {
                        while let Some(row) = cursor.try_next().await? {
                            writeln!(out, "{}", row.to_json())?;
                        }
                    }
                }
                Response::Write(result) => match mode {
                    OutputMode::Json => writeln!(out, "{}", serde_json::to_string(&result)?)?,
                    OutputMode::Plain => writeln!(
                        out,
                        "inserted={} replaced={} unchanged={} errors={} deleted={} skipped={}",
                        result.inserted,
                        result.replaced,
                        result.unchanged,
                        result.errors,
                        result.deleted,
                        result.skipped
                    )?,
                },
            }
            Ok(())
        }
        Command::Explain { query } => {
            let term = parse_query_json(&query)?;
            let wire = to_query_json(&term);
            let hash = telemetry::query_hash(&term);
            match mode {
                OutputMode::Json => {
                    let json = serde_json::json!({"term": to_wire(&term), "hash": hash});
                    writeln!(out, "{json}")?;
                }
                OutputMode::Plain => {
                    writeln!(out, "{wire}")?;
                    writeln!(out, "hash={hash}")?;
                }
            }
            Ok(())
        }
        Command::Metrics => {
            write!(out, "{}", telemetry::metrics_text())?;
            Ok(())
        }
    }
}
