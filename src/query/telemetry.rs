//! Process-wide query counters and the slow-query log.
use super::parse::to_query_json;
use super::term::Term;
use super::write::WriteResult;
use crate::utils::num::u128_to_u64_saturating;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};

pub const METRICS_TARGET: &str = "nexusql::metrics";

const DEFAULT_SLOW_MS: u64 = 500;

#[derive(Debug, Clone)]
struct QueryLog {
    slow_ms: u64,
    /// One line per finished query when set.
    file: Option<PathBuf>,
    json_lines: bool,
}

impl Default for QueryLog {
    fn default() -> Self {
        let slow_ms = std::env::var("NEXUSQL_SLOW_QUERY_MS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_SLOW_MS);
        Self { slow_ms, file: None, json_lines: true }
    }
}

#[derive(Debug, Default)]
struct Counters {
    queries: AtomicU64,
    slow_queries: AtomicU64,
    failed_queries: AtomicU64,
    documents_written: AtomicU64,
    cursors_opened: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn exposition(&self) -> [(&'static str, u64); 5] {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        [
            ("nexusql_queries_total", get(&self.queries)),
            ("nexusql_queries_slow_total", get(&self.slow_queries)),
            ("nexusql_queries_failed_total", get(&self.failed_queries)),
            ("nexusql_writes_total", get(&self.documents_written)),
            ("nexusql_cursors_opened_total", get(&self.cursors_opened)),
        ]
    }
}

#[derive(Debug, Default)]
struct Hub {
    log: RwLock<QueryLog>,
    counters: Counters,
}

static HUB: LazyLock<Hub> = LazyLock::new(Hub::default);

pub fn set_slow_query_ms(ms: u64) {
    HUB.log.write().slow_ms = ms;
}

/// Sends one line per query to `path`; `json_lines` picks JSON over `key=value` text.
pub fn set_query_log(path: PathBuf, json_lines: Option<bool>) {
    let mut log = HUB.log.write();
    log.file = Some(path);
    if let Some(json) = json_lines {
        log.json_lines = json;
    }
}

fn append_line(path: &Path, line: &str) {
    let opened = std::fs::OpenOptions::new().create(true).append(true).open(path);
    match opened {
        Ok(mut file) => {
            if let Err(e) = writeln!(file, "{line}") {
                log::debug!("query log: write failed path={}, error={e}", path.display());
            }
        }
        Err(e) => log::debug!("query log: open failed path={}, error={e}", path.display()),
    }
}

/// Stable identifier of a query: SHA-256 of its wire form.
#[must_use]
pub fn query_hash(term: &Term) -> String {
    hex::encode(Sha256::digest(to_query_json(term).as_bytes()))
}

/// Records one finished query. Slow queries are also reported on the metrics target.
pub fn log_query(hash: &str, root: &str, duration_ms: u128, ok: bool) {
    let counters = &HUB.counters;
    Counters::bump(&counters.queries, 1);
    if !ok {
        Counters::bump(&counters.failed_queries, 1);
    }
    let log = HUB.log.read().clone();
    let ms = u128_to_u64_saturating(duration_ms);
    let slow = ms >= log.slow_ms;
    if slow {
        Counters::bump(&counters.slow_queries, 1);
        log::warn!(
            target: METRICS_TARGET,
            "slow query: hash={hash}, root={root}, duration_ms={ms}, threshold_ms={}",
            log.slow_ms
        );
    }
    crate::dev6!("query hash={} root={} duration_ms={} ok={}", hash, root, ms, ok);
    let Some(path) = log.file.as_deref() else {
        return;
    };
    let ts = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    let line = if log.json_lines {
        serde_json::json!({
            "ts": ts,
            "query_hash": hash,
            "root": root,
            "duration_ms": ms,
            "ok": ok,
            "slow": slow,
        })
        .to_string()
    } else {
        format!("ts={ts} query_hash={hash} root={root} duration_ms={ms} ok={ok} slow={slow}")
    };
    append_line(path, &line);
}

/// Adds every document a write considered to the write counter.
pub fn log_write(result: &WriteResult) {
    Counters::bump(&HUB.counters.documents_written, result.total());
}

pub fn log_cursor_opened() {
    Counters::bump(&HUB.counters.cursors_opened, 1);
}

/// Counters in Prometheus exposition format.
#[must_use]
pub fn metrics_text() -> String {
    HUB.counters.exposition().iter().map(|(name, value)| format!("{name} {value}\n")).collect()
}
