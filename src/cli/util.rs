use crate::datum::Datum;
use crate::errors::DbError;
use crate::storage::{Conflict, Durability, MemoryStorage, Storage, TableOptions};
use std::io::{BufRead, Read};
use std::path::PathBuf;

/// `name=path.ndjson[:primary_key]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub path: PathBuf,
    pub primary_key: String,
}

impl TableSpec {
    pub fn parse(s: &str) -> Result<Self, DbError> {
        let (name, rest) = s.split_once('=').ok_or_else(|| {
            DbError::InvalidArgument(format!("Expected `name=path[:primary_key]` but found `{s}`"))
        })?;
        if name.is_empty() || rest.is_empty() {
            return Err(DbError::InvalidArgument(format!("Incomplete table spec `{s}`")));
        }
        // A trailing `:pk` only counts when it cannot be part of the path.
        let (path, pk) = match rest.rsplit_once(':') {
            Some((p, pk)) if !p.is_empty() && !pk.is_empty() && !pk.contains(['/', '\\']) => (p, pk),
            _ => (rest, "id"),
        };
        Ok(Self { name: name.to_owned(), path: PathBuf::from(path), primary_key: pk.to_owned() })
    }
}

/// A literal query, or `@file` to read it from disk.
pub fn read_query_arg(s: &str) -> Result<String, DbError> {
    match s.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| DbError::Io(format!("Failed to read query file {path}: {e}"))),
        None => Ok(s.to_owned()),
    }
}

fn read_ndjson(spec: &TableSpec, file: std::fs::File) -> Result<Vec<Datum>, DbError> {
    let mut rows = Vec::new();
    for (lineno, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(&line).map_err(|e| {
            DbError::InvalidArgument(format!("{}:{}: {e}", spec.path.display(), lineno + 1))
        })?;
        rows.push(Datum::from(value));
    }
    Ok(rows)
}

const MAX_BSON_DOC: usize = 16 * 1024 * 1024;

/// Concatenated BSON documents, each prefixed by its little-endian length.
fn read_bson(spec: &TableSpec, file: std::fs::File) -> Result<Vec<Datum>, DbError> {
    let mut reader = std::io::BufReader::new(file);
    let mut rows = Vec::new();
    let mut buf = Vec::with_capacity(4096);
    loop {
        let mut prefix = Vec::with_capacity(4);
        match (&mut reader).take(4).read_to_end(&mut prefix)? {
            0 => break,
            4 => {}
            n => {
                return Err(DbError::InvalidArgument(format!(
                    "{}: document {}: truncated length prefix ({n} of 4 bytes)",
                    spec.path.display(),
                    rows.len()
                )));
            }
        }
        let len_buf = [prefix[0], prefix[1], prefix[2], prefix[3]];
        let len = usize::try_from(i32::from_le_bytes(len_buf)).unwrap_or(0);
        if len < 5 || len > MAX_BSON_DOC {
            return Err(DbError::InvalidArgument(format!(
                "{}: invalid BSON document size {len}",
                spec.path.display()
            )));
        }
        buf.clear();
        buf.extend_from_slice(&len_buf);
        buf.resize(len, 0);
        reader.read_exact(&mut buf[4..])?;
        let doc = bson::Document::from_reader(&mut &buf[..]).map_err(|e| {
            DbError::InvalidArgument(format!("{}: document {}: {e}", spec.path.display(), rows.len()))
        })?;
        rows.push(Datum::try_from(doc)?);
    }
    Ok(rows)
}

/// Creates the table described by `spec` and loads its rows. `.bson` files hold concatenated
/// BSON documents; anything else is read as NDJSON with blank lines skipped.
/// Returns the number of rows loaded.
pub async fn load_table(
    storage: &MemoryStorage,
    spec: &TableSpec,
    durability: Durability,
) -> Result<usize, DbError> {
    storage.create_table(&spec.name, TableOptions { primary_key: spec.primary_key.clone(), durability: Some(durability) })?;
    let file = std::fs::File::open(&spec.path)
        .map_err(|e| DbError::Io(format!("Failed to open {}: {e}", spec.path.display())))?;
    let is_bson = spec.path.extension().is_some_and(|e| e.eq_ignore_ascii_case("bson"));
    let rows = if is_bson { read_bson(spec, file)? } else { read_ndjson(spec, file)? };
    let n = rows.len();
    for row in rows {
        storage.insert(&spec.name, row, Conflict::Error, durability).await?;
    }
    log::info!("load_table: name={}, path={}, rows={}, bson={}", spec.name, spec.path.display(), n, is_bson);
    Ok(n)
}
