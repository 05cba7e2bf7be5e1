//! In-process storage backed by ordered maps.
//!
//! Every table keeps its rows and secondary indexes behind `Arc`s. Opening a table hands out a
//! snapshot that shares those maps; a write made while a snapshot is alive clones the map first
//! (`Arc::make_mut`), so running queries never observe partial writes.
use super::index::{IndexDescriptor, IndexStats, SecondaryIndex};
use super::{
    Conflict, Durability, InsertOutcome, ReplaceOutcome, Storage, TableOptions,
    TableRef, TableSource, is_valid_range,
};
use crate::datum::Datum;
use crate::errors::DbError;
use crate::query::builder::Expr;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

type Rows = Arc<BTreeMap<Datum, Datum>>;
type Indexes = Arc<BTreeMap<String, SecondaryIndex>>;

/// Number of writes acknowledged per durability hint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurabilityStats {
    pub hard: u64,
    pub soft: u64,
}

impl DurabilityStats {
    fn record(&mut self, durability: Durability) {
        match durability {
            Durability::Hard => self.hard += 1,
            Durability::Soft => self.soft += 1,
        }
    }
}

#[derive(Debug)]
struct TableState {
    name: String,
    options: TableOptions,
    rows: Rows,
    indexes: Indexes,
    durability: DurabilityStats,
}

impl TableState {
    fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            name: self.name.clone(),
            primary_key: self.options.primary_key.clone(),
            durability: self.options.durability,
            rows: Arc::clone(&self.rows),
            indexes: Arc::clone(&self.indexes),
        }
    }

    fn primary_key_of(&self, doc: &Datum) -> Result<Datum, DbError> {
        let obj = doc.expect_object()?;
        obj.get(&self.options.primary_key).cloned().ok_or_else(|| {
            DbError::InvalidArgument(format!(
                "Document is missing primary key `{}`",
                self.options.primary_key
            ))
        })
    }

    /// Stores `doc` under `pk`, keeping every index in step. Returns the previous row.
    fn put(&mut self, pk: &Datum, doc: Datum) -> Option<Datum> {
        let old = Arc::make_mut(&mut self.rows).insert(pk.clone(), doc.clone());
        for idx in Arc::make_mut(&mut self.indexes).values_mut() {
            if let Some(old) = &old {
                idx.remove(old, pk);
            }
            idx.insert(&doc, pk);
        }
        old
    }

    fn take(&mut self, pk: &Datum) -> Option<Datum> {
        if !self.rows.contains_key(pk) {
            return None;
        }
        let old = Arc::make_mut(&mut self.rows).remove(pk)?;
        for idx in Arc::make_mut(&mut self.indexes).values_mut() {
            idx.remove(&old, pk);
        }
        Some(old)
    }
}

/// Immutable view of one table handed to the evaluator.
#[derive(Debug)]
pub struct TableSnapshot {
    name: String,
    primary_key: String,
    durability: Option<Durability>,
    rows: Rows,
    indexes: Indexes,
}

impl TableSnapshot {
    fn index(&self, index: &str) -> Result<&SecondaryIndex, DbError> {
        self.indexes.get(index).ok_or_else(|| DbError::NoSuchIndex {
            table: self.name.clone(),
            index: index.to_owned(),
        })
    }

    fn resolve(&self, keys: Vec<Datum>) -> Vec<Datum> {
        keys.iter().filter_map(|k| self.rows.get(k).cloned()).collect()
    }
}

impl TableSource for TableSnapshot {
    fn name(&self) -> &str {
        &self.name
    }

    fn primary_key(&self) -> &str {
        &self.primary_key
    }

    fn durability(&self) -> Option<Durability> {
        self.durability
    }

    fn scan(&self) -> Box<dyn Iterator<Item = Datum> + Send> {
        Box::new(ScanIter { rows: Arc::clone(&self.rows), last: None })
    }

    fn get(&self, key: &Datum) -> Option<Datum> {
        self.rows.get(key).cloned()
    }

    fn index_lookup(&self, index: &str, key: &Datum) -> Result<Vec<Datum>, DbError> {
        if index == self.primary_key {
            return Ok(self.get(key).into_iter().collect());
        }
        Ok(self.resolve(self.index(index)?.lookup(key)))
    }

    fn index_range(
        &self,
        index: &str,
        lower: Bound<&Datum>,
        upper: Bound<&Datum>,
    ) -> Result<Vec<Datum>, DbError> {
        if index == self.primary_key {
            if !is_valid_range(lower, upper) {
                return Ok(Vec::new());
            }
            return Ok(self.rows.range::<Datum, _>((lower, upper)).map(|(_, v)| v.clone()).collect());
        }
        Ok(self.resolve(self.index(index)?.range(lower, upper)))
    }
}

/// Walks a snapshot in key order without borrowing it.
struct ScanIter {
    rows: Rows,
    last: Option<Datum>,
}

impl Iterator for ScanIter {
    type Item = Datum;

    fn next(&mut self) -> Option<Datum> {
        let next = match &self.last {
            None => self.rows.iter().next(),
            Some(last) => {
                self.rows.range::<Datum, _>((Bound::Excluded(last), Bound::Unbounded)).next()
            }
        }
        .map(|(k, v)| (k.clone(), v.clone()));
        let (key, row) = next?;
        self.last = Some(key);
        Some(row)
    }
}

/// Tables held in memory. Cheap to share behind an `Arc`.
#[derive(Default)]
pub struct MemoryStorage {
    tables: RwLock<BTreeMap<String, Arc<RwLock<TableState>>>>,
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage").field("tables", &self.table_list()).finish()
    }
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self, name: &str) -> Result<Arc<RwLock<TableState>>, DbError> {
        self.tables.read().get(name).cloned().ok_or_else(|| DbError::NoSuchTable(name.to_owned()))
    }

    pub fn create_table(&self, name: &str, options: TableOptions) -> Result<(), DbError> {
        let mut tables = self.tables.write();
        if tables.contains_key(name) {
            return Err(DbError::InvalidArgument(format!("Table `{name}` already exists")));
        }
        log::info!("create_table: name={}, primary_key={}", name, options.primary_key);
        tables.insert(
            name.to_owned(),
            Arc::new(RwLock::new(TableState {
                name: name.to_owned(),
                options,
                rows: Arc::default(),
                indexes: Arc::default(),
                durability: DurabilityStats::default(),
            })),
        );
        Ok(())
    }

    pub fn drop_table(&self, name: &str) -> Result<(), DbError> {
        self.tables
            .write()
            .remove(name)
            .map(|_| log::info!("drop_table: name={name}"))
            .ok_or_else(|| DbError::NoSuchTable(name.to_owned()))
    }

    #[must_use]
    pub fn table_list(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    /// Builds a secondary index over the existing rows and maintains it on every later write.
    /// `func` is a field name or a one-argument function; rows it fails on are left out.
    pub fn index_create(
        &self,
        table: &str,
        name: &str,
        func: &Expr,
        multi: bool,
    ) -> Result<(), DbError> {
        let state = self.state(table)?;
        let mut state = state.write();
        if name == state.options.primary_key || state.indexes.contains_key(name) {
            return Err(DbError::InvalidArgument(format!(
                "Index `{name}` already exists on table `{table}`"
            )));
        }
        let mut idx = SecondaryIndex::new(name, Arc::clone(func.term()), multi);
        for (pk, row) in state.rows.iter() {
            idx.insert(row, pk);
        }
        log::info!(
            "index_create: table={}, index={}, keys={}, entries={}",
            table,
            name,
            idx.stats.keys,
            idx.stats.entries
        );
        Arc::make_mut(&mut state.indexes).insert(name.to_owned(), idx);
        Ok(())
    }

    pub fn index_drop(&self, table: &str, name: &str) -> Result<(), DbError> {
        let state = self.state(table)?;
        let mut state = state.write();
        if Arc::make_mut(&mut state.indexes).remove(name).is_none() {
            return Err(DbError::NoSuchIndex { table: table.to_owned(), index: name.to_owned() });
        }
        log::info!("index_drop: table={table}, index={name}");
        Ok(())
    }

    pub fn index_list(&self, table: &str) -> Result<Vec<IndexDescriptor>, DbError> {
        let state = self.state(table)?;
        let state = state.read();
        Ok(state.indexes.values().map(SecondaryIndex::descriptor).collect())
    }

    pub fn index_stats(&self, table: &str, name: &str) -> Result<IndexStats, DbError> {
        let state = self.state(table)?;
        let state = state.read();
        state.indexes.get(name).map(|i| i.stats.clone()).ok_or_else(|| DbError::NoSuchIndex {
            table: table.to_owned(),
            index: name.to_owned(),
        })
    }

    pub fn durability_stats(&self, table: &str) -> Result<DurabilityStats, DbError> {
        Ok(self.state(table)?.read().durability)
    }

    /// Options `table` was created with.
    pub fn table_options(&self, table: &str) -> Result<TableOptions, DbError> {
        Ok(self.state(table)?.read().options.clone())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn open_table(&self, name: &str) -> Result<TableRef, DbError> {
        let state = self.state(name)?;
        let snapshot = state.read().snapshot();
        log::debug!("open_table: name={}, rows={}", name, snapshot.rows.len());
        Ok(Arc::new(snapshot))
    }

    async fn insert(
        &self,
        table: &str,
        doc: Datum,
        conflict: Conflict,
        durability: Durability,
    ) -> Result<InsertOutcome, DbError> {
        let state = self.state(table)?;
        let mut state = state.write();
        let pk = state.primary_key_of(&doc)?;
        let existing = state.rows.get(&pk).cloned();
        let outcome = match existing {
            Some(_) if conflict == Conflict::Error => {
                return Err(DbError::DuplicateKey { table: table.to_owned(), key: pk.to_json() });
            }
            Some(old) if old == doc => InsertOutcome::Unchanged,
            Some(old) => {
                state.put(&pk, doc);
                InsertOutcome::Replaced { old }
            }
            None => {
                state.put(&pk, doc);
                InsertOutcome::Inserted
            }
        };
        state.durability.record(durability);
        log::debug!("insert: table={}, key={}, durability={}", table, pk.to_json(), durability.as_str());
        Ok(outcome)
    }

    async fn replace(
        &self,
        table: &str,
        key: &Datum,
        doc: Datum,
        durability: Durability,
    ) -> Result<ReplaceOutcome, DbError> {
        let state = self.state(table)?;
        let mut state = state.write();
        match state.rows.get(key) {
            None => return Ok(ReplaceOutcome::Missing),
            Some(existing) if *existing == doc => return Ok(ReplaceOutcome::Unchanged),
            Some(_) => {}
        }
        if state.primary_key_of(&doc)? != *key {
            return Err(DbError::InvalidArgument(format!(
                "Primary key `{}` cannot be changed",
                state.options.primary_key
            )));
        }
        let old = state.put(key, doc).unwrap_or_default();
        state.durability.record(durability);
        log::debug!("replace: table={}, key={}", table, key.to_json());
        Ok(ReplaceOutcome::Replaced { old })
    }

    async fn delete(
        &self,
        table: &str,
        key: &Datum,
        durability: Durability,
    ) -> Result<Option<Datum>, DbError> {
        let state = self.state(table)?;
        let mut state = state.write();
        let removed = state.take(key);
        if removed.is_some() {
            state.durability.record(durability);
            log::debug!("delete: table={}, key={}", table, key.to_json());
        }
        Ok(removed)
    }
}
