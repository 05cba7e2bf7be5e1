#![allow(dead_code)]
use async_trait::async_trait;
use nexusql::storage::{
    Conflict, Durability, InsertOutcome, MemoryStorage, ReplaceOutcome, Storage,
    TableOptions, TableRef,
};
use nexusql::{Connection, Datum, DbError};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub async fn storage_with(table: &str, rows: &[Value]) -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    storage.create_table(table, TableOptions::default()).unwrap();
    for row in rows {
        storage.insert(table, Datum::from(row.clone()), Conflict::Error, Durability::Hard).await.unwrap();
    }
    storage
}

pub async fn connection(table: &str, rows: &[Value]) -> Connection {
    Connection::new(storage_with(table, rows).await)
}

pub fn ids(rows: &Datum) -> Vec<i64> {
    rows.expect_array()
        .unwrap()
        .iter()
        .map(|r| r.field("id").and_then(Datum::as_f64).unwrap() as i64)
        .collect()
}

pub fn d(v: Value) -> Datum {
    Datum::from(v)
}

/// Wraps a storage and fails every write with a transport error once tripped.
pub struct FlakyStorage {
    pub inner: Arc<MemoryStorage>,
    pub down: AtomicBool,
}

impl FlakyStorage {
    pub fn new(inner: Arc<MemoryStorage>) -> Self {
        Self { inner, down: AtomicBool::new(false) }
    }

    pub fn trip(&self) {
        self.down.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), DbError> {
        if self.down.load(Ordering::SeqCst) {
            Err(DbError::Connection("link down".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn open_table(&self, name: &str) -> Result<TableRef, DbError> {
        self.inner.open_table(name).await
    }

    async fn insert(
        &self,
        table: &str,
        doc: Datum,
        conflict: Conflict,
        durability: Durability,
    ) -> Result<InsertOutcome, DbError> {
        self.check()?;
        self.inner.insert(table, doc, conflict, durability).await
    }

    async fn replace(
        &self,
        table: &str,
        key: &Datum,
        doc: Datum,
        durability: Durability,
    ) -> Result<ReplaceOutcome, DbError> {
        self.check()?;
        self.inner.replace(table, key, doc, durability).await
    }

    async fn delete(
        &self,
        table: &str,
        key: &Datum,
        durability: Durability,
    ) -> Result<Option<Datum>, DbError> {
        self.check()?;
        self.inner.delete(table, key, durability).await
    }
}
