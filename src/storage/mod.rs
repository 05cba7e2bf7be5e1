//! Storage collaborator contract.
//!
//! The query core never touches storage internals. It opens tables as immutable snapshots
//! (`TableSource`) and sends writes document by document through the async `Storage` trait.
pub mod index;
pub mod memory;

pub use memory::MemoryStorage;

use crate::datum::Datum;
use crate::errors::DbError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ops::Bound;
use std::sync::Arc;

/// Caller preference for how eagerly a write is flushed. Interpreted by storage only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    Soft,
    #[default]
    Hard,
}

impl Durability {
    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "soft" => Ok(Self::Soft),
            "hard" => Ok(Self::Hard),
            other => Err(DbError::InvalidArgument(format!(
                "Durability option `{other}` unrecognized (options are \"hard\" and \"soft\")"
            ))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Soft => "soft",
            Self::Hard => "hard",
        }
    }
}

/// What an insert does when the primary key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    Error,
    Replace,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted,
    Replaced { old: Datum },
    Unchanged,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplaceOutcome {
    Replaced { old: Datum },
    Unchanged,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOptions {
    pub primary_key: String,
    /// Used by writes that carry no durability of their own. `None` defers to the connection.
    pub durability: Option<Durability>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self { primary_key: "id".into(), durability: None }
    }
}

pub type TableRef = Arc<dyn TableSource>;

/// Read-only snapshot of one table, valid for the duration of a query.
pub trait TableSource: Send + Sync {
    fn name(&self) -> &str;

    fn primary_key(&self) -> &str;

    /// Durability configured on the table, if any.
    fn durability(&self) -> Option<Durability>;

    /// Rows in primary key order.
    fn scan(&self) -> Box<dyn Iterator<Item = Datum> + Send>;

    fn get(&self, key: &Datum) -> Option<Datum>;

    /// Rows whose `index` value equals `key`. The primary key name is a valid index.
    fn index_lookup(&self, index: &str, key: &Datum) -> Result<Vec<Datum>, DbError>;

    /// Rows whose `index` value falls between the bounds, in index order.
    fn index_range(
        &self,
        index: &str,
        lower: Bound<&Datum>,
        upper: Bound<&Datum>,
    ) -> Result<Vec<Datum>, DbError>;
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn open_table(&self, name: &str) -> Result<TableRef, DbError>;

    async fn insert(
        &self,
        table: &str,
        doc: Datum,
        conflict: Conflict,
        durability: Durability,
    ) -> Result<InsertOutcome, DbError>;

    async fn replace(
        &self,
        table: &str,
        key: &Datum,
        doc: Datum,
        durability: Durability,
    ) -> Result<ReplaceOutcome, DbError>;

    /// Returns the removed row, if any.
    async fn delete(
        &self,
        table: &str,
        key: &Datum,
        durability: Durability,
    ) -> Result<Option<Datum>, DbError>;
}

/// `BTreeMap::range` panics on inverted or empty-exclusive bounds; this filters those out.
pub(crate) fn is_valid_range(lower: Bound<&Datum>, upper: Bound<&Datum>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l <= u,
        (Bound::Included(l) | Bound::Excluded(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u)) => l < u,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durability_parses_known_values() {
        assert_eq!(Durability::parse("soft").unwrap(), Durability::Soft);
        assert_eq!(Durability::parse("hard").unwrap().as_str(), "hard");
        assert!(Durability::parse("eventual").is_err());
    }

    #[test]
    fn range_validity() {
        let a = Datum::from(1);
        let b = Datum::from(2);
        assert!(is_valid_range(Bound::Included(&a), Bound::Excluded(&b)));
        assert!(!is_valid_range(Bound::Included(&a), Bound::Excluded(&a)));
        assert!(is_valid_range(Bound::Included(&a), Bound::Included(&a)));
        assert!(!is_valid_range(Bound::Included(&b), Bound::Included(&a)));
        assert!(is_valid_range(Bound::Unbounded, Bound::Excluded(&a)));
    }
}
