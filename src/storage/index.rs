use crate::datum::Datum;
use crate::query::eval::apply_standalone;
use crate::query::term::Term;
use crate::storage::is_valid_range;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub keys: usize,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub multi: bool,
}

/// Ordered map from index value to the primary keys of rows carrying it.
#[derive(Debug, Clone)]
pub struct SecondaryIndex {
    pub name: String,
    func: Arc<Term>,
    multi: bool,
    map: BTreeMap<Datum, BTreeSet<Datum>>,
    pub stats: IndexStats,
}

impl SecondaryIndex {
    /// `func` is evaluated against each row; a bare string names a field.
    #[must_use]
    pub fn new(name: &str, func: Arc<Term>, multi: bool) -> Self {
        let func = match func.as_ref() {
            Term::Literal(Datum::String(field)) => Arc::new(Term::Field(field.clone())),
            _ => func,
        };
        Self { name: name.to_owned(), func, multi, map: BTreeMap::new(), stats: IndexStats::default() }
    }

    #[must_use]
    pub fn descriptor(&self) -> IndexDescriptor {
        IndexDescriptor { name: self.name.clone(), multi: self.multi }
    }

    /// Index values for `doc`. Rows the function fails on, or maps to `null`, are not indexed.
    fn keys_for(&self, doc: &Datum) -> Vec<Datum> {
        match apply_standalone(&self.func, doc.clone()) {
            Ok(Datum::Null) => Vec::new(),
            Ok(Datum::Array(items)) if self.multi => items,
            Ok(key) => vec![key],
            Err(e) => {
                log::trace!("index {}: row not indexed: {e}", self.name);
                Vec::new()
            }
        }
    }

    pub fn insert(&mut self, doc: &Datum, pk: &Datum) {
        for key in self.keys_for(doc) {
            if self.map.entry(key).or_default().insert(pk.clone()) {
                self.stats.entries += 1;
            }
        }
        self.stats.keys = self.map.len();
    }

    pub fn remove(&mut self, doc: &Datum, pk: &Datum) {
        for key in self.keys_for(doc) {
            if let Some(set) = self.map.get_mut(&key) {
                if set.remove(pk) {
                    self.stats.entries = self.stats.entries.saturating_sub(1);
                }
                if set.is_empty() {
                    self.map.remove(&key);
                }
            }
        }
        self.stats.keys = self.map.len();
    }

    /// Primary keys of rows whose index value equals `key`.
    #[must_use]
    pub fn lookup(&self, key: &Datum) -> Vec<Datum> {
        self.map.get(key).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }

    /// Primary keys in index order for values between the bounds.
    #[must_use]
    pub fn range(&self, lower: Bound<&Datum>, upper: Bound<&Datum>) -> Vec<Datum> {
        if !is_valid_range(lower, upper) {
            return Vec::new();
        }
        self.map.range((lower, upper)).flat_map(|(_, set)| set.iter().cloned()).collect()
    }
}
