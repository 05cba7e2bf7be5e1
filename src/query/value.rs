use crate::datum::{Datum, object};
use crate::errors::DbError;
use crate::storage::TableRef;
use std::collections::BTreeMap;
use std::fmt;

pub type DatumIter = Box<dyn Iterator<Item = Result<Datum, DbError>> + Send>;

/// Where a sequence came from. Sequences derived from array literals are answered as arrays;
/// everything else is streamed through a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqKind {
    Array,
    Stream,
}

/// A lazy, pull-based sequence of rows.
pub struct Sequence {
    iter: DatumIter,
    pub kind: SeqKind,
    pub infinite: bool,
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence").field("kind", &self.kind).field("infinite", &self.infinite).finish()
    }
}

impl Sequence {
    #[must_use]
    pub fn array(items: Vec<Datum>) -> Self {
        Self { iter: Box::new(items.into_iter().map(Ok)), kind: SeqKind::Array, infinite: false }
    }

    pub fn stream<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<Datum, DbError>> + Send + 'static,
    {
        Self { iter: Box::new(iter), kind: SeqKind::Stream, infinite: false }
    }

    #[must_use]
    pub fn infinite(mut self) -> Self {
        self.infinite = true;
        self
    }

    pub fn map_items<F>(self, mut f: F) -> Self
    where
        F: FnMut(Datum) -> Result<Datum, DbError> + Send + 'static,
    {
        let Self { iter, kind, infinite } = self;
        Self { iter: Box::new(iter.map(move |item| item.and_then(&mut f))), kind, infinite }
    }

    pub fn filter_items<F>(self, mut keep: F) -> Self
    where
        F: FnMut(&Datum) -> Result<bool, DbError> + Send + 'static,
    {
        let Self { iter, kind, infinite } = self;
        let iter = iter.filter_map(move |item| match item {
            Ok(d) => match keep(&d) {
                Ok(true) => Some(Ok(d)),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            },
            Err(e) => Some(Err(e)),
        });
        Self { iter: Box::new(iter), kind, infinite }
    }

    /// Like `map_items`, but `None` drops the row.
    pub fn filter_map_items<F>(self, mut f: F) -> Self
    where
        F: FnMut(Datum) -> Result<Option<Datum>, DbError> + Send + 'static,
    {
        let Self { iter, kind, infinite } = self;
        let iter = iter.filter_map(move |item| item.and_then(&mut f).transpose());
        Self { iter: Box::new(iter), kind, infinite }
    }

    pub fn flat_map_items<F>(self, mut f: F) -> Self
    where
        F: FnMut(Datum) -> Result<Vec<Datum>, DbError> + Send + 'static,
    {
        let Self { iter, kind, infinite } = self;
        let iter = iter.flat_map(move |item| match item.and_then(&mut f) {
            Ok(rows) => rows.into_iter().map(Ok).collect::<Vec<_>>(),
            Err(e) => vec![Err(e)],
        });
        Self { iter: Box::new(iter), kind, infinite }
    }

    #[must_use]
    pub fn skip_items(self, n: usize) -> Self {
        let Self { iter, kind, infinite } = self;
        Self { iter: Box::new(iter.skip(n)), kind, infinite }
    }

    #[must_use]
    pub fn take_items(self, n: usize) -> Self {
        let Self { iter, kind, .. } = self;
        Self { iter: Box::new(iter.take(n)), kind, infinite: false }
    }

    #[must_use]
    pub fn chain(self, other: Self) -> Self {
        let kind = if self.kind == SeqKind::Array && other.kind == SeqKind::Array {
            SeqKind::Array
        } else {
            SeqKind::Stream
        };
        let infinite = self.infinite || other.infinite;
        Self { iter: Box::new(self.iter.chain(other.iter)), kind, infinite }
    }

    /// Drains the sequence into memory, refusing infinite sequences and anything over `limit`.
    pub fn collect_bounded(self, limit: usize) -> Result<Vec<Datum>, DbError> {
        if self.infinite {
            return Err(DbError::ResourceExhausted(
                "Cannot materialize an infinite sequence".into(),
            ));
        }
        let mut out = Vec::new();
        for item in self.iter {
            if out.len() >= limit {
                return Err(DbError::ResourceExhausted(format!("Array over size limit `{limit}`.")));
            }
            out.push(item?);
        }
        Ok(out)
    }

    /// Re-wraps already collected rows keeping this sequence's kind.
    #[must_use]
    pub fn rebuilt(kind: SeqKind, rows: Vec<Datum>) -> Self {
        Self::array(rows).with_kind(kind)
    }

    #[must_use]
    pub const fn with_kind(mut self, kind: SeqKind) -> Self {
        self.kind = kind;
        self
    }

    pub(crate) fn replace_iter(self, f: impl FnOnce(DatumIter) -> DatumIter) -> Self {
        let kind = self.kind;
        let infinite = self.infinite;
        let iter = f(self.iter);
        Self { iter, kind, infinite }
    }
}

impl Iterator for Sequence {
    type Item = Result<Datum, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

/// Result of `group`: group key to per-group value, ordered by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedData(pub BTreeMap<Datum, Datum>);

impl GroupedData {
    /// `[{group, reduction}]` in key order.
    #[must_use]
    pub fn ungroup(self) -> Vec<Datum> {
        self.0
            .into_iter()
            .map(|(group, reduction)| object([("group", group), ("reduction", reduction)]))
            .collect()
    }
}

/// Intermediate evaluation result.
pub enum Value {
    Datum(Datum),
    Sequence(Sequence),
    Table(TableRef),
    Grouped(GroupedData),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Datum(d) => f.debug_tuple("Datum").field(d).finish(),
            Self::Sequence(s) => f.debug_tuple("Sequence").field(s).finish(),
            Self::Table(t) => f.debug_tuple("Table").field(&t.name()).finish(),
            Self::Grouped(g) => f.debug_tuple("Grouped").field(g).finish(),
        }
    }
}

impl Value {
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Datum(d) => d.type_name(),
            Self::Sequence(_) => "SEQUENCE",
            Self::Table(_) => "TABLE",
            Self::Grouped(_) => "GROUPED_DATA",
        }
    }

    /// Views the value as a row sequence. Arrays become array-kind sequences.
    pub fn into_sequence(self) -> Result<Sequence, DbError> {
        match self {
            Self::Sequence(s) => Ok(s),
            Self::Table(t) => Ok(Sequence::stream(t.scan().map(Ok))),
            Self::Datum(Datum::Array(items)) => Ok(Sequence::array(items)),
            other => Err(DbError::TypeMismatch(format!(
                "Cannot convert {} to SEQUENCE",
                other.type_name()
            ))),
        }
    }

    /// Materializes the value; sequences become arrays bounded by `limit`.
    pub fn into_datum(self, limit: usize) -> Result<Datum, DbError> {
        match self {
            Self::Datum(d) => Ok(d),
            Self::Grouped(g) => Ok(Datum::Array(g.ungroup())),
            other => Ok(Datum::Array(other.into_sequence()?.collect_bounded(limit)?)),
        }
    }

    #[must_use]
    pub const fn is_sequence(&self) -> bool {
        matches!(self, Self::Sequence(_) | Self::Table(_) | Self::Datum(Datum::Array(_)))
    }
}

impl From<Datum> for Value {
    fn from(d: Datum) -> Self {
        Self::Datum(d)
    }
}

impl From<Sequence> for Value {
    fn from(s: Sequence) -> Self {
        Self::Sequence(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn nums(v: &[i32]) -> Vec<Datum> {
        v.iter().map(|n| Datum::from(*n)).collect()
    }

    #[test]
    fn adapters_are_lazy_and_ordered() {
        let s = Sequence::array(nums(&[1, 2, 3, 4]))
            .filter_items(|d| Ok(d.as_f64().unwrap_or(0.0) > 1.0))
            .map_items(|d| Ok(Datum::from(d.as_f64().unwrap_or(0.0) * 10.0)));
        assert_eq!(s.collect_bounded(10).unwrap(), nums(&[20, 30, 40]));
    }

    #[test]
    fn collect_bounded_enforces_limit() {
        let err = Sequence::array(nums(&[1, 2, 3])).collect_bounded(2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        let inf = Sequence::stream(std::iter::repeat_with(|| Ok(Datum::Null))).infinite();
        assert_eq!(inf.collect_bounded(5).unwrap_err().kind(), ErrorKind::ResourceExhausted);
    }

    #[test]
    fn take_makes_infinite_finite() {
        let s = Sequence::stream((0..).map(|i: i32| Ok(Datum::from(i)))).infinite().take_items(3);
        assert!(!s.infinite);
        assert_eq!(s.collect_bounded(10).unwrap(), nums(&[0, 1, 2]));
    }

    #[test]
    fn ungroup_orders_by_key() {
        let mut g = GroupedData::default();
        g.0.insert(Datum::from("b"), Datum::from(2));
        g.0.insert(Datum::from("a"), Datum::from(1));
        let rows = g.ungroup();
        assert_eq!(rows[0].field("group"), Some(&Datum::from("a")));
        assert_eq!(rows[1].field("reduction"), Some(&Datum::from(2)));
    }
}
