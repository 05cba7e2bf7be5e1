//! Sequence operators.
//!
//! Row-at-a-time operators stay lazy. `order_by`, `sample` and negative indices have to see the
//! whole input and materialize it within the query's array limit.
use super::builder::Bound;
use super::eval::{
    Function, Scope, Selector, arg, arg_datum, eval_datum, eval_sequence, is_func, opt_bound,
    opt_datum, opt_string,
};
use super::term::{Call, Op, Term};
use super::value::{SeqKind, Sequence, Value};
use crate::datum::Datum;
use crate::datum::compare::compare_strict;
use crate::errors::DbError;
use crate::storage::TableRef;
use crate::utils::num::resolve_index;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::ops::Bound as RangeBound;
use std::sync::Arc;

/// `r.range()`, `r.range(end)` and `r.range(start, end)`.
pub(super) fn range(c: &Call, scope: &Scope) -> Result<Value, DbError> {
    let bounds = c
        .args
        .iter()
        .map(|a| eval_datum(a, scope)?.expect_index())
        .collect::<Result<Vec<_>, _>>()?;
    let seq = match bounds.as_slice() {
        [] => Sequence::stream((0_i64..).map(|i| Ok(Datum::from(i)))).infinite(),
        [end] => Sequence::stream((0..*end).map(|i| Ok(Datum::from(i)))),
        [start, end] => Sequence::stream((*start..*end).map(|i| Ok(Datum::from(i)))),
        _ => {
            return Err(DbError::QueryError(format!(
                "`range` expects at most 2 arguments but found {}",
                bounds.len()
            )));
        }
    };
    Ok(seq.into())
}

fn expect_table(recv: Value, op: Op) -> Result<TableRef, DbError> {
    match recv {
        Value::Table(t) => Ok(t),
        other => Err(DbError::TypeMismatch(format!(
            "`{}` expected type TABLE but found {}",
            op.name(),
            other.type_name()
        ))),
    }
}

/// `get`, `get_all` and `between` on a table.
pub(super) fn table_access(c: &Call, recv: Value, scope: &Scope) -> Result<Value, DbError> {
    let table = expect_table(recv, c.op)?;
    let index = opt_string(c, "index", scope)?.unwrap_or_else(|| table.primary_key().to_owned());
    match c.op {
        Op::Get => {
            let key = arg_datum(c, 1, scope)?;
            Ok(table.get(&key).unwrap_or_default().into())
        }
        Op::GetAll => {
            let mut rows = Vec::new();
            for i in 1..c.args.len() {
                rows.extend(table.index_lookup(&index, &arg_datum(c, i, scope)?)?);
            }
            Ok(Sequence::array(rows).with_kind(SeqKind::Stream).into())
        }
        Op::Between => {
            let lower = arg_datum(c, 1, scope)?;
            let upper = arg_datum(c, 2, scope)?;
            let left = opt_bound(c, "left_bound", scope, Bound::Closed)?;
            let right = opt_bound(c, "right_bound", scope, Bound::Open)?;
            let lo = range_bound(&lower, left);
            let hi = range_bound(&upper, right);
            let rows = table.index_range(&index, lo, hi)?;
            Ok(Sequence::array(rows).with_kind(SeqKind::Stream).into())
        }
        other => Err(DbError::QueryError(format!("`{}` is not a table operator", other.name()))),
    }
}

fn range_bound(d: &Datum, bound: Bound) -> RangeBound<&Datum> {
    match (d, bound) {
        (Datum::Null, _) => RangeBound::Unbounded,
        (d, Bound::Closed) => RangeBound::Included(d),
        (d, Bound::Open) => RangeBound::Excluded(d),
    }
}

/// True when every field of `pattern` equals the row's field, nested objects compared the same way.
#[must_use]
pub fn partial_match(row: &Datum, pattern: &Datum) -> bool {
    match (row, pattern) {
        (Datum::Object(r), Datum::Object(p)) => p.iter().all(|(k, want)| {
            r.get(k).is_some_and(|have| match (have, want) {
                (Datum::Object(_), Datum::Object(_)) => partial_match(have, want),
                _ => have == want,
            })
        }),
        _ => row == pattern,
    }
}

/// An object literal (or `r::object`) matches rows field by field; anything else is judged by
/// truthiness.
fn is_pattern(term: &Term) -> bool {
    matches!(term, Term::Literal(Datum::Object(_))) || term.op() == Some(Op::MakeObject)
}

/// Row predicate for `filter`, `count` and friends.
#[derive(Debug, Clone)]
pub(crate) struct Predicate {
    func: Function,
    pattern: bool,
    on_missing: bool,
}

impl Predicate {
    pub(crate) fn from_term(term: &Arc<Term>) -> Result<Self, DbError> {
        Ok(Self { func: Function::from_term(term)?, pattern: is_pattern(term), on_missing: false })
    }

    #[must_use]
    pub(crate) const fn on_missing(mut self, keep: bool) -> Self {
        self.on_missing = keep;
        self
    }

    pub(crate) fn test(&self, scope: &Scope, row: &Datum) -> Result<bool, DbError> {
        match self.func.call(scope, vec![row.clone()]) {
            Ok(d) if self.pattern => Ok(partial_match(row, &d)),
            Ok(d) => Ok(d.is_truthy()),
            Err(e) if e.is_non_existence() => Ok(self.on_missing),
            Err(e) => Err(e),
        }
    }
}

pub(super) type Matcher = Box<dyn Fn(&Scope, &Datum) -> Result<bool, DbError> + Send>;

/// Matches either a literal value or a predicate function.
pub(super) fn value_or_predicate(term: &Arc<Term>, scope: &Scope) -> Result<Matcher, DbError> {
    if is_func(term) {
        let pred = Predicate::from_term(term)?;
        return Ok(Box::new(move |scope, row| pred.test(scope, row)));
    }
    let want = eval_datum(term, scope)?;
    Ok(Box::new(move |_, row| Ok(*row == want)))
}

pub(super) fn apply(c: &Call, recv: Value, scope: &Scope) -> Result<Value, DbError> {
    let limit = scope.array_limit();
    match c.op {
        Op::Filter => {
            let keep_missing = opt_datum(c, "default", scope)?.is_some_and(|d| d.is_truthy());
            let pred = Predicate::from_term(arg(c, 1)?)?.on_missing(keep_missing);
            let scope = scope.clone();
            Ok(recv.into_sequence()?.filter_items(move |row| pred.test(&scope, row)).into())
        }
        Op::Map => {
            let f = Function::from_term(arg(c, 1)?)?;
            let scope = scope.clone();
            Ok(recv.into_sequence()?.map_items(move |row| f.call(&scope, vec![row])).into())
        }
        Op::ConcatMap => {
            let f = Function::from_term(arg(c, 1)?)?;
            let scope = scope.clone();
            let seq = recv.into_sequence()?.flat_map_items(move |row| {
                f.call_value(&scope, vec![row])?.into_sequence()?.collect_bounded(limit)
            });
            Ok(seq.into())
        }
        Op::OrderBy => order_by(c, recv.into_sequence()?, scope),
        Op::Skip => {
            let n = arg_datum(c, 1, scope)?.expect_count()?;
            Ok(recv.into_sequence()?.skip_items(n).into())
        }
        Op::Limit => {
            let n = arg_datum(c, 1, scope)?.expect_count()?;
            Ok(recv.into_sequence()?.take_items(n).into())
        }
        Op::Slice => slice(c, recv.into_sequence()?, scope),
        Op::Nth => nth(&arg_datum(c, 1, scope)?, recv.into_sequence()?, limit).map(Value::Datum),
        Op::IndexesOf => {
            let matches = value_or_predicate(arg(c, 1)?, scope)?;
            let scope = scope.clone();
            let mut position = 0_usize;
            let seq = recv.into_sequence()?.filter_map_items(move |row| {
                let at = position;
                position += 1;
                Ok(matches(&scope, &row)?.then(|| Datum::from(at)))
            });
            Ok(seq.into())
        }
        Op::IsEmpty => {
            let mut seq = recv.into_sequence()?;
            Ok(Datum::Bool(seq.next().transpose()?.is_none()).into())
        }
        Op::Union => {
            let mut seq = recv.into_sequence()?;
            for t in c.rest() {
                seq = seq.chain(eval_sequence(t, scope)?);
            }
            Ok(seq.into())
        }
        Op::Sample => {
            let n = arg_datum(c, 1, scope)?.expect_count()?;
            let seq = recv.into_sequence()?;
            let kind = seq.kind;
            let rows = seq.collect_bounded(limit)?;
            Ok(Sequence::rebuilt(kind, sample(rows, n)).into())
        }
        Op::Distinct => {
            let mut seen = BTreeSet::new();
            let seq = recv.into_sequence()?.filter_items(move |row| Ok(seen.insert(row.clone())));
            Ok(seq.into())
        }
        Op::Contains => {
            let wanted = c
                .rest()
                .iter()
                .map(|t| value_or_predicate(t, scope))
                .collect::<Result<Vec<_>, _>>()?;
            let rows = recv.into_sequence()?.collect_bounded(limit)?;
            for w in &wanted {
                let mut found = false;
                for row in &rows {
                    if w(scope, row)? {
                        found = true;
                        break;
                    }
                }
                if !found {
                    return Ok(Datum::Bool(false).into());
                }
            }
            Ok(Datum::Bool(true).into())
        }
        other => Err(DbError::QueryError(format!("`{}` is not a sequence operator", other.name()))),
    }
}

struct SortKey {
    selector: Selector,
    descending: bool,
}

fn sort_keys(c: &Call) -> Result<Vec<SortKey>, DbError> {
    c.rest()
        .iter()
        .map(|t| match t.as_ref() {
            Term::Call(inner) if matches!(inner.op, Op::Asc | Op::Desc) => Ok(SortKey {
                selector: Selector::from_term(arg(inner, 0)?)?,
                descending: inner.op == Op::Desc,
            }),
            _ => Ok(SortKey { selector: Selector::from_term(t)?, descending: false }),
        })
        .collect()
}

/// Missing keys sort before present ones; present keys must be comparable.
fn compare_keys(
    a: &[Option<Datum>],
    b: &[Option<Datum>],
    keys: &[SortKey],
) -> Result<Ordering, DbError> {
    for ((x, y), key) in a.iter().zip(b).zip(keys) {
        let ord = match (x, y) {
            (Some(x), Some(y)) => compare_strict(x, y)?,
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return Ok(if key.descending { ord.reverse() } else { ord });
        }
    }
    Ok(Ordering::Equal)
}

fn order_by(c: &Call, seq: Sequence, scope: &Scope) -> Result<Value, DbError> {
    let keys = sort_keys(c)?;
    if keys.is_empty() {
        return Err(DbError::QueryError("`order_by` expects at least one key".into()));
    }
    let kind = seq.kind;
    let rows = seq.collect_bounded(scope.array_limit())?;
    let mut decorated = Vec::with_capacity(rows.len());
    for row in rows {
        let k = keys.iter().map(|k| k.selector.select_opt(scope, &row));
        decorated.push((k.collect::<Result<Vec<_>, _>>()?, row));
    }
    let mut failure = None;
    decorated.sort_by(|(a, _), (b, _)| {
        compare_keys(a, b, &keys).unwrap_or_else(|e| {
            failure.get_or_insert(e);
            Ordering::Equal
        })
    });
    if let Some(e) = failure {
        return Err(e);
    }
    Ok(Sequence::rebuilt(kind, decorated.into_iter().map(|(_, row)| row).collect()).into())
}

fn slice(c: &Call, seq: Sequence, scope: &Scope) -> Result<Value, DbError> {
    let start = arg_datum(c, 1, scope)?.expect_index()?;
    let end = c.args.get(2).map(|_| arg_datum(c, 2, scope)).transpose()?;
    let end = end.map(|d| d.expect_index()).transpose()?;
    let left = opt_bound(c, "left_bound", scope, Bound::Closed)?;
    let right = opt_bound(c, "right_bound", scope, Bound::Open)?;
    let shift_start = i64::from(left == Bound::Open);
    let shift_end = i64::from(right == Bound::Closed);

    if start >= 0 && end.is_none_or(|e| e >= 0) {
        let from = usize::try_from(start.saturating_add(shift_start)).unwrap_or(usize::MAX);
        let seq = seq.skip_items(from);
        return Ok(match end {
            Some(e) => {
                let to = usize::try_from(e.saturating_add(shift_end)).unwrap_or(usize::MAX);
                seq.take_items(to.saturating_sub(from))
            }
            None => seq,
        }
        .into());
    }

    let kind = seq.kind;
    let rows = seq.collect_bounded(scope.array_limit())?;
    let len = rows.len();
    let from = resolve_index(start, len).unwrap_or(0).saturating_add(usize::from(left == Bound::Open));
    let to = match end {
        Some(e) => resolve_index(e, len).unwrap_or(0).saturating_add(usize::from(right == Bound::Closed)),
        None => len,
    };
    let to = to.min(len);
    let picked = if from < to { rows[from..to].to_vec() } else { Vec::new() };
    Ok(Sequence::rebuilt(kind, picked).into())
}

fn nth(index: &Datum, mut seq: Sequence, limit: usize) -> Result<Datum, DbError> {
    let i = index.expect_index()?;
    let out_of_range = || DbError::IndexOutOfRange(format!("Index out of bounds: {i}"));
    if i >= 0 {
        let n = usize::try_from(i).map_err(|_| out_of_range())?;
        return seq.nth(n).transpose()?.ok_or_else(out_of_range);
    }
    let rows = seq.collect_bounded(limit)?;
    let at = resolve_index(i, rows.len()).ok_or_else(out_of_range)?;
    rows.into_iter().nth(at).ok_or_else(out_of_range)
}

/// Uniform sample of `n` rows keeping their input order.
fn sample(rows: Vec<Datum>, n: usize) -> Vec<Datum> {
    if n >= rows.len() {
        return rows;
    }
    let mut rng = rand::rng();
    let mut picked = rand::seq::index::sample(&mut rng, rows.len(), n).into_vec();
    picked.sort_unstable();
    let mut rows: Vec<Option<Datum>> = rows.into_iter().map(Some).collect();
    picked.into_iter().filter_map(|i| rows[i].take()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::builder::{Expr, r};
    use crate::query::eval::{QueryContext, eval};
    use serde_json::json;

    fn run(e: &Expr) -> Result<Datum, DbError> {
        let scope = Scope::new(Arc::new(QueryContext::default()));
        eval(e.term(), &scope)?.into_datum(scope.array_limit())
    }

    #[test]
    fn object_valued_field_filters_by_truthiness() {
        let rows = r::expr(json!([{"id": 1, "sub": {"x": 1}}, {"id": 2, "sub": null}]));
        let out = run(&rows.filter(r::field("sub")).map(|row| row.field("id"))).unwrap();
        assert_eq!(out, Datum::from(json!([1])));
    }

    #[test]
    fn object_literals_still_match_partially() {
        let rows = r::expr(json!([{"id": 1, "a": 2}, {"id": 2, "a": 3}]));
        let out = run(&rows.filter(r::object([("a", 3)])).map(|row| row.field("id"))).unwrap();
        assert_eq!(out, Datum::from(json!([2])));
        let out = run(&rows.filter(json!({"a": 2})).count()).unwrap();
        assert_eq!(out, Datum::from(1));
    }

    #[test]
    fn slice_with_huge_end_saturates() {
        let out = run(&r::expr(vec![1, 2, 3]).slice(0, 1e19).opt("right_bound", "closed")).unwrap();
        assert_eq!(out, Datum::from(json!([1, 2, 3])));
        let out = run(&r::expr(vec![1, 2, 3]).slice(-2, 1e19).opt("right_bound", "closed")).unwrap();
        assert_eq!(out, Datum::from(json!([2, 3])));
    }

    #[test]
    fn partial_match_recurses_into_objects() {
        let row = Datum::from(json!({"a": 1, "b": {"c": 2, "d": 3}}));
        assert!(partial_match(&row, &Datum::from(json!({"b": {"c": 2}}))));
        assert!(!partial_match(&row, &Datum::from(json!({"b": {"c": 3}}))));
        assert!(!partial_match(&row, &Datum::from(json!({"z": null}))));
    }

    #[test]
    fn missing_keys_sort_first() {
        let keys = vec![SortKey { selector: Selector::Field("a".into()), descending: false }];
        let ord = compare_keys(&[None], &[Some(Datum::from(1))], &keys).unwrap();
        assert_eq!(ord, Ordering::Less);
        assert!(compare_keys(&[Some(1.into())], &[Some("x".into())], &keys).is_err());
    }

    #[test]
    fn sample_keeps_order_and_size() {
        let rows: Vec<Datum> = (0..20).map(Datum::from).collect();
        let picked = sample(rows, 5);
        assert_eq!(picked.len(), 5);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn nth_negative_counts_from_end() {
        let seq = Sequence::array((0..4).map(Datum::from).collect());
        assert_eq!(nth(&Datum::from(-1), seq, 10).unwrap(), Datum::from(3));
        let seq = Sequence::array(vec![]);
        assert!(nth(&Datum::from(0), seq, 10).unwrap_err().is_non_existence());
    }
}
