//! Reductions and grouping.
use super::eval::{Function, Scope, Selector, arg, eval_datum};
use super::sequence::value_or_predicate;
use super::term::{Call, Op};
use super::value::{GroupedData, Sequence, Value};
use crate::datum::Datum;
use crate::datum::compare::compare_strict;
use crate::errors::DbError;
use crate::utils::num::usize_to_f64;
use std::cmp::Ordering;
use std::collections::BTreeMap;

fn empty(op: Op) -> DbError {
    DbError::EmptyReduction(format!("Cannot take the {} of an empty stream.", op.name()))
}

fn selector(c: &Call) -> Result<Option<Selector>, DbError> {
    c.args.get(1).map(Selector::from_term).transpose()
}

/// Rows paired with their selected value; rows the selector cannot read are skipped.
fn selected(
    seq: Sequence,
    sel: Option<&Selector>,
    scope: &Scope,
) -> impl Iterator<Item = Result<(Datum, Datum), DbError>> {
    seq.filter_map(move |item| {
        let row = match item {
            Ok(row) => row,
            Err(e) => return Some(Err(e)),
        };
        match sel {
            None => Some(Ok((row.clone(), row))),
            Some(s) => s.select_opt(scope, &row).transpose().map(|v| v.map(|v| (v, row))),
        }
    })
}

fn number(d: &Datum, op: Op) -> Result<f64, DbError> {
    d.as_f64().ok_or_else(|| {
        DbError::TypeMismatch(format!(
            "Expected type NUMBER but found {} in {}.",
            d.type_name(),
            op.name()
        ))
    })
}

pub(super) fn apply(c: &Call, recv: Value, scope: &Scope) -> Result<Value, DbError> {
    let seq = recv.into_sequence()?;
    if c.op == Op::Group && !seq.infinite {
        return group(c, seq, scope).map(Value::Grouped);
    }
    if seq.infinite {
        return Err(DbError::ResourceExhausted(format!(
            "Cannot use `{}` on an infinite sequence",
            c.op.name()
        )));
    }
    let out = match c.op {
        Op::Reduce => {
            let f = Function::from_term(arg(c, 1)?)?;
            let mut acc = c.args.get(2).map(|t| eval_datum(t, scope)).transpose()?;
            for row in seq {
                let row = row?;
                acc = Some(match acc {
                    None => row,
                    Some(a) => f.call(scope, vec![a, row])?,
                });
            }
            acc.ok_or_else(|| DbError::EmptyReduction("Cannot reduce over an empty stream.".into()))?
        }
        Op::Count => {
            let mut n = 0_usize;
            match c.args.get(1) {
                None => {
                    for row in seq {
                        row?;
                        n += 1;
                    }
                }
                Some(t) => {
                    let matches = value_or_predicate(t, scope)?;
                    for row in seq {
                        if matches(scope, &row?)? {
                            n += 1;
                        }
                    }
                }
            }
            Datum::from(n)
        }
        Op::Sum | Op::Avg => {
            let sel = selector(c)?;
            let (mut total, mut n) = (0.0, 0_usize);
            for item in selected(seq, sel.as_ref(), scope) {
                let (value, _) = item?;
                total += number(&value, c.op)?;
                n += 1;
            }
            if c.op == Op::Sum {
                Datum::Number(total)
            } else if n == 0 {
                return Err(empty(c.op));
            } else {
                Datum::Number(total / usize_to_f64(n))
            }
        }
        Op::Min | Op::Max => {
            let sel = selector(c)?;
            let want = if c.op == Op::Min { Ordering::Less } else { Ordering::Greater };
            let mut best: Option<(Datum, Datum)> = None;
            for item in selected(seq, sel.as_ref(), scope) {
                let (value, row) = item?;
                let better = match &best {
                    None => true,
                    Some((b, _)) => compare_strict(&value, b)? == want,
                };
                if better {
                    best = Some((value, row));
                }
            }
            best.map(|(_, row)| row).ok_or_else(|| empty(c.op))?
        }
        other => {
            return Err(DbError::QueryError(format!("`{}` is not an aggregation", other.name())));
        }
    };
    Ok(out.into())
}

/// Buckets rows by selector value. Rows a field selector cannot read land in the `null` group;
/// several selectors produce array keys.
fn group(c: &Call, seq: Sequence, scope: &Scope) -> Result<GroupedData, DbError> {
    let selectors = c.rest().iter().map(Selector::from_term).collect::<Result<Vec<_>, _>>()?;
    if selectors.is_empty() {
        return Err(DbError::QueryError("`group` expects at least one selector".into()));
    }
    let limit = scope.array_limit();
    let mut buckets: BTreeMap<Datum, Vec<Datum>> = BTreeMap::new();
    let mut seen = 0_usize;
    for row in seq {
        let row = row?;
        seen += 1;
        if seen > limit {
            return Err(DbError::ResourceExhausted(format!("Array over size limit `{limit}`.")));
        }
        let mut key = selectors
            .iter()
            .map(|s| s.select_opt(scope, &row).map(Option::unwrap_or_default))
            .collect::<Result<Vec<_>, _>>()?;
        let key = if key.len() == 1 { key.remove(0) } else { Datum::Array(key) };
        buckets.entry(key).or_default().push(row);
    }
    Ok(GroupedData(buckets.into_iter().map(|(k, rows)| (k, Datum::Array(rows))).collect()))
}
