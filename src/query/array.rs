//! Array operators: positional edits and set algebra.
//!
//! Positional operators keep duplicates. Set operators return de-duplicated arrays in
//! first-occurrence order; duplicates in their inputs are ignored.
use super::eval::{Scope, arg_datum};
use super::term::{Call, Op};
use super::value::Value;
use crate::datum::Datum;
use crate::errors::DbError;
use crate::utils::num::resolve_index;
use std::collections::BTreeSet;

pub(super) fn apply(c: &Call, recv: Value, scope: &Scope) -> Result<Value, DbError> {
    let mut items = recv.into_datum(scope.array_limit())?.into_array()?;
    let out = match c.op {
        Op::Append => {
            items.push(arg_datum(c, 1, scope)?);
            items
        }
        Op::Prepend => {
            items.insert(0, arg_datum(c, 1, scope)?);
            items
        }
        Op::Difference => {
            let remove = arg_datum(c, 1, scope)?.into_array()?;
            items.retain(|x| !remove.contains(x));
            items
        }
        Op::SetInsert => set_union(items, vec![arg_datum(c, 1, scope)?]),
        Op::SetUnion => set_union(items, arg_datum(c, 1, scope)?.into_array()?),
        Op::SetIntersection => {
            let other: BTreeSet<Datum> = arg_datum(c, 1, scope)?.into_array()?.into_iter().collect();
            dedupe(items.into_iter().filter(|x| other.contains(x)))
        }
        Op::SetDifference => {
            let other: BTreeSet<Datum> = arg_datum(c, 1, scope)?.into_array()?.into_iter().collect();
            dedupe(items.into_iter().filter(|x| !other.contains(x)))
        }
        Op::InsertAt => {
            let at = insert_position(&arg_datum(c, 1, scope)?, items.len())?;
            items.insert(at, arg_datum(c, 2, scope)?);
            items
        }
        Op::SpliceAt => {
            let at = insert_position(&arg_datum(c, 1, scope)?, items.len())?;
            let values = arg_datum(c, 2, scope)?.into_array()?;
            items.splice(at..at, values);
            items
        }
        Op::DeleteAt => {
            let start = element_position(&arg_datum(c, 1, scope)?, items.len())?;
            let end = match c.args.get(2) {
                None => start + 1,
                Some(_) => {
                    let end = arg_datum(c, 2, scope)?;
                    let i = end.expect_index()?;
                    resolve_index(i, items.len())
                        .filter(|e| *e >= start && *e <= items.len())
                        .ok_or_else(|| out_of_range(i, items.len()))?
                }
            };
            items.drain(start..end);
            items
        }
        Op::ChangeAt => {
            let at = element_position(&arg_datum(c, 1, scope)?, items.len())?;
            items[at] = arg_datum(c, 2, scope)?;
            items
        }
        other => {
            return Err(DbError::QueryError(format!("`{}` is not an array operator", other.name())));
        }
    };
    Ok(Datum::Array(out).into())
}

fn out_of_range(i: i64, len: usize) -> DbError {
    DbError::IndexOutOfRange(format!("Index `{i}` out of bounds for array of size {len}."))
}

/// Position of an existing element; negative counts from the end.
fn element_position(index: &Datum, len: usize) -> Result<usize, DbError> {
    let i = index.expect_index()?;
    resolve_index(i, len).filter(|p| *p < len).ok_or_else(|| out_of_range(i, len))
}

/// Position between elements; `-1` appends.
fn insert_position(index: &Datum, len: usize) -> Result<usize, DbError> {
    let i = index.expect_index()?;
    resolve_index(i, len + 1).filter(|p| *p <= len).ok_or_else(|| out_of_range(i, len))
}

fn dedupe(items: impl Iterator<Item = Datum>) -> Vec<Datum> {
    let mut seen = BTreeSet::new();
    items.filter(|x| seen.insert(x.clone())).collect()
}

fn set_union(a: Vec<Datum>, b: Vec<Datum>) -> Vec<Datum> {
    dedupe(a.into_iter().chain(b))
}
