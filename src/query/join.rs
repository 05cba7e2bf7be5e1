//! Joins and `zip`.
//!
//! Output rows are `{left, right}` objects. The left side streams; the right side of a nested
//! loop join is materialized once per query.
use super::eval::{Function, Scope, Selector, arg, eval, opt_string};
use super::term::{Call, Op};
use super::value::Value;
use crate::datum::{Datum, object};
use crate::errors::DbError;
use std::sync::Arc;

fn pair(left: Datum, right: Datum) -> Datum {
    object([("left", left), ("right", right)])
}

pub(super) fn apply(c: &Call, recv: Value, scope: &Scope) -> Result<Value, DbError> {
    let limit = scope.array_limit();
    match c.op {
        Op::InnerJoin | Op::OuterJoin => {
            let right: Arc<Vec<Datum>> =
                Arc::new(eval(arg(c, 1)?, scope)?.into_sequence()?.collect_bounded(limit)?);
            let matches = Function::from_term(arg(c, 2)?)?;
            let outer = c.op == Op::OuterJoin;
            let scope = scope.clone();
            let seq = recv.into_sequence()?.flat_map_items(move |l| {
                let mut out = Vec::new();
                for r in right.iter() {
                    if matches.call(&scope, vec![l.clone(), r.clone()])?.is_truthy() {
                        out.push(pair(l.clone(), r.clone()));
                    }
                }
                if outer && out.is_empty() {
                    out.push(pair(l, Datum::Null));
                }
                Ok(out)
            });
            Ok(seq.into())
        }
        Op::EqJoin => eq_join(c, recv, scope),
        Op::Zip => {
            let seq = recv.into_sequence()?.map_items(zip_row);
            Ok(seq.into())
        }
        other => Err(DbError::QueryError(format!("`{}` is not a join operator", other.name()))),
    }
}

fn eq_join(c: &Call, recv: Value, scope: &Scope) -> Result<Value, DbError> {
    let attr = Selector::from_term(arg(c, 1)?)?;
    let index = opt_string(c, "index", scope)?;
    let lookup: Box<dyn Fn(&Datum) -> Result<Vec<Datum>, DbError> + Send> =
        match eval(arg(c, 2)?, scope)? {
            Value::Table(table) => {
                let index = index.unwrap_or_else(|| table.primary_key().to_owned());
                Box::new(move |key| table.index_lookup(&index, key))
            }
            other => {
                let field = index.unwrap_or_else(|| "id".to_owned());
                let rows = other.into_sequence()?.collect_bounded(scope.array_limit())?;
                Box::new(move |key| {
                    Ok(rows.iter().filter(|r| r.field(&field) == Some(key)).cloned().collect())
                })
            }
        };
    let scope = scope.clone();
    let seq = recv.into_sequence()?.flat_map_items(move |l| {
        let Some(key) = attr.select_opt(&scope, &l)? else {
            return Ok(Vec::new());
        };
        Ok(lookup(&key)?.into_iter().map(|r| pair(l.clone(), r)).collect())
    });
    Ok(seq.into())
}

/// Shallow merge of `right` over `left`; a missing or null right side yields `left`.
fn zip_row(row: Datum) -> Result<Datum, DbError> {
    let left = row.get_field("left")?.clone();
    match row.field("right") {
        None | Some(Datum::Null) => Ok(left),
        Some(right) => {
            let mut merged = left.into_object()?;
            merged.extend(right.expect_object()?.clone());
            Ok(Datum::Object(merged))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zip_prefers_right_fields() {
        let row = Datum::from(json!({"left": {"id": 1, "a": 1}, "right": {"id": 9, "b": 2}}));
        assert_eq!(zip_row(row).unwrap(), Datum::from(json!({"id": 9, "a": 1, "b": 2})));
    }

    #[test]
    fn zip_without_right_side_keeps_left() {
        let row = Datum::from(json!({"left": {"id": 1}, "right": null}));
        assert_eq!(zip_row(row).unwrap(), Datum::from(json!({"id": 1})));
    }
}
