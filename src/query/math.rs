//! Comparison, negation and arithmetic.
use super::eval::{Scope, eval_datum};
use super::term::{Call, Op};
use super::value::Value;
use crate::datum::compare::compare_strict;
use crate::datum::{Datum, time};
use crate::errors::DbError;
use chrono::{DateTime, FixedOffset};
use std::cmp::Ordering;

pub(super) fn apply(c: &Call, recv: Value, scope: &Scope) -> Result<Value, DbError> {
    let first = recv.into_datum(scope.array_limit())?;
    if c.op == Op::Not {
        return Ok(Datum::Bool(!first.is_truthy()).into());
    }
    let rest = c.rest().iter().map(|t| eval_datum(t, scope)).collect::<Result<Vec<_>, _>>()?;
    if rest.is_empty() {
        return Err(DbError::QueryError(format!("`{}` expects at least 2 arguments", c.op.name())));
    }
    let out = match c.op {
        Op::Eq => Datum::Bool(rest.iter().all(|d| *d == first)),
        Op::Ne => Datum::Bool(!rest.iter().all(|d| *d == first)),
        Op::Gt => chain_compare(first, &rest, Ordering::is_gt)?,
        Op::Ge => chain_compare(first, &rest, Ordering::is_ge)?,
        Op::Lt => chain_compare(first, &rest, Ordering::is_lt)?,
        Op::Le => chain_compare(first, &rest, Ordering::is_le)?,
        op => {
            let mut acc = first;
            for rhs in rest {
                acc = arith(op, acc, rhs)?;
            }
            acc
        }
    };
    Ok(out.into())
}

fn chain_compare(
    first: Datum,
    rest: &[Datum],
    holds: fn(Ordering) -> bool,
) -> Result<Datum, DbError> {
    let mut prev = &first;
    for next in rest {
        if !holds(compare_strict(prev, next)?) {
            return Ok(Datum::Bool(false));
        }
        prev = next;
    }
    Ok(Datum::Bool(true))
}

fn shift(t: &DateTime<FixedOffset>, seconds: f64) -> Result<Datum, DbError> {
    time::from_epoch(time::to_epoch(t) + seconds, *t.offset()).map(Datum::Time)
}

/// Binary arithmetic on two datums.
pub fn arith(op: Op, lhs: Datum, rhs: Datum) -> Result<Datum, DbError> {
    match (op, lhs, rhs) {
        (Op::Add, Datum::Number(a), Datum::Number(b)) => Ok(Datum::Number(a + b)),
        (Op::Add, Datum::String(a), Datum::String(b)) => Ok(Datum::String(a + &b)),
        (Op::Add, Datum::Array(mut a), Datum::Array(b)) => {
            a.extend(b);
            Ok(Datum::Array(a))
        }
        (Op::Add, Datum::Time(t), Datum::Number(s)) | (Op::Add, Datum::Number(s), Datum::Time(t)) => {
            shift(&t, s)
        }
        (Op::Sub, Datum::Number(a), Datum::Number(b)) => Ok(Datum::Number(a - b)),
        (Op::Sub, Datum::Time(t), Datum::Number(s)) => shift(&t, -s),
        (Op::Sub, Datum::Time(a), Datum::Time(b)) => {
            Ok(Datum::Number(time::to_epoch(&a) - time::to_epoch(&b)))
        }
        (Op::Mul, Datum::Number(a), Datum::Number(b)) => Ok(Datum::Number(a * b)),
        (Op::Div, Datum::Number(_), Datum::Number(b)) if b == 0.0 => {
            Err(DbError::InvalidArgument("Cannot divide by zero.".into()))
        }
        (Op::Div, Datum::Number(a), Datum::Number(b)) => Ok(Datum::Number(a / b)),
        (Op::Mod, Datum::Number(a), Datum::Number(b)) => modulo(a, b),
        (op, a, b) => Err(DbError::TypeMismatch(format!(
            "Cannot perform {} on {} and {}",
            op.name(),
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn modulo(a: f64, b: f64) -> Result<Datum, DbError> {
    for n in [a, b] {
        if n.fract() != 0.0 {
            return Err(DbError::InvalidArgument(format!("Number not an integer: {n}")));
        }
    }
    if b == 0.0 {
        return Err(DbError::InvalidArgument("Cannot take a number modulo 0.".into()));
    }
    Ok(Datum::Number(a % b))
}
