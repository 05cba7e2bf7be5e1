//! JSON wire form of query terms.
//!
//! A call is `[op, [args...], {opts...}]` (trailing empty parts may be omitted). A row field is
//! `["field", [name]]`. Any other JSON value is a literal; since arrays denote calls, literal
//! arrays are written as `["make_array", [...]]`.
use super::term::{Call, Op, Term};
use crate::datum::Datum;
use crate::errors::DbError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

const FIELD: &str = "field";

/// Encodes `term` in wire form.
#[must_use]
pub fn to_wire(term: &Term) -> Value {
    match term {
        Term::Literal(Datum::Array(items)) => {
            let args = items.iter().map(|d| to_wire(&Term::Literal(d.clone()))).collect();
            Value::Array(vec![Value::String(Op::MakeArray.name()), Value::Array(args)])
        }
        Term::Literal(d) => Value::from(d.clone()),
        Term::Field(name) => Value::Array(vec![
            Value::String(FIELD.into()),
            Value::Array(vec![Value::String(name.clone())]),
        ]),
        Term::Call(c) => {
            let mut out = vec![
                Value::String(c.op.name()),
                Value::Array(c.args.iter().map(|a| to_wire(a)).collect()),
            ];
            if !c.opts.is_empty() {
                let opts: Map<String, Value> =
                    c.opts.iter().map(|(k, v)| (k.clone(), to_wire(v))).collect();
                out.push(Value::Object(opts));
            }
            Value::Array(out)
        }
    }
}

/// Decodes a wire-form value.
pub fn from_wire(value: Value) -> Result<Term, DbError> {
    let Value::Array(parts) = value else {
        return Ok(Term::Literal(Datum::from(value)));
    };
    if parts.is_empty() || parts.len() > 3 {
        return Err(DbError::QueryError(format!(
            "Expected a term `[op, [args], {{opts}}]` but found {} element(s)",
            parts.len()
        )));
    }
    let mut parts = parts.into_iter();
    let name = match parts.next() {
        Some(Value::String(s)) => s,
        other => {
            return Err(DbError::QueryError(format!(
                "Expected an operator name but found `{}`",
                other.unwrap_or_default()
            )));
        }
    };
    let args = match parts.next() {
        None => Vec::new(),
        Some(Value::Array(args)) => args,
        Some(other) => {
            return Err(DbError::QueryError(format!("Arguments of `{name}` must be an array, found `{other}`")));
        }
    };
    let opts = match parts.next() {
        None => Map::new(),
        Some(Value::Object(opts)) => opts,
        Some(other) => {
            return Err(DbError::QueryError(format!("Options of `{name}` must be an object, found `{other}`")));
        }
    };
    if name == FIELD {
        return match args.as_slice() {
            [Value::String(field)] if opts.is_empty() => Ok(Term::Field(field.clone())),
            _ => Err(DbError::QueryError("`field` expects exactly one string argument".into())),
        };
    }
    let op: Op = serde_json::from_value(Value::String(name.clone()))
        .map_err(|_| DbError::QueryError(format!("Unknown operator `{name}`")))?;
    let args = args.into_iter().map(|a| from_wire(a).map(Arc::new)).collect::<Result<Vec<_>, _>>()?;
    let opts = opts
        .into_iter()
        .map(|(k, v)| from_wire(v).map(|t| (k, Arc::new(t))))
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(Term::Call(Call { op, args, opts }))
}

/// # Errors
/// Returns an error if `json` is not valid JSON or not a well-formed term.
pub fn parse_query_json(json: &str) -> Result<Term, DbError> {
    let value: Value = serde_json::from_str(json)?;
    from_wire(value)
}

#[must_use]
pub fn to_query_json(term: &Term) -> String {
    to_wire(term).to_string()
}
