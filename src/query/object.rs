//! Object and field operators. Applied to a sequence they work row by row.
use super::eval::{Function, Scope, arg_datum};
use super::term::{Call, Op};
use super::value::Value;
use crate::datum::{Datum, Object};
use crate::errors::DbError;

pub(super) fn apply(c: &Call, recv: Value, scope: &Scope) -> Result<Value, DbError> {
    match c.op {
        Op::GetField => get_field(c, recv, scope),
        Op::Keys => {
            let obj = recv.into_datum(scope.array_limit())?.into_object()?;
            Ok(Datum::Array(obj.into_keys().map(Datum::String).collect()).into())
        }
        Op::HasFields => {
            let names = field_names(c, scope)?;
            if recv.is_sequence() {
                let seq = recv.into_sequence()?;
                return Ok(seq.filter_items(move |row| Ok(has_fields(row, &names))).into());
            }
            let d = recv.into_datum(scope.array_limit())?;
            d.expect_object()?;
            Ok(Datum::Bool(has_fields(&d, &names)).into())
        }
        Op::WithFields => {
            let names = field_names(c, scope)?;
            let seq = recv.into_sequence()?;
            let seq = seq.filter_map_items(move |row| {
                has_fields(&row, &names).then(|| pluck(&row, &names)).transpose()
            });
            Ok(seq.into())
        }
        Op::Pluck | Op::Without => {
            let names = field_names(c, scope)?;
            let keep = c.op == Op::Pluck;
            let project =
                move |row: &Datum| if keep { pluck(row, &names) } else { without(row, &names) };
            if recv.is_sequence() {
                return Ok(recv.into_sequence()?.map_items(move |row| project(&row)).into());
            }
            project(&recv.into_datum(scope.array_limit())?).map(Value::Datum)
        }
        Op::Merge => {
            let patches = c.rest().iter().map(Function::from_term).collect::<Result<Vec<_>, _>>()?;
            if recv.is_sequence() {
                let scope = scope.clone();
                return Ok(recv
                    .into_sequence()?
                    .map_items(move |row| merge_all(row, &patches, &scope))
                    .into());
            }
            merge_all(recv.into_datum(scope.array_limit())?, &patches, scope).map(Value::Datum)
        }
        Op::Match => {
            let subject = recv.into_datum(scope.array_limit())?;
            let pattern = arg_datum(c, 1, scope)?;
            regex_match(subject.expect_str()?, pattern.expect_str()?).map(Value::Datum)
        }
        other => Err(DbError::QueryError(format!("`{}` is not an object operator", other.name()))),
    }
}

fn get_field(c: &Call, recv: Value, scope: &Scope) -> Result<Value, DbError> {
    let name = arg_datum(c, 1, scope)?;
    let name = name.expect_str()?.to_owned();
    if recv.is_sequence() {
        let seq = recv.into_sequence()?;
        return Ok(seq
            .filter_map_items(move |row| {
                row.expect_object()?;
                Ok(row.field(&name).cloned())
            })
            .into());
    }
    let d = recv.into_datum(scope.array_limit())?;
    d.get_field(&name).cloned().map(Value::Datum)
}

/// Field arguments may be strings or arrays of strings.
fn field_names(c: &Call, scope: &Scope) -> Result<Vec<String>, DbError> {
    let mut out = Vec::new();
    for i in 1..c.args.len() {
        match arg_datum(c, i, scope)? {
            Datum::String(s) => out.push(s),
            Datum::Array(items) => {
                for item in items {
                    out.push(item.expect_str()?.to_owned());
                }
            }
            other => return Err(other.expected("STRING")),
        }
    }
    Ok(out)
}

fn has_fields(row: &Datum, names: &[String]) -> bool {
    names.iter().all(|n| row.field(n).is_some_and(|v| !v.is_null()))
}

fn pluck(row: &Datum, names: &[String]) -> Result<Datum, DbError> {
    let obj = row.expect_object()?;
    let out: Object =
        names.iter().filter_map(|n| obj.get(n).map(|v| (n.clone(), v.clone()))).collect();
    Ok(Datum::Object(out))
}

fn without(row: &Datum, names: &[String]) -> Result<Datum, DbError> {
    let mut obj = row.expect_object()?.clone();
    for n in names {
        obj.remove(n);
    }
    Ok(Datum::Object(obj))
}

fn merge_all(row: Datum, patches: &[Function], scope: &Scope) -> Result<Datum, DbError> {
    let mut acc = row;
    for p in patches {
        let patch = p.call(scope, vec![acc.clone()])?;
        acc.expect_object()?;
        acc = merge_deep(acc, patch);
    }
    Ok(acc)
}

/// Recursive merge: nested objects are merged key by key, anything else in `patch` wins.
#[must_use]
pub fn merge_deep(base: Datum, patch: Datum) -> Datum {
    match (base, patch) {
        (Datum::Object(mut b), Datum::Object(p)) => {
            for (k, v) in p {
                let merged = match b.remove(&k) {
                    Some(old) => merge_deep(old, v),
                    None => v,
                };
                b.insert(k, merged);
            }
            Datum::Object(b)
        }
        (_, p) => p,
    }
}

#[cfg(feature = "regex")]
fn regex_match(subject: &str, pattern: &str) -> Result<Datum, DbError> {
    let re = regex::Regex::new(pattern)
        .map_err(|e| DbError::InvalidArgument(format!("Error in regexp `{pattern}`: {e}")))?;
    let Some(caps) = re.captures(subject) else {
        return Ok(Datum::Null);
    };
    let span = |m: regex::Match<'_>| -> Object {
        Object::from([
            ("str".to_owned(), Datum::from(m.as_str())),
            ("start".to_owned(), Datum::from(m.start())),
            ("end".to_owned(), Datum::from(m.end())),
        ])
    };
    let groups = caps.iter().skip(1).map(|g| g.map_or(Datum::Null, |m| Datum::Object(span(m))));
    let groups = Datum::Array(groups.collect());
    let mut out = caps.get(0).map(span).unwrap_or_default();
    out.insert("groups".into(), groups);
    Ok(Datum::Object(out))
}

#[cfg(not(feature = "regex"))]
fn regex_match(_subject: &str, _pattern: &str) -> Result<Datum, DbError> {
    Err(DbError::FeatureNotImplemented("`match` requires the `regex` feature".into()))
}
