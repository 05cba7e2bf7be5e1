//! Term interpreter.
//!
//! Evaluation is a recursive walk over `Term` carrying a `Scope`: the shared per-query context,
//! bound function variables, and the implicit row. Operator families live in sibling modules and
//! are reached through `apply_op`.
use super::builder::Bound;
use super::term::{Call, Op, Term, VarId};
use super::value::{GroupedData, Sequence, Value};
use super::{aggregate, array, join, math, object, sequence, temporal};
use crate::datum::{Datum, Object};
use crate::errors::DbError;
use crate::storage::TableRef;
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_ARRAY_LIMIT: usize = 100_000;

/// State shared by every scope of one query: opened tables, limits and the query's clock.
#[derive(Clone)]
pub struct QueryContext {
    tables: HashMap<String, TableRef>,
    pub array_limit: usize,
    pub now: DateTime<FixedOffset>,
}

impl fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.tables.keys().collect();
        names.sort();
        f.debug_struct("QueryContext")
            .field("tables", &names)
            .field("array_limit", &self.array_limit)
            .field("now", &self.now)
            .finish()
    }
}

impl Default for QueryContext {
    fn default() -> Self {
        Self::new(DEFAULT_ARRAY_LIMIT)
    }
}

impl QueryContext {
    #[must_use]
    pub fn new(array_limit: usize) -> Self {
        Self { tables: HashMap::new(), array_limit, now: Utc::now().fixed_offset() }
    }

    pub fn add_table(&mut self, table: TableRef) {
        self.tables.insert(table.name().to_owned(), table);
    }

    pub fn table(&self, name: &str) -> Result<TableRef, DbError> {
        self.tables.get(name).cloned().ok_or_else(|| DbError::NoSuchTable(name.to_owned()))
    }
}

struct Binding {
    id: VarId,
    value: Datum,
    next: Option<Arc<Binding>>,
}

#[derive(Clone)]
pub struct Scope {
    ctx: Arc<QueryContext>,
    vars: Option<Arc<Binding>>,
    row: Option<Datum>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope").field("ctx", &self.ctx).field("row", &self.row).finish_non_exhaustive()
    }
}

impl Scope {
    #[must_use]
    pub const fn new(ctx: Arc<QueryContext>) -> Self {
        Self { ctx, vars: None, row: None }
    }

    #[must_use]
    pub fn ctx(&self) -> &QueryContext {
        &self.ctx
    }

    #[must_use]
    pub fn array_limit(&self) -> usize {
        self.ctx.array_limit
    }

    fn lookup(&self, id: VarId) -> Result<Datum, DbError> {
        let mut cur = self.vars.as_ref();
        while let Some(b) = cur {
            if b.id == id {
                return Ok(b.value.clone());
            }
            cur = b.next.as_ref();
        }
        Err(DbError::QueryError(format!("Variable `{id}` is not bound")))
    }

    fn row(&self) -> Result<&Datum, DbError> {
        self.row
            .as_ref()
            .ok_or_else(|| DbError::QueryError("Implicit row used outside of a function".into()))
    }

    fn bind(&self, params: &[VarId], args: Vec<Datum>) -> Self {
        let mut vars = self.vars.clone();
        for (id, value) in params.iter().zip(args) {
            vars = Some(Arc::new(Binding { id: *id, value, next: vars }));
        }
        Self { ctx: Arc::clone(&self.ctx), vars, row: self.row.clone() }
    }

    /// Same bindings, with `table` replacing any snapshot of the same name.
    #[must_use]
    pub fn with_table(&self, table: TableRef) -> Self {
        let mut ctx = QueryContext::clone(&self.ctx);
        ctx.add_table(table);
        Self { ctx: Arc::new(ctx), vars: self.vars.clone(), row: self.row.clone() }
    }

    fn with_row(&self, row: Datum) -> Self {
        Self { ctx: Arc::clone(&self.ctx), vars: self.vars.clone(), row: Some(row) }
    }
}

/// A callable argument: either a `func` term or a plain expression over the implicit row.
#[derive(Debug, Clone)]
pub struct Function {
    params: Vec<VarId>,
    body: Arc<Term>,
}

impl Function {
    pub fn from_term(term: &Arc<Term>) -> Result<Self, DbError> {
        if let Term::Call(c) = term.as_ref()
            && c.op == Op::Func
        {
            let params = arg(c, 0)?
                .as_literal()
                .ok_or_else(|| DbError::QueryError("Function parameters must be literal".into()))?
                .expect_array()?
                .iter()
                .map(|d| d.expect_count().map(|n| n as VarId))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Self { params, body: Arc::clone(arg(c, 1)?) });
        }
        Ok(Self { params: Vec::new(), body: Arc::clone(term) })
    }

    fn scope_for(&self, scope: &Scope, args: Vec<Datum>) -> Result<Scope, DbError> {
        if self.params.is_empty() {
            let row = args.into_iter().next().unwrap_or_default();
            return Ok(scope.with_row(row));
        }
        if args.len() != self.params.len() {
            return Err(DbError::InvalidArgument(format!(
                "Expected function with {} argument(s) but found function with {}",
                args.len(),
                self.params.len()
            )));
        }
        Ok(scope.bind(&self.params, args))
    }

    /// The body together with the scope it runs in for `args`, for callers that interpret the
    /// body themselves (writes nested in `for_each`).
    pub(crate) fn bind(&self, scope: &Scope, args: Vec<Datum>) -> Result<(Scope, &Arc<Term>), DbError> {
        Ok((self.scope_for(scope, args)?, &self.body))
    }

    pub fn call_value(&self, scope: &Scope, args: Vec<Datum>) -> Result<Value, DbError> {
        eval(&self.body, &self.scope_for(scope, args)?)
    }

    pub fn call(&self, scope: &Scope, args: Vec<Datum>) -> Result<Datum, DbError> {
        self.call_value(scope, args)?.into_datum(scope.array_limit())
    }
}

/// A string literal selects a field; anything else is a function of the row.
#[derive(Debug, Clone)]
pub enum Selector {
    Field(String),
    Func(Function),
}

impl Selector {
    pub fn from_term(term: &Arc<Term>) -> Result<Self, DbError> {
        match term.as_ref() {
            Term::Literal(Datum::String(name)) => Ok(Self::Field(name.clone())),
            _ => Ok(Self::Func(Function::from_term(term)?)),
        }
    }

    pub fn select(&self, scope: &Scope, row: &Datum) -> Result<Datum, DbError> {
        match self {
            Self::Field(name) => row.get_field(name).cloned(),
            Self::Func(f) => f.call(scope, vec![row.clone()]),
        }
    }

    /// `None` when the row lacks what the selector reads.
    pub fn select_opt(&self, scope: &Scope, row: &Datum) -> Result<Option<Datum>, DbError> {
        match self.select(scope, row) {
            Ok(d) => Ok(Some(d)),
            Err(e) if e.is_non_existence() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

pub(crate) fn is_func(term: &Term) -> bool {
    term.op() == Some(Op::Func)
}

pub(crate) fn arg(c: &Call, i: usize) -> Result<&Arc<Term>, DbError> {
    c.args.get(i).ok_or_else(|| {
        DbError::QueryError(format!(
            "`{}` expects at least {} argument(s) but found {}",
            c.op.name(),
            i + 1,
            c.args.len()
        ))
    })
}

pub(crate) fn arg_datum(c: &Call, i: usize, scope: &Scope) -> Result<Datum, DbError> {
    eval_datum(arg(c, i)?, scope)
}

pub(crate) fn opt_datum(c: &Call, name: &str, scope: &Scope) -> Result<Option<Datum>, DbError> {
    c.opt(name).map(|t| eval_datum(t, scope)).transpose()
}

pub(crate) fn opt_string(c: &Call, name: &str, scope: &Scope) -> Result<Option<String>, DbError> {
    opt_datum(c, name, scope)?.map(|d| d.expect_str().map(str::to_owned)).transpose()
}

pub(crate) fn opt_bool(c: &Call, name: &str, scope: &Scope) -> Result<Option<bool>, DbError> {
    opt_datum(c, name, scope)?.map(|d| d.expect_bool()).transpose()
}

pub(crate) fn opt_bound(
    c: &Call,
    name: &str,
    scope: &Scope,
    default: Bound,
) -> Result<Bound, DbError> {
    opt_string(c, name, scope)?.map_or(Ok(default), |s| Bound::parse(&s))
}

pub fn eval(term: &Arc<Term>, scope: &Scope) -> Result<Value, DbError> {
    match term.as_ref() {
        Term::Literal(d) => Ok(Value::Datum(d.clone())),
        Term::Field(name) => Ok(Value::Datum(scope.row()?.get_field(name)?.clone())),
        Term::Call(c) => eval_call(c, scope),
    }
}

pub fn eval_datum(term: &Arc<Term>, scope: &Scope) -> Result<Datum, DbError> {
    eval(term, scope)?.into_datum(scope.array_limit())
}

pub fn eval_sequence(term: &Arc<Term>, scope: &Scope) -> Result<Sequence, DbError> {
    eval(term, scope)?.into_sequence()
}

/// Evaluates a one-argument function outside any query, e.g. to compute secondary index keys.
pub fn apply_standalone(func: &Arc<Term>, row: Datum) -> Result<Datum, DbError> {
    let scope = Scope::new(Arc::new(QueryContext::default()));
    Function::from_term(func)?.call(&scope, vec![row])
}

fn eval_call(c: &Call, scope: &Scope) -> Result<Value, DbError> {
    match c.op {
        Op::MakeArray => {
            let items = c.args.iter().map(|a| eval_datum(a, scope)).collect::<Result<Vec<_>, _>>()?;
            Ok(Datum::Array(items).into())
        }
        Op::MakeObject => {
            let mut out = Object::new();
            for (key, t) in &c.opts {
                out.insert(key.clone(), eval_datum(t, scope)?);
            }
            Ok(Datum::Object(out).into())
        }
        Op::Var => {
            let id = arg_datum(c, 0, scope)?.expect_count()? as VarId;
            scope.lookup(id).map(Value::Datum)
        }
        Op::ImplicitVar => scope.row().cloned().map(Value::Datum),
        Op::Func => Err(DbError::QueryError("A function can only be used as an argument".into())),
        Op::Table => {
            let name = arg_datum(c, 0, scope)?;
            scope.ctx().table(name.expect_str()?).map(Value::Table)
        }
        Op::Branch => {
            if arg_datum(c, 0, scope)?.is_truthy() {
                eval(arg(c, 1)?, scope)
            } else {
                eval(arg(c, 2)?, scope)
            }
        }
        Op::And => {
            let mut last = Datum::Bool(true);
            for a in &c.args {
                last = eval_datum(a, scope)?;
                if !last.is_truthy() {
                    break;
                }
            }
            Ok(last.into())
        }
        Op::Or => {
            let mut last = Datum::Bool(false);
            for a in &c.args {
                last = eval_datum(a, scope)?;
                if last.is_truthy() {
                    break;
                }
            }
            Ok(last.into())
        }
        Op::Default => eval_default(c, scope),
        Op::Range => sequence::range(c, scope),
        Op::Now => Ok(Datum::Time(scope.ctx().now).into()),
        Op::Time | Op::EpochTime | Op::Iso8601 => temporal::construct(c, scope),
        Op::Asc | Op::Desc => Err(DbError::QueryError(format!(
            "`{}` may only be used as an argument to `order_by`",
            c.op.name()
        ))),
        op if op.is_write() => Err(DbError::QueryError(format!(
            "`{}` must be the outermost term of a query",
            op.name()
        ))),
        _ => match eval(arg(c, 0)?, scope)? {
            Value::Grouped(groups) if c.op == Op::Ungroup => Ok(Datum::Array(groups.ungroup()).into()),
            Value::Grouped(groups) if c.op.is_group_aware() => apply_grouped(c, groups, scope),
            other if c.op == Op::Ungroup || matches!(other, Value::Grouped(_)) => {
                Err(DbError::TypeMismatch(format!(
                    "Cannot apply `{}` to {}",
                    c.op.name(),
                    other.type_name()
                )))
            }
            other => apply_op(c, other, scope),
        },
    }
}

fn eval_default(c: &Call, scope: &Scope) -> Result<Value, DbError> {
    let fallback = arg(c, 1)?;
    let failure = match eval(arg(c, 0)?, scope) {
        Ok(Value::Datum(Datum::Null)) => None,
        Ok(v) => return Ok(v),
        Err(e) if e.is_non_existence() => Some(e),
        Err(e) => return Err(e),
    };
    if is_func(fallback) {
        let message = failure.map_or(Datum::Null, |e| Datum::String(e.to_string()));
        return Function::from_term(fallback)?.call_value(scope, vec![message]);
    }
    eval(fallback, scope)
}

fn apply_grouped(c: &Call, groups: GroupedData, scope: &Scope) -> Result<Value, DbError> {
    let limit = scope.array_limit();
    let mut out = BTreeMap::new();
    for (key, rows) in groups.0 {
        let reduced = apply_op(c, Value::Datum(rows), scope)?.into_datum(limit)?;
        out.insert(key, reduced);
    }
    Ok(Value::Grouped(GroupedData(out)))
}

/// Applies `c` to an already evaluated receiver.
pub(crate) fn apply_op(c: &Call, recv: Value, scope: &Scope) -> Result<Value, DbError> {
    match c.op {
        Op::Get | Op::GetAll | Op::Between => sequence::table_access(c, recv, scope),
        Op::GetField
        | Op::HasFields
        | Op::Keys
        | Op::Pluck
        | Op::Without
        | Op::Merge
        | Op::WithFields
        | Op::Match => object::apply(c, recv, scope),
        Op::Eq
        | Op::Ne
        | Op::Gt
        | Op::Ge
        | Op::Lt
        | Op::Le
        | Op::Not
        | Op::Add
        | Op::Sub
        | Op::Mul
        | Op::Div
        | Op::Mod => math::apply(c, recv, scope),
        Op::Append
        | Op::Prepend
        | Op::Difference
        | Op::SetInsert
        | Op::SetUnion
        | Op::SetIntersection
        | Op::SetDifference
        | Op::InsertAt
        | Op::SpliceAt
        | Op::DeleteAt
        | Op::ChangeAt => array::apply(c, recv, scope),
        Op::Filter
        | Op::Map
        | Op::ConcatMap
        | Op::OrderBy
        | Op::Skip
        | Op::Limit
        | Op::Slice
        | Op::Nth
        | Op::IndexesOf
        | Op::IsEmpty
        | Op::Union
        | Op::Sample
        | Op::Distinct
        | Op::Contains => sequence::apply(c, recv, scope),
        Op::InnerJoin | Op::OuterJoin | Op::EqJoin | Op::Zip => join::apply(c, recv, scope),
        Op::Reduce | Op::Count | Op::Sum | Op::Avg | Op::Min | Op::Max | Op::Group => {
            aggregate::apply(c, recv, scope)
        }
        Op::InTimezone
        | Op::Timezone
        | Op::During
        | Op::Date
        | Op::TimeOfDay
        | Op::Year
        | Op::Month
        | Op::Day
        | Op::DayOfWeek
        | Op::DayOfYear
        | Op::Hours
        | Op::Minutes
        | Op::Seconds
        | Op::ToIso8601
        | Op::ToEpochTime => temporal::apply(c, recv, scope),
        other => Err(DbError::QueryError(format!("`{}` cannot be applied to a value", other.name()))),
    }
}
