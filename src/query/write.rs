//! Write execution.
//!
//! Selections are evaluated synchronously into rows, then every row is written through the async
//! `Storage` contract one document at a time. Per-document failures are folded into the
//! `WriteResult`; transport failures abort the whole write.
use super::eval::{Function, Scope, arg, eval, opt_bool, opt_string};
use super::object::merge_deep;
use super::term::{Call, Op, Term};
use super::value::Value;
use crate::datum::{Datum, object};
use crate::errors::DbError;
use crate::storage::{Conflict, Durability, InsertOutcome, ReplaceOutcome, Storage, TableRef};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteResult {
    pub inserted: u64,
    pub replaced: u64,
    pub unchanged: u64,
    pub errors: u64,
    pub deleted: u64,
    pub skipped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub generated_keys: Vec<Datum>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_val: Option<Datum>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_val: Option<Datum>,
}

impl WriteResult {
    /// Number of documents the write considered.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.inserted + self.replaced + self.unchanged + self.errors + self.deleted + self.skipped
    }

    fn record_error(&mut self, e: &DbError) {
        self.errors += 1;
        if self.first_error.is_none() {
            self.first_error = Some(e.to_string());
        }
    }

    /// Records `e` against the current document, unless it is a transport failure.
    fn absorb(&mut self, e: DbError) -> Result<(), DbError> {
        if e.is_transport() {
            return Err(e);
        }
        self.record_error(&e);
        Ok(())
    }

    pub fn merge(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.replaced += other.replaced;
        self.unchanged += other.unchanged;
        self.errors += other.errors;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        if self.first_error.is_none() {
            self.first_error = other.first_error;
        }
        self.generated_keys.extend(other.generated_keys);
        self.old_val = self.old_val.take().or(other.old_val);
        self.new_val = self.new_val.take().or(other.new_val);
    }

    #[must_use]
    pub fn to_datum(&self) -> Datum {
        let mut out = object([
            ("inserted", Datum::from(self.inserted)),
            ("replaced", Datum::from(self.replaced)),
            ("unchanged", Datum::from(self.unchanged)),
            ("errors", Datum::from(self.errors)),
            ("deleted", Datum::from(self.deleted)),
            ("skipped", Datum::from(self.skipped)),
        ]);
        if let Datum::Object(map) = &mut out {
            if let Some(e) = &self.first_error {
                map.insert("first_error".into(), Datum::from(e.as_str()));
            }
            if !self.generated_keys.is_empty() {
                map.insert("generated_keys".into(), Datum::Array(self.generated_keys.clone()));
            }
            if let Some(v) = &self.old_val {
                map.insert("old_val".into(), v.clone());
            }
            if let Some(v) = &self.new_val {
                map.insert("new_val".into(), v.clone());
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy)]
struct WriteOpts {
    durability: Durability,
    return_vals: bool,
}

impl WriteOpts {
    fn from_call(c: &Call, scope: &Scope, default: Durability) -> Result<Self, DbError> {
        let durability = opt_string(c, "durability", scope)?
            .map(|s| Durability::parse(&s))
            .transpose()?
            .unwrap_or(default);
        let return_vals = opt_bool(c, "return_vals", scope)?.unwrap_or(false);
        Ok(Self { durability, return_vals })
    }

    fn check_single(self, n: usize) -> Result<(), DbError> {
        if self.return_vals && n > 1 {
            return Err(DbError::InvalidArgument(
                "`return_vals` is only valid for single-document writes".into(),
            ));
        }
        Ok(())
    }
}

/// Name of the table a selection is rooted at. Fails unless `term` is a chain of
/// selection-preserving operators ending at `table`.
pub(crate) fn selection_table(term: &Term) -> Result<String, DbError> {
    let mut cur = term;
    loop {
        match cur {
            Term::Call(c) if c.op == Op::Table => {
                return arg(c, 0)?
                    .as_literal()
                    .and_then(Datum::as_str)
                    .map(str::to_owned)
                    .ok_or_else(|| DbError::QueryError("Table name must be a string literal".into()));
            }
            Term::Call(c) if c.op.preserves_selection() => cur = arg(c, 0)?,
            other => {
                let found = other.op().map_or_else(|| "DATUM".to_owned(), Op::name);
                return Err(DbError::TypeMismatch(format!(
                    "Expected type SELECTION but found `{found}`"
                )));
            }
        }
    }
}

type WriteFuture<'b> = Pin<Box<dyn Future<Output = Result<WriteResult, DbError>> + Send + 'b>>;

/// Applies writes through `storage`.
///
/// A write without its own `durability` takes the run's, then the table's, then
/// `default_durability`.
pub struct WriteExecutor<'a> {
    storage: &'a dyn Storage,
    run_durability: Option<Durability>,
    default_durability: Durability,
}

impl std::fmt::Debug for WriteExecutor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteExecutor")
            .field("run_durability", &self.run_durability)
            .field("default_durability", &self.default_durability)
            .finish()
    }
}

impl<'a> WriteExecutor<'a> {
    #[must_use]
    pub fn new(storage: &'a dyn Storage, default_durability: Durability) -> Self {
        Self { storage, run_durability: None, default_durability }
    }

    #[must_use]
    pub const fn with_run_durability(mut self, durability: Option<Durability>) -> Self {
        self.run_durability = durability;
        self
    }

    fn durability_for(&self, table: &TableRef) -> Durability {
        self.run_durability.or_else(|| table.durability()).unwrap_or(self.default_durability)
    }

    /// Current snapshot of the table a selection is rooted at, so that writes nested in
    /// `for_each` see the effect of earlier iterations.
    async fn refreshed(&self, name: &str, scope: &Scope) -> Result<(TableRef, Scope), DbError> {
        let table = self.storage.open_table(name).await?;
        Ok((Arc::clone(&table), scope.with_table(table)))
    }

    /// Runs a write term. Arrays of writes (as returned by `for_each` bodies) are summed.
    pub fn execute<'b>(&'b self, term: &'b Arc<Term>, scope: &'b Scope) -> WriteFuture<'b> {
        Box::pin(async move {
            let Term::Call(c) = term.as_ref() else {
                return Err(DbError::QueryError("Expected a write query".into()));
            };
            match c.op {
                Op::Insert => self.insert(c, scope).await,
                Op::Update | Op::Replace | Op::Delete => self.modify(c, scope).await,
                Op::ForEach => self.for_each(c, scope).await,
                Op::MakeArray => {
                    let mut total = WriteResult::default();
                    for t in &c.args {
                        total.merge(self.execute(t, scope).await?);
                    }
                    Ok(total)
                }
                other => Err(DbError::QueryError(format!(
                    "Expected a write query but found `{}`",
                    other.name()
                ))),
            }
        })
    }

    async fn insert(&self, c: &Call, scope: &Scope) -> Result<WriteResult, DbError> {
        let table = match eval(arg(c, 0)?, scope)? {
            Value::Table(t) => t,
            other => {
                return Err(DbError::TypeMismatch(format!(
                    "Expected type TABLE but found {}",
                    other.type_name()
                )));
            }
        };
        let docs = match eval(arg(c, 1)?, scope)? {
            Value::Datum(Datum::Array(items)) => items,
            Value::Datum(d) => vec![d],
            other => other.into_sequence()?.collect_bounded(scope.array_limit())?,
        };
        let opts = WriteOpts::from_call(c, scope, self.durability_for(&table))?;
        opts.check_single(docs.len())?;
        let conflict =
            if opt_bool(c, "upsert", scope)?.unwrap_or(false) { Conflict::Replace } else { Conflict::Error };
        let pk = table.primary_key().to_owned();
        let mut res = WriteResult::default();
        for doc in docs {
            let Datum::Object(mut obj) = doc else {
                res.record_error(&DbError::TypeMismatch(format!(
                    "Expected type OBJECT but found {}",
                    doc.type_name()
                )));
                continue;
            };
            let generated = if obj.contains_key(&pk) {
                None
            } else {
                let key = Datum::String(uuid::Uuid::new_v4().to_string());
                obj.insert(pk.clone(), key.clone());
                Some(key)
            };
            let doc = Datum::Object(obj);
            match self.storage.insert(table.name(), doc.clone(), conflict, opts.durability).await {
                Ok(InsertOutcome::Inserted) => {
                    res.inserted += 1;
                    res.generated_keys.extend(generated);
                    if opts.return_vals {
                        res.old_val = Some(Datum::Null);
                        res.new_val = Some(doc);
                    }
                }
                Ok(InsertOutcome::Replaced { old }) => {
                    res.replaced += 1;
                    if opts.return_vals {
                        res.old_val = Some(old);
                        res.new_val = Some(doc);
                    }
                }
                Ok(InsertOutcome::Unchanged) => res.unchanged += 1,
                Err(e) => res.absorb(e)?,
            }
        }
        log::debug!("insert: table={}, result={:?}", table.name(), res);
        Ok(res)
    }

    async fn modify(&self, c: &Call, scope: &Scope) -> Result<WriteResult, DbError> {
        let recv = arg(c, 0)?;
        let (table, scope) = self.refreshed(&selection_table(recv)?, scope).await?;
        let scope = &scope;
        let pk = table.primary_key().to_owned();
        let (rows, mut res) = match eval(recv, scope)? {
            Value::Datum(Datum::Null) => (Vec::new(), WriteResult { skipped: 1, ..Default::default() }),
            Value::Datum(row @ Datum::Object(_)) => (vec![row], WriteResult::default()),
            other => (other.into_sequence()?.collect_bounded(scope.array_limit())?, WriteResult::default()),
        };
        let opts = WriteOpts::from_call(c, scope, self.durability_for(&table))?;
        opts.check_single(rows.len())?;
        let change = c.args.get(1).map(Function::from_term).transpose()?;
        for row in rows {
            let key = row.get_field(&pk)?.clone();
            let target = match (&change, c.op) {
                (None, _) => Ok(Datum::Null),
                (Some(f), Op::Update) => f.call(scope, vec![row.clone()]).and_then(|patch| {
                    if patch.is_null() {
                        Ok(row.clone())
                    } else {
                        patch.expect_object()?;
                        Ok(merge_deep(row.clone(), patch))
                    }
                }),
                (Some(f), _) => f.call(scope, vec![row.clone()]),
            };
            match target {
                Err(e) => res.absorb(e)?,
                Ok(Datum::Null) => self.delete_row(table.name(), &key, opts, &mut res).await?,
                Ok(new) => self.replace_row(table.name(), &pk, &key, row, new, opts, &mut res).await?,
            }
        }
        log::debug!("{}: table={}, result={:?}", c.op.name(), table.name(), res);
        Ok(res)
    }

    async fn delete_row(
        &self,
        table: &str,
        key: &Datum,
        opts: WriteOpts,
        res: &mut WriteResult,
    ) -> Result<(), DbError> {
        match self.storage.delete(table, key, opts.durability).await {
            Ok(Some(old)) => {
                res.deleted += 1;
                if opts.return_vals {
                    res.old_val = Some(old);
                    res.new_val = Some(Datum::Null);
                }
                Ok(())
            }
            Ok(None) => {
                res.skipped += 1;
                Ok(())
            }
            Err(e) => res.absorb(e),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn replace_row(
        &self,
        table: &str,
        pk: &str,
        key: &Datum,
        old: Datum,
        new: Datum,
        opts: WriteOpts,
        res: &mut WriteResult,
    ) -> Result<(), DbError> {
        if !matches!(new, Datum::Object(_)) {
            res.record_error(&DbError::TypeMismatch(format!(
                "Expected type OBJECT but found {}",
                new.type_name()
            )));
            return Ok(());
        }
        match new.field(pk) {
            None => {
                res.record_error(&DbError::InvalidArgument(format!(
                    "Document is missing primary key `{pk}`"
                )));
                return Ok(());
            }
            Some(k) if k != key => {
                res.record_error(&DbError::InvalidArgument(format!(
                    "Primary key `{pk}` cannot be changed"
                )));
                return Ok(());
            }
            Some(_) => {}
        }
        if new == old {
            res.unchanged += 1;
            return Ok(());
        }
        match self.storage.replace(table, key, new.clone(), opts.durability).await {
            Ok(ReplaceOutcome::Replaced { old }) => {
                res.replaced += 1;
                if opts.return_vals {
                    res.old_val = Some(old);
                    res.new_val = Some(new);
                }
                Ok(())
            }
            Ok(ReplaceOutcome::Unchanged) => {
                res.unchanged += 1;
                Ok(())
            }
            Ok(ReplaceOutcome::Missing) => {
                res.skipped += 1;
                Ok(())
            }
            Err(e) => res.absorb(e),
        }
    }

    async fn for_each(&self, c: &Call, scope: &Scope) -> Result<WriteResult, DbError> {
        let rows = eval(arg(c, 0)?, scope)?.into_sequence()?.collect_bounded(scope.array_limit())?;
        let f = Function::from_term(arg(c, 1)?)?;
        let mut total = WriteResult::default();
        for row in rows {
            let (inner, body) = f.bind(scope, vec![row])?;
            total.merge(self.execute(body, &inner).await?);
        }
        Ok(total)
    }
}
