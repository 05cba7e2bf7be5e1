//! Query execution entry point.
//!
//! `Connection::run` opens every table the query names, evaluates it and shapes the answer:
//! atoms come back whole, streams through a `Cursor`, writes as a `WriteResult`.
use crate::config::QueryConfig;
use crate::datum::Datum;
use crate::errors::DbError;
use crate::query::builder::Expr;
use crate::query::cursor::Cursor;
use crate::query::eval::{QueryContext, Scope, eval};
use crate::query::telemetry;
use crate::query::term::{Op, Term};
use crate::query::value::{SeqKind, Value};
use crate::query::write::{WriteExecutor, WriteResult};
use crate::storage::{Durability, Storage};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug)]
pub enum Response {
    Atom(Datum),
    Cursor(Cursor),
    Write(WriteResult),
}

impl Response {
    /// Collapses any response into a datum; cursors are drained.
    pub async fn into_datum(self) -> Result<Datum, DbError> {
        match self {
            Self::Atom(d) => Ok(d),
            Self::Cursor(mut c) => Ok(Datum::Array(c.to_array().await?)),
            Self::Write(w) => Ok(w.to_datum()),
        }
    }

    pub fn into_cursor(self) -> Result<Cursor, DbError> {
        match self {
            Self::Cursor(c) => Ok(c),
            other => Err(DbError::TypeMismatch(format!("Expected a cursor but found {}", other.kind()))),
        }
    }

    pub fn into_write(self) -> Result<WriteResult, DbError> {
        match self {
            Self::Write(w) => Ok(w),
            other => {
                Err(DbError::TypeMismatch(format!("Expected a write result but found {}", other.kind())))
            }
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::Atom(_) => "an atom",
            Self::Cursor(_) => "a cursor",
            Self::Write(_) => "a write result",
        }
    }
}

/// Per-run options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Durability for writes without their own; takes precedence over the table's setting.
    pub durability: Option<Durability>,
}

pub struct Connection {
    storage: Arc<dyn Storage>,
    config: QueryConfig,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("config", &self.config).finish()
    }
}

/// Literal table names referenced anywhere in `term`.
fn referenced_tables(term: &Term) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    term.walk(&mut |t| {
        if let Term::Call(c) = t
            && c.op == Op::Table
            && let Some(name) = c.args.first().and_then(|a| a.as_literal()).and_then(Datum::as_str)
        {
            out.insert(name.to_owned());
        }
    });
    out
}

impl Connection {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_config(storage, QueryConfig::default())
    }

    #[must_use]
    pub fn with_config(storage: Arc<dyn Storage>, config: QueryConfig) -> Self {
        telemetry::set_slow_query_ms(config.slow_query_ms);
        Self { storage, config }
    }

    #[must_use]
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub async fn run(&self, query: &Expr) -> Result<Response, DbError> {
        self.run_term(query.term(), &RunOptions::default()).await
    }

    pub async fn run_with(&self, query: &Expr, opts: &RunOptions) -> Result<Response, DbError> {
        self.run_term(query.term(), opts).await
    }

    pub async fn run_term(&self, term: &Arc<Term>, opts: &RunOptions) -> Result<Response, DbError> {
        let started = Instant::now();
        let hash = telemetry::query_hash(term);
        let root = term.op().map_or_else(|| "datum".to_owned(), Op::name);
        let out = self.execute(term, opts).await;
        telemetry::log_query(&hash, &root, started.elapsed().as_millis(), out.is_ok());
        match &out {
            Ok(Response::Write(w)) => telemetry::log_write(w),
            Ok(Response::Cursor(_)) => telemetry::log_cursor_opened(),
            Ok(Response::Atom(_)) => {}
            Err(e) => log::debug!("run: hash={hash}, root={root}, error={e}"),
        }
        out
    }

    async fn execute(&self, term: &Arc<Term>, opts: &RunOptions) -> Result<Response, DbError> {
        let mut ctx = QueryContext::new(self.config.array_limit);
        for name in referenced_tables(term) {
            ctx.add_table(self.storage.open_table(&name).await?);
        }
        let scope = Scope::new(Arc::new(ctx));
        if term.op().is_some_and(Op::is_write) {
            let result = WriteExecutor::new(self.storage.as_ref(), self.config.default_durability)
                .with_run_durability(opts.durability)
                .execute(term, &scope)
                .await?;
            return Ok(Response::Write(result));
        }
        let limit = self.config.array_limit;
        Ok(match eval(term, &scope)? {
            Value::Datum(d) => Response::Atom(d),
            Value::Grouped(g) => Response::Atom(Datum::Array(g.ungroup())),
            Value::Sequence(s) if s.kind == SeqKind::Array && !s.infinite => {
                Response::Atom(Datum::Array(s.collect_bounded(limit)?))
            }
            other => Response::Cursor(Cursor::spawn(other.into_sequence()?, self.config.cursor_buffer, limit)),
        })
    }
}

impl Expr {
    /// Runs this query on `conn`.
    pub async fn run(&self, conn: &Connection) -> Result<Response, DbError> {
        conn.run(self).await
    }
}
