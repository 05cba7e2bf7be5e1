//! nexusql: a query-expression core for document databases.
//!
//! Queries are built with [`query::r`] and the chained [`Expr`] API, handed to a
//! [`Connection`], and evaluated lazily against tables supplied by a [`storage::Storage`]
//! implementation. Results come back as an atom, a streaming [`query::Cursor`], or a
//! [`query::WriteResult`].
//!
//! ```no_run
//! use nexusql::{Connection, r, storage::{MemoryStorage, TableOptions}};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), nexusql::DbError> {
//! let storage = Arc::new(MemoryStorage::new());
//! storage.create_table("users", TableOptions::default())?;
//! let conn = Connection::new(storage);
//! r::table("users").insert(serde_json::json!({"id": 1, "age": 30})).run(&conn).await?;
//! let _adults = r::table("users").filter(r::field("age").ge(18)).count().run(&conn).await?;
//! # Ok(()) }
//! ```
pub mod cli;
pub mod config;
pub mod connection;
pub mod datum;
pub mod errors;
pub mod logger;
pub mod query;
pub mod storage;
pub mod utils;

pub use connection::{Connection, Response, RunOptions};
pub use datum::Datum;
pub use errors::{DbError, ErrorKind};
pub use query::{Expr, r};

/// Initializes logging from `log4rs.yaml` in the working directory.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    logger::init()
}
