//! Query expressions: construction, evaluation, streaming and writes.
pub mod builder;
pub mod cursor;
pub mod eval;
pub mod parse;
pub mod telemetry;
pub mod term;
pub mod value;
pub mod write;

// Operator families, reached through `eval::apply_op`.
mod aggregate;
mod array;
mod join;
mod math;
pub mod object;
mod sequence;
mod temporal;

pub use builder::{Bound, Expr, IndexSpec, InsertOptions, WriteOptions, r};
pub use cursor::{Cursor, CursorState};
pub use eval::{Function, QueryContext, Scope, Selector};
pub use parse::{parse_query_json, to_query_json};
pub use term::{Call, Op, Term};
pub use value::{GroupedData, SeqKind, Sequence, Value};
pub use write::WriteResult;
