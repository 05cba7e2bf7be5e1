mod command;
mod runner;
mod util;

pub use command::Command;
pub use runner::{OutputMode, run_with_format};
pub use util::{TableSpec, load_table, read_query_arg};
