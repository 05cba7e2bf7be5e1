use super::util::TableSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run a wire-form query against tables loaded from NDJSON files.
    Query { tables: Vec<TableSpec>, query: String },
    /// Print the normalized wire form of a query and its hash.
    Explain { query: String },
    /// Print process counters.
    Metrics,
}
