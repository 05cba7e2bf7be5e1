use thiserror::Error;

/// Coarse classification callers branch on for retry/skip decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TypeMismatch,
    KeyMissing,
    IndexOutOfRange,
    EmptyReduction,
    ResourceExhausted,
    CursorClosed,
    InvalidArgument,
    Conflict,
    NotFound,
    Connection,
    Timeout,
    Server,
    Query,
    Io,
    Config,
    FeatureNotImplemented,
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Missing key: {0}")]
    KeyMissing(String),

    #[error("Index out of range: {0}")]
    IndexOutOfRange(String),

    #[error("Empty reduction: {0}")]
    EmptyReduction(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Cursor is closed")]
    CursorClosed,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Duplicate primary key `{key}` in table `{table}`")]
    DuplicateKey { table: String, key: String },

    #[error("Table not found: {0}")]
    NoSuchTable(String),

    #[error("Index `{index}` was not found on table `{table}`")]
    NoSuchIndex { table: String, index: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("feature not implemented: {0}")]
    FeatureNotImplemented(String),
}

impl DbError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TypeMismatch(_) => ErrorKind::TypeMismatch,
            Self::KeyMissing(_) => ErrorKind::KeyMissing,
            Self::IndexOutOfRange(_) => ErrorKind::IndexOutOfRange,
            Self::EmptyReduction(_) => ErrorKind::EmptyReduction,
            Self::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            Self::CursorClosed => ErrorKind::CursorClosed,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::DuplicateKey { .. } => ErrorKind::Conflict,
            Self::NoSuchTable(_) | Self::NoSuchIndex { .. } => ErrorKind::NotFound,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Server(_) => ErrorKind::Server,
            Self::QueryError(_) => ErrorKind::Query,
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) => ErrorKind::Query,
            Self::Toml(_) => ErrorKind::Config,
            Self::FeatureNotImplemented(_) => ErrorKind::FeatureNotImplemented,
        }
    }

    /// Failures owned by the storage collaborator. These abort a batch write instead of being
    /// folded into its `WriteResult`.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connection | ErrorKind::Timeout | ErrorKind::Server)
    }

    /// Errors that `default(..)` recovers from.
    #[must_use]
    pub const fn is_non_existence(&self) -> bool {
        matches!(self.kind(), ErrorKind::KeyMissing | ErrorKind::IndexOutOfRange)
    }
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
