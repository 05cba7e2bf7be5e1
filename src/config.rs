//! TOML configuration with environment overrides.
//!
//! ```toml
//! [query]
//! array_limit = 100000
//! cursor_buffer = 64
//! default_durability = "hard"
//! slow_query_ms = 500
//!
//! [logging]
//! dir = "logs"
//! level = "info"
//! retention = 7
//! ```
use crate::errors::DbError;
use crate::query::cursor::DEFAULT_CURSOR_BUFFER;
use crate::query::eval::DEFAULT_ARRAY_LIMIT;
use crate::storage::Durability;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "NEXUSQL_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "nexusql.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Largest array a query may materialize.
    pub array_limit: usize,
    /// Rows buffered between a cursor's producer and its consumer.
    pub cursor_buffer: usize,
    pub default_durability: Durability,
    pub slow_query_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            array_limit: DEFAULT_ARRAY_LIMIT,
            cursor_buffer: DEFAULT_CURSOR_BUFFER,
            default_durability: Durability::Hard,
            slow_query_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for rolling log files; console output when unset.
    pub dir: Option<PathBuf>,
    pub level: String,
    /// Rolled files kept per appender.
    pub retention: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { dir: None, level: "info".into(), retention: 7 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub query: QueryConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, DbError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, DbError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DbError::Io(format!("Failed to read config {}: {e}", path.display())))?;
        let cfg = Self::from_toml_str(&text)?;
        log::debug!("config: loaded path={}", path.display());
        Ok(cfg)
    }

    /// Applies `NEXUSQL_ARRAY_LIMIT` and `NEXUSQL_SLOW_QUERY_MS` when set and numeric.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(n) = env_number("NEXUSQL_ARRAY_LIMIT") {
            self.query.array_limit = usize::try_from(n).unwrap_or(usize::MAX);
        }
        if let Some(ms) = env_number("NEXUSQL_SLOW_QUERY_MS") {
            self.query.slow_query_ms = ms;
        }
        self
    }

    /// Resolves the configuration file: explicit path, then `NEXUSQL_CONFIG`, then
    /// `./nexusql.toml`, then defaults. Environment overrides are applied last.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, DbError> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let path = match (explicit, from_env) {
            (Some(p), _) => Some(p.to_path_buf()),
            (None, Some(p)) => Some(p),
            (None, None) => {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                local.exists().then_some(local)
            }
        };
        let cfg = match path {
            Some(p) => Self::load(&p)?,
            None => Self::default(),
        };
        Ok(cfg.with_env_overrides())
    }
}

fn env_number(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn partial_files_keep_defaults() {
        let cfg = Config::from_toml_str("[query]\ncursor_buffer = 8\n").unwrap();
        assert_eq!(cfg.query.cursor_buffer, 8);
        assert_eq!(cfg.query.array_limit, DEFAULT_ARRAY_LIMIT);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn durability_is_lowercase() {
        let cfg = Config::from_toml_str("[query]\ndefault_durability = \"soft\"\n").unwrap();
        assert_eq!(cfg.query.default_durability, Durability::Soft);
        let err = Config::from_toml_str("[query]\ndefault_durability = \"eventual\"\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn load_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nexusql.toml");
        std::fs::write(&path, "[logging]\nretention = 3\n").unwrap();
        assert_eq!(Config::load(&path).unwrap().logging.retention, 3);
        assert_eq!(Config::load(&dir.path().join("missing.toml")).unwrap_err().kind(), ErrorKind::Io);
    }
}
