//! Error types for catalog probing, registration and enum array decoding.

use std::path::PathBuf;

use thiserror::Error;

/// The metadata query could not be executed.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Error reported by the sqlx driver (closed connection, permission denied, ...).
    #[error("catalog query failed: {0}")]
    Driver(#[from] sqlx::Error),

    /// Error reported by a non-sqlx catalog source.
    #[error("catalog query failed: {0}")]
    Source(String),
}

/// A single catalog row could not be decoded into `(oid, typname)`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("row {row}: cannot decode column `{column}`: {reason}")]
pub struct ScanError {
    /// Zero-based index of the row in the result set.
    pub row: usize,
    /// Column that failed to decode.
    pub column: &'static str,
    pub reason: String,
}

impl ScanError {
    pub fn new(row: usize, column: &'static str, reason: impl Into<String>) -> Self {
        Self {
            row,
            column,
            reason: reason.into(),
        }
    }
}

/// A column value could not be decoded as an enum array.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed array literal at `{0}`")]
    Syntax(String),

    #[error("unexpected trailing input `{0}`")]
    Trailing(String),

    #[error("sub-arrays have mismatched lengths")]
    Ragged,

    #[error("dimension bounds do not match element count")]
    Bounds,

    #[error("invalid binary array: {0}")]
    Binary(String),

    #[error("enum label is not valid UTF-8")]
    Utf8,
}

/// Configuration file could not be read or parsed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Crate-level error.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Only surfaced under [`ScanErrorPolicy::Strict`](crate::ScanErrorPolicy::Strict).
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("type oid {0} has no registered decoder")]
    UnregisteredType(u32),

    #[error("column {0} has no type oid")]
    MissingTypeOid(String),

    #[error("column {column}: {source}")]
    Column {
        column: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::new(3, "typname", "unexpected null");
        assert_eq!(
            err.to_string(),
            "row 3: cannot decode column `typname`: unexpected null"
        );
    }

    #[test]
    fn test_query_error_is_transparent() {
        let err: Error = QueryError::Source("connection closed".into()).into();
        assert_eq!(err.to_string(), "catalog query failed: connection closed");
    }
}
