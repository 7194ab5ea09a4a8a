//! Error types for SQLite operations.

use relata_query::error::QueryError;
use thiserror::Error;

/// Result type for SQLite operations.
pub type SqliteResult<T> = Result<T, SqliteError>;

/// Error type for SQLite operations.
#[derive(Error, Debug)]
pub enum SqliteError {
    /// Pool error.
    #[error("Pool error: {0}")]
    Pool(String),
    /// SQLite driver error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),
    /// Timed out waiting for a connection.
    #[error("Timeout error: {0}")]
    Timeout(String),
}

impl SqliteError {
    /// Create a pool error.
    pub fn pool(msg: impl Into<String>) -> Self {
        Self::Pool(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }
}

impl From<rusqlite::Error> for SqliteError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sqlite(tokio_rusqlite::Error::Rusqlite(err))
    }
}

/// Driver failures become `StoreError`; everything that prevents getting a
/// usable connection becomes `ConnectionFailed`.
impl From<SqliteError> for QueryError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Sqlite(e) => QueryError::store(e.to_string()),
            SqliteError::Config(msg) => QueryError::connection(format!("config: {}", msg)),
            SqliteError::Pool(msg) | SqliteError::Connection(msg) | SqliteError::Timeout(msg) => {
                QueryError::connection(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relata_query::ErrorCode;

    #[test]
    fn test_error_display() {
        let err = SqliteError::config("invalid path");
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("invalid path"));
    }

    #[test]
    fn test_error_conversion() {
        let err: QueryError = SqliteError::timeout("no connection within 30s").into();
        assert_eq!(err.code, ErrorCode::ConnectionFailed);

        let err: QueryError = SqliteError::from(rusqlite::Error::InvalidQuery).into();
        assert_eq!(err.code, ErrorCode::StoreError);
        assert!(err.is_store_error());
    }
}
