use std::time::Duration;

use thiserror::Error;

/// Every failure the executor can surface.
///
/// Driver errors are wrapped transparently so callers still see the driver's own message;
/// the executor never narrows them into finer-grained categories.
#[derive(Debug, Error)]
pub enum SqlExecutorError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[cfg(feature = "mssql")]
    #[error(transparent)]
    MssqlError(#[from] tiberius::error::Error),

    #[cfg(feature = "odbc")]
    #[error(transparent)]
    OdbcError(#[from] odbc_api::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter binding error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),

    #[error("Other database error: {0}")]
    Other(String),
}

impl From<std::io::Error> for SqlExecutorError {
    fn from(err: std::io::Error) -> Self {
        SqlExecutorError::ConnectionError(err.to_string())
    }
}
