//! The capability surface every database driver provides.
//!
//! A [`Backend`] is chosen once from a [`BackendKind`] and then used for every operation: it
//! opens connections, names parameters the way its driver expects, and knows how to call a
//! stored procedure. A [`Connection`] is one open session; the executor opens one per
//! operation and releases it on every path.

use std::fmt;

use async_trait::async_trait;

use crate::command::BoundCommand;
use crate::cursor::RowCursor;
use crate::error::SqlExecutorError;
use crate::params::Parameter;
use crate::results::{CustomDbRow, ResultSet, RowSet};
use crate::translation::PlaceholderStyle;
use crate::types::BackendKind;

/// Factory for connections and native parameters of one database family.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// How positional parameters are written in command text for this driver.
    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Turn a caller parameter into the driver's native form (for example `@`-prefixed).
    fn create_parameter(&self, param: Parameter) -> Parameter {
        param
    }

    /// Command text that invokes procedure `name` with `params` bound in order.
    ///
    /// # Errors
    /// Returns [`SqlExecutorError::Unimplemented`] when the backend has no procedures.
    fn procedure_text(&self, name: &str, params: &[Parameter]) -> Result<String, SqlExecutorError>;

    /// Open a new session.
    ///
    /// # Errors
    /// Returns the driver's error when the connection string is invalid or the server is
    /// unreachable.
    async fn connect(&self, connection_string: &str)
    -> Result<Box<dyn Connection>, SqlExecutorError>;
}

/// One open database session.
#[async_trait]
pub trait Connection: Send {
    /// Run a statement and return the number of rows it changed.
    async fn execute(&mut self, command: &BoundCommand) -> Result<usize, SqlExecutorError>;

    /// Run a query and materialize its first result set.
    async fn query(&mut self, command: &BoundCommand) -> Result<ResultSet, SqlExecutorError>;

    /// Run a command and materialize every result set it produces.
    async fn query_sets(&mut self, command: &BoundCommand) -> Result<RowSet, SqlExecutorError> {
        Ok(self.query(command).await?.into())
    }

    /// The first row of the first result set.
    async fn query_first(
        &mut self,
        command: &BoundCommand,
    ) -> Result<Option<CustomDbRow>, SqlExecutorError> {
        Ok(self.query(command).await?.into_first_row())
    }

    /// Start streaming rows; the cursor takes over this connection.
    async fn open_cursor(self: Box<Self>, command: BoundCommand)
    -> Result<RowCursor, SqlExecutorError>;

    async fn begin(&mut self) -> Result<(), SqlExecutorError>;

    async fn commit(&mut self) -> Result<(), SqlExecutorError>;

    async fn rollback(&mut self) -> Result<(), SqlExecutorError>;

    /// Release the session.
    async fn close(self: Box<Self>);
}

/// The backend for `kind`, as far as this build supports it.
///
/// Kinds whose driver feature is compiled out resolve to a backend that refuses to connect.
#[must_use]
pub fn resolve(kind: BackendKind) -> Box<dyn Backend> {
    match kind {
        BackendKind::SqlServer => sql_server(),
        BackendKind::Postgres => postgres(),
        BackendKind::Sqlite => sqlite(),
        BackendKind::OleDb | BackendKind::Odbc | BackendKind::Oracle => odbc(kind),
    }
}

fn sql_server() -> Box<dyn Backend> {
    #[cfg(feature = "mssql")]
    {
        Box::new(crate::mssql::MssqlBackend)
    }
    #[cfg(not(feature = "mssql"))]
    {
        Box::new(Unavailable::new(BackendKind::SqlServer, "mssql"))
    }
}

fn postgres() -> Box<dyn Backend> {
    #[cfg(feature = "postgres")]
    {
        Box::new(crate::postgres::PostgresBackend)
    }
    #[cfg(not(feature = "postgres"))]
    {
        Box::new(Unavailable::new(BackendKind::Postgres, "postgres"))
    }
}

fn sqlite() -> Box<dyn Backend> {
    #[cfg(feature = "sqlite")]
    {
        Box::new(crate::sqlite::SqliteBackend)
    }
    #[cfg(not(feature = "sqlite"))]
    {
        Box::new(Unavailable::new(BackendKind::Sqlite, "sqlite"))
    }
}

fn odbc(kind: BackendKind) -> Box<dyn Backend> {
    #[cfg(feature = "odbc")]
    {
        Box::new(crate::odbc::OdbcBackend::new(kind))
    }
    #[cfg(not(feature = "odbc"))]
    {
        Box::new(Unavailable::new(kind, "odbc"))
    }
}

/// Stand-in for a backend whose driver was not compiled in.
#[derive(Debug, Clone, Copy)]
pub struct Unavailable {
    kind: BackendKind,
    feature: &'static str,
}

impl Unavailable {
    #[must_use]
    pub fn new(kind: BackendKind, feature: &'static str) -> Self {
        Self { kind, feature }
    }

    fn error(&self) -> SqlExecutorError {
        SqlExecutorError::Unimplemented(format!(
            "the {} backend requires the `{}` feature",
            self.kind, self.feature
        ))
    }
}

#[async_trait]
impl Backend for Unavailable {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    fn procedure_text(&self, _name: &str, _params: &[Parameter]) -> Result<String, SqlExecutorError> {
        Err(self.error())
    }

    async fn connect(
        &self,
        _connection_string: &str,
    ) -> Result<Box<dyn Connection>, SqlExecutorError> {
        Err(self.error())
    }
}
