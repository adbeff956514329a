//! The executor: one entry point per command shape.
//!
//! Every operation opens a fresh connection, binds the command for the executor's backend,
//! runs it under the command's (or the executor's) deadline and releases the connection on
//! every path. Failures are handed to the [`FailureSink`] with the command text and
//! parameter values before the original error is returned.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::backend::{Backend, Connection, resolve};
use crate::batch::{BatchOutcome, TransactionBatch};
use crate::command::{BoundCommand, Command, LazyConnection};
use crate::config::ExecutorConfig;
use crate::cursor::RowCursor;
use crate::diagnostics::{Diagnosed, FailureSink, TracingSink};
use crate::error::SqlExecutorError;
use crate::params::{NamedParams, Parameter, bare_name};
use crate::results::{CustomDbRow, ResultSet, RowSet};
use crate::types::{BackendKind, RowValues};

pub(crate) const COMPONENT: &str = "sql_executor";

/// Runs commands against one database.
///
/// ```rust,no_run
/// use sql_executor::prelude::*;
///
/// # async fn demo() -> Result<(), SqlExecutorError> {
/// let executor = SqlExecutor::new("Data Source=app.db", BackendKind::Sqlite);
///
/// executor
///     .execute_non_query(
///         Command::text("insert into users (id, name) values (@id, @name)")
///             .param("@id", 1)
///             .param("@name", "ada"),
///     )
///     .await?;
///
/// let name = executor
///     .get_scalar_string(Command::text("select name from users where id = :id").param("id", 1))
///     .await?;
/// assert_eq!(name, "ada");
/// # Ok(())
/// # }
/// ```
pub struct SqlExecutor {
    connection_string: String,
    backend: Box<dyn Backend>,
    sink: Arc<dyn FailureSink>,
    timeout: Option<Duration>,
}

impl SqlExecutor {
    /// An executor for `kind`, reporting failures through `tracing`.
    #[must_use]
    pub fn new(connection_string: impl Into<String>, kind: BackendKind) -> Self {
        Self::with_backend(connection_string, resolve(kind))
    }

    /// An executor over a caller-supplied backend.
    #[must_use]
    pub fn with_backend(connection_string: impl Into<String>, backend: Box<dyn Backend>) -> Self {
        let connection_string = connection_string.into();
        tracing::debug!(backend = %backend.kind(), "executor created");
        Self {
            connection_string,
            backend,
            sink: Arc::new(TracingSink),
            timeout: None,
        }
    }

    #[must_use]
    pub fn from_config(config: ExecutorConfig) -> Self {
        Self::new(config.connection_string, config.backend).with_timeout(config.timeout)
    }

    /// Send failure reports to `sink` instead of `tracing`.
    #[must_use]
    pub fn with_failure_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Default deadline for commands that do not set their own.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    #[must_use]
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    #[must_use]
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn lazy(&self) -> LazyConnection<'_> {
        LazyConnection::new(self.backend.as_ref(), &self.connection_string)
    }

    pub(crate) fn diagnosed<'a>(
        &'a self,
        component: &'a str,
        command_text: &'a str,
        params: &'a [Parameter],
        timeout: Option<Duration>,
    ) -> Diagnosed<'a> {
        Diagnosed {
            sink: self.sink.as_ref(),
            component,
            command_text,
            params,
            timeout,
        }
    }

    fn diagnosed_command<'a>(&'a self, command: &'a Command) -> Diagnosed<'a> {
        self.diagnosed(
            COMPONENT,
            &command.text,
            command.params.as_slice(),
            command.timeout.or(self.timeout),
        )
    }

    /// Bind `command` on a fresh connection, run `op`, and release the connection.
    async fn with_connection<T, F>(&self, command: &Command, op: F) -> Result<T, SqlExecutorError>
    where
        T: Send,
        F: for<'c> FnOnce(
                &'c mut Box<dyn Connection>,
                BoundCommand,
            ) -> BoxFuture<'c, Result<T, SqlExecutorError>>
            + Send,
    {
        self.diagnosed_command(command)
            .run(async {
                let mut lazy = self.lazy();
                let result = async {
                    let (conn, bound) = lazy
                        .bind(&command.text, command.mode, command.params.as_slice())
                        .await?;
                    op(conn, bound).await
                }
                .await;
                lazy.release().await;
                result
            })
            .await
    }

    /// Run a statement and return the number of rows it changed.
    ///
    /// # Errors
    /// Returns the driver's error, or [`SqlExecutorError::Timeout`] past the deadline.
    pub async fn execute_non_query(
        &self,
        command: impl Into<Command>,
    ) -> Result<usize, SqlExecutorError> {
        let command = command.into();
        self.with_connection(&command, |conn, bound| {
            Box::pin(async move { conn.execute(&bound).await })
        })
        .await
    }

    /// First column of the first row, or `None` when the command returns no rows.
    ///
    /// A database `NULL` is returned as `Some(RowValues::Null)`.
    ///
    /// # Errors
    /// Returns the driver's error, or [`SqlExecutorError::Timeout`] past the deadline.
    pub async fn get_scalar(
        &self,
        command: impl Into<Command>,
    ) -> Result<Option<RowValues>, SqlExecutorError> {
        let command = command.into();
        self.with_connection(&command, |conn, bound| {
            Box::pin(async move {
                let row = conn.query_first(&bound).await?;
                Ok(row.and_then(|row| row.rows.into_iter().next()))
            })
        })
        .await
    }

    /// The scalar rendered as text; no rows and `NULL` both give an empty string.
    ///
    /// # Errors
    /// Returns the driver's error, or [`SqlExecutorError::Timeout`] past the deadline.
    pub async fn get_scalar_string(
        &self,
        command: impl Into<Command>,
    ) -> Result<String, SqlExecutorError> {
        Ok(self
            .get_scalar(command)
            .await?
            .map(|value| value.to_string())
            .unwrap_or_default())
    }

    /// Stream the command's rows; the cursor owns the connection until it is closed.
    ///
    /// # Errors
    /// Returns the driver's error, or [`SqlExecutorError::Timeout`] if the cursor could not
    /// be opened before the deadline. The deadline does not apply to reading rows.
    pub async fn execute_reader(
        &self,
        command: impl Into<Command>,
    ) -> Result<RowCursor, SqlExecutorError> {
        let command = command.into();
        self.diagnosed_command(&command)
            .run(async {
                let mut lazy = self.lazy();
                let (_, bound) = lazy
                    .bind(&command.text, command.mode, command.params.as_slice())
                    .await?;
                let conn = lazy.into_connection().ok_or_else(|| {
                    SqlExecutorError::ConnectionError("connection was not opened".to_string())
                })?;
                conn.open_cursor(bound).await
            })
            .await
    }

    /// Materialize the first result set.
    ///
    /// # Errors
    /// Returns the driver's error, or [`SqlExecutorError::Timeout`] past the deadline.
    pub async fn get_table(
        &self,
        command: impl Into<Command>,
    ) -> Result<ResultSet, SqlExecutorError> {
        let command = command.into();
        self.with_connection(&command, |conn, bound| {
            Box::pin(async move { conn.query(&bound).await })
        })
        .await
    }

    /// Materialize every result set the command produces.
    ///
    /// # Errors
    /// Returns the driver's error, or [`SqlExecutorError::Timeout`] past the deadline.
    pub async fn get_row_set(
        &self,
        command: impl Into<Command>,
    ) -> Result<RowSet, SqlExecutorError> {
        let command = command.into();
        self.with_connection(&command, |conn, bound| {
            Box::pin(async move { conn.query_sets(&bound).await })
        })
        .await
    }

    /// The first row of the first result set, or `None` when it is empty.
    ///
    /// # Errors
    /// Returns the driver's error, or [`SqlExecutorError::Timeout`] past the deadline.
    pub async fn get_first_row(
        &self,
        command: impl Into<Command>,
    ) -> Result<Option<CustomDbRow>, SqlExecutorError> {
        Ok(self.get_table(command).await?.into_first_row())
    }

    /// Call a stored procedure and return its output arguments by name.
    ///
    /// Output and input-output parameters are read back from the first row of the last
    /// result set the call produces, matching column names to parameter names without
    /// regard to sigil or case. Keys are the parameter names as given; an output the call
    /// did not return maps to [`RowValues::Null`].
    ///
    /// # Errors
    /// Returns [`SqlExecutorError::Unimplemented`] on backends without procedures, or the
    /// driver's error.
    pub async fn execute_procedure(
        &self,
        name: &str,
        params: impl Into<NamedParams>,
    ) -> Result<HashMap<String, RowValues>, SqlExecutorError> {
        let command = Command::procedure(name).params(params);
        self.execute_procedure_command(command).await
    }

    /// [`execute_procedure`](Self::execute_procedure) for a prepared procedure command,
    /// keeping its deadline.
    ///
    /// # Errors
    /// As [`execute_procedure`](Self::execute_procedure).
    pub async fn execute_procedure_command(
        &self,
        command: Command,
    ) -> Result<HashMap<String, RowValues>, SqlExecutorError> {
        let command = command.mode(crate::types::CommandMode::StoredProcedure);
        let outputs: Vec<String> = command
            .params
            .iter()
            .filter(|p| p.direction.is_output())
            .map(|p| p.name.clone())
            .collect();

        self.with_connection(&command, move |conn, bound| {
            Box::pin(async move {
                if outputs.is_empty() {
                    conn.execute(&bound).await?;
                    return Ok(HashMap::new());
                }
                let set = conn.query_sets(&bound).await?;
                Ok(read_outputs(&outputs, &set))
            })
        })
        .await
    }

    /// Run each statement in order inside one transaction.
    ///
    /// # Errors
    /// Returns the first failing statement's error after rolling the transaction back.
    pub async fn execute_statement_list<I, S>(
        &self,
        statements: I,
    ) -> Result<BatchOutcome, SqlExecutorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut batch = self.begin_batch();
        for statement in statements {
            batch.register(statement, NamedParams::new());
        }
        batch.flush().await
    }

    /// Start accumulating statements for one transaction.
    #[must_use]
    pub fn begin_batch(&self) -> TransactionBatch<'_> {
        TransactionBatch::new(self)
    }

    /// Release the executor. Connections are per operation, so there is nothing left open.
    pub fn close(self) {
        tracing::debug!(backend = %self.kind(), "executor closed");
    }
}

impl fmt::Debug for SqlExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlExecutor")
            .field("backend", &self.backend)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn read_outputs(outputs: &[String], set: &RowSet) -> HashMap<String, RowValues> {
    let row = set.tables.last().and_then(ResultSet::first);
    outputs
        .iter()
        .map(|name| {
            let value = row
                .and_then(|row| row.get(bare_name(name)))
                .cloned()
                .unwrap_or(RowValues::Null);
            (name.clone(), value)
        })
        .collect()
}
