use std::pin::Pin;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, RowStream};

use super::params::Params;
use super::query::{
    affected_rows, build_result_set_from_statement, build_row_set_from_messages, extract_row,
    statement_columns,
};
use crate::backend::{Backend, Connection};
use crate::command::BoundCommand;
use crate::cursor::{RowCursor, RowSource};
use crate::error::SqlExecutorError;
use crate::params::Parameter;
use crate::results::{ResultSet, RowSet};
use crate::translation::PlaceholderStyle;
use crate::types::{BackendKind, RowValues};

/// The open-source-server backend: `PostgreSQL` via tokio-postgres.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresBackend;

#[async_trait]
impl Backend for PostgresBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    /// `CALL name(arg => $1, ...)`; output arguments come back as the call's single row.
    fn procedure_text(&self, name: &str, params: &[Parameter]) -> Result<String, SqlExecutorError> {
        let args: Vec<String> = params
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{} => ${}", p.bare_name(), i + 1))
            .collect();
        Ok(format!("CALL {name}({})", args.join(", ")))
    }

    async fn connect(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn Connection>, SqlExecutorError> {
        let (client, connection) = tokio_postgres::connect(connection_string, NoTls).await?;
        let driver = tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::warn!(error = %err, "postgres connection ended with an error");
            }
        });
        Ok(Box::new(PostgresConnection { client, driver }))
    }
}

/// One `PostgreSQL` session plus the task driving its socket.
pub struct PostgresConnection {
    client: Client,
    driver: JoinHandle<()>,
}

#[async_trait]
impl Connection for PostgresConnection {
    /// Parameterless text may hold several statements; it goes through the simple protocol
    /// and the counts of every statement are summed.
    async fn execute(&mut self, command: &BoundCommand) -> Result<usize, SqlExecutorError> {
        let rows = if command.params.is_empty() {
            let messages = self.client.simple_query(&command.text).await?;
            affected_rows(&messages)
        } else {
            let stmt = self.client.prepare(&command.text).await?;
            let params = Params::convert(&command.params);
            self.client.execute(&stmt, params.as_refs()).await?
        };
        usize::try_from(rows).map_err(|e| {
            SqlExecutorError::ExecutionError(format!(
                "postgres affected rows conversion error: {e}"
            ))
        })
    }

    async fn query(&mut self, command: &BoundCommand) -> Result<ResultSet, SqlExecutorError> {
        let stmt = self.client.prepare(&command.text).await?;
        let params = Params::convert(&command.params);
        let rows = self.client.query(&stmt, params.as_refs()).await?;
        build_result_set_from_statement(&stmt, &rows)
    }

    /// Without parameters the simple protocol runs every statement in the text; with them the
    /// extended protocol allows only one statement, so the result is a single table.
    async fn query_sets(&mut self, command: &BoundCommand) -> Result<RowSet, SqlExecutorError> {
        if command.params.is_empty() {
            let messages = self.client.simple_query(&command.text).await?;
            Ok(build_row_set_from_messages(&messages))
        } else {
            Ok(self.query(command).await?.into())
        }
    }

    async fn open_cursor(
        self: Box<Self>,
        command: BoundCommand,
    ) -> Result<RowCursor, SqlExecutorError> {
        let PostgresConnection { client, driver } = *self;
        let stmt = client.prepare(&command.text).await?;
        let columns = statement_columns(&stmt);
        let stream = client
            .query_raw(&stmt, command.params.iter().map(|p| &p.value))
            .await?;
        Ok(RowCursor::new(
            columns,
            Box::new(PgRowSource {
                stream: Box::pin(stream),
                client,
                driver,
            }),
        ))
    }

    async fn begin(&mut self) -> Result<(), SqlExecutorError> {
        Ok(self.client.batch_execute("BEGIN").await?)
    }

    async fn commit(&mut self) -> Result<(), SqlExecutorError> {
        Ok(self.client.batch_execute("COMMIT").await?)
    }

    async fn rollback(&mut self) -> Result<(), SqlExecutorError> {
        Ok(self.client.batch_execute("ROLLBACK").await?)
    }

    async fn close(self: Box<Self>) {
        let PostgresConnection { client, driver } = *self;
        drop(client);
        let _ = driver.await;
    }
}

struct PgRowSource {
    stream: Pin<Box<RowStream>>,
    client: Client,
    driver: JoinHandle<()>,
}

#[async_trait]
impl RowSource for PgRowSource {
    async fn next_row(&mut self) -> Result<Option<Vec<RowValues>>, SqlExecutorError> {
        match self.stream.try_next().await? {
            Some(row) => Ok(Some(extract_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn close(self: Box<Self>) {
        let PgRowSource {
            stream,
            client,
            driver,
        } = *self;
        drop(stream);
        drop(client);
        let _ = driver.await;
    }
}
