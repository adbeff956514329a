use std::sync::Arc;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use tiberius::{Client, Config, Query, SqlBrowser};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::params::{at_name, bind_query_params, exec_text};
use super::query::{build_row_set, extract_row};
use crate::backend::{Backend, Connection};
use crate::command::BoundCommand;
use crate::cursor::{CURSOR_BUFFER, ChannelSource, RowCursor};
use crate::error::SqlExecutorError;
use crate::params::Parameter;
use crate::results::{ResultSet, RowSet};
use crate::translation::PlaceholderStyle;
use crate::types::{BackendKind, RowValues};

/// Type alias for SQL Server client
pub type MssqlClient = Client<Compat<TcpStream>>;

type RowSender = mpsc::Sender<Result<Vec<RowValues>, SqlExecutorError>>;

/// The server-SQL backend: SQL Server over TDS via tiberius.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlBackend;

#[async_trait]
impl Backend for MssqlBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::SqlServer
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::AtP
    }

    fn create_parameter(&self, mut param: Parameter) -> Parameter {
        param.name = at_name(&param.name);
        param
    }

    fn procedure_text(&self, name: &str, params: &[Parameter]) -> Result<String, SqlExecutorError> {
        Ok(exec_text(name, params))
    }

    async fn connect(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn Connection>, SqlExecutorError> {
        let config = Config::from_ado_string(connection_string)?;
        let client = create_mssql_client(config).await?;
        Ok(Box::new(MssqlConnection { client }))
    }
}

/// Connect with a parsed config, resolving named instances through SQL Browser and
/// following one server redirect.
///
/// # Errors
/// Returns the driver or socket error if the server cannot be reached.
pub async fn create_mssql_client(mut config: Config) -> Result<MssqlClient, SqlExecutorError> {
    let tcp = TcpStream::connect_named(&config).await?;
    tcp.set_nodelay(true)?;

    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        Err(tiberius::error::Error::Routing { host, port }) => {
            tracing::debug!(%host, port, "SQL Server redirected the connection");
            config.host(&host);
            config.port(port);
            let tcp = TcpStream::connect(config.get_addr()).await?;
            tcp.set_nodelay(true)?;
            Ok(Client::connect(config, tcp.compat_write()).await?)
        }
        Err(err) => Err(err.into()),
    }
}

/// One SQL Server session.
pub struct MssqlConnection {
    client: MssqlClient,
}

impl MssqlConnection {
    async fn run_sql(&mut self, sql: &str) -> Result<(), SqlExecutorError> {
        Query::new(sql).execute(&mut self.client).await?;
        Ok(())
    }
}

#[async_trait]
impl Connection for MssqlConnection {
    async fn execute(&mut self, command: &BoundCommand) -> Result<usize, SqlExecutorError> {
        let result = bind_query_params(&command.text, &command.params)
            .execute(&mut self.client)
            .await?;
        usize::try_from(result.total()).map_err(|e| {
            SqlExecutorError::ExecutionError(format!(
                "SQL Server affected rows conversion error: {e}"
            ))
        })
    }

    async fn query(&mut self, command: &BoundCommand) -> Result<ResultSet, SqlExecutorError> {
        let set = self.query_sets(command).await?;
        Ok(set.tables.into_iter().next().unwrap_or_default())
    }

    async fn query_sets(&mut self, command: &BoundCommand) -> Result<RowSet, SqlExecutorError> {
        let stream = bind_query_params(&command.text, &command.params)
            .query(&mut self.client)
            .await?;
        build_row_set(stream).await
    }

    async fn open_cursor(
        self: Box<Self>,
        command: BoundCommand,
    ) -> Result<RowCursor, SqlExecutorError> {
        let MssqlConnection { mut client } = *self;
        let (head_tx, head_rx) = oneshot::channel();
        let (rows_tx, rows_rx) = mpsc::channel(CURSOR_BUFFER);
        let (closed_tx, closed_rx) = oneshot::channel();

        tokio::spawn(async move {
            stream_rows(&mut client, &command, head_tx, &rows_tx).await;
            if let Err(err) = client.close().await {
                tracing::debug!(error = %err, "SQL Server connection did not close cleanly");
            }
            let _ = closed_tx.send(());
        });

        let columns = head_rx.await.map_err(|_| {
            SqlExecutorError::ConnectionError("SQL Server cursor task ended early".to_string())
        })??;
        Ok(RowCursor::new(
            columns,
            Box::new(ChannelSource::new(rows_rx, closed_rx)),
        ))
    }

    async fn begin(&mut self) -> Result<(), SqlExecutorError> {
        self.run_sql("BEGIN TRANSACTION").await
    }

    async fn commit(&mut self) -> Result<(), SqlExecutorError> {
        self.run_sql("COMMIT TRANSACTION").await
    }

    async fn rollback(&mut self) -> Result<(), SqlExecutorError> {
        self.run_sql("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await
    }

    async fn close(self: Box<Self>) {
        if let Err(err) = self.client.close().await {
            tracing::debug!(error = %err, "SQL Server connection did not close cleanly");
        }
    }
}

/// Forward rows from every result set until the receiver goes away.
async fn stream_rows(
    client: &mut MssqlClient,
    command: &BoundCommand,
    head: oneshot::Sender<Result<Arc<Vec<String>>, SqlExecutorError>>,
    rows: &RowSender,
) {
    let mut stream = match bind_query_params(&command.text, &command.params)
        .query(client)
        .await
    {
        Ok(stream) => stream,
        Err(err) => {
            let _ = head.send(Err(err.into()));
            return;
        }
    };
    let names: Vec<String> = match stream.columns().await {
        Ok(columns) => columns
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default(),
        Err(err) => {
            let _ = head.send(Err(err.into()));
            return;
        }
    };
    if head.send(Ok(Arc::new(names))).is_err() {
        return;
    }

    let mut row_stream = stream.into_row_stream();
    loop {
        let item = match row_stream.try_next().await {
            Ok(Some(row)) => extract_row(&row),
            Ok(None) => break,
            Err(err) => Err(err.into()),
        };
        let failed = item.is_err();
        if rows.send(item).await.is_err() || failed {
            break;
        }
    }
}
