use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::config::SqliteOptions;
use super::query::{
    build_result_set, build_row_set, column_names, execute_all, execute_bound, extract_row,
    prepare_bound,
};
use crate::backend::{Backend, Connection};
use crate::command::BoundCommand;
use crate::cursor::{CURSOR_BUFFER, ChannelSource, RowCursor};
use crate::error::SqlExecutorError;
use crate::params::Parameter;
use crate::results::{CustomDbRow, ResultSet, RowSet};
use crate::translation::PlaceholderStyle;
use crate::types::{BackendKind, RowValues};
use crate::worker::BlockingWorker;

static NEXT_WORKER: AtomicU64 = AtomicU64::new(1);

type RowSender = mpsc::Sender<Result<Vec<RowValues>, SqlExecutorError>>;

/// The embedded-file backend: `SQLite` via rusqlite.
///
/// rusqlite handles are blocking and not `Sync`, so each session lives on its own worker
/// thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteBackend;

#[async_trait]
impl Backend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Native
    }

    fn procedure_text(&self, name: &str, _params: &[Parameter]) -> Result<String, SqlExecutorError> {
        Err(SqlExecutorError::Unimplemented(format!(
            "SQLite has no stored procedures (called {name})"
        )))
    }

    async fn connect(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn Connection>, SqlExecutorError> {
        let options = SqliteOptions::parse(connection_string)?;
        let conn = SqliteConnection::open(options).await?;
        Ok(Box::new(conn))
    }
}

/// One `SQLite` session owned by a worker thread.
#[derive(Debug)]
pub struct SqliteConnection {
    worker: BlockingWorker<rusqlite::Connection>,
}

impl SqliteConnection {
    /// Open the database on a fresh worker thread.
    ///
    /// # Errors
    /// Returns the rusqlite error if the file cannot be opened.
    pub async fn open(options: SqliteOptions) -> Result<Self, SqlExecutorError> {
        let id = NEXT_WORKER.fetch_add(1, Ordering::Relaxed);
        let worker =
            BlockingWorker::spawn(format!("sqlite-worker-{id}"), move || options.open()).await?;
        Ok(Self { worker })
    }

    async fn run_sql(&self, sql: &'static str) -> Result<(), SqlExecutorError> {
        self.worker
            .run(move |conn| Ok(conn.execute_batch(sql)?))
            .await
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn execute(&mut self, command: &BoundCommand) -> Result<usize, SqlExecutorError> {
        let command = command.clone();
        self.worker
            .run(move |conn| {
                if command.params.is_empty() {
                    return execute_all(conn, &command.text);
                }
                let mut stmt = prepare_bound(conn, &command)?;
                execute_bound(conn, &mut stmt)
            })
            .await
    }

    async fn query(&mut self, command: &BoundCommand) -> Result<ResultSet, SqlExecutorError> {
        let command = command.clone();
        self.worker
            .run(move |conn| {
                let mut stmt = prepare_bound(conn, &command)?;
                build_result_set(&mut stmt)
            })
            .await
    }

    async fn query_sets(&mut self, command: &BoundCommand) -> Result<RowSet, SqlExecutorError> {
        let command = command.clone();
        self.worker
            .run(move |conn| build_row_set(conn, &command))
            .await
    }

    async fn query_first(
        &mut self,
        command: &BoundCommand,
    ) -> Result<Option<CustomDbRow>, SqlExecutorError> {
        let command = command.clone();
        self.worker
            .run(move |conn| {
                let mut stmt = prepare_bound(conn, &command)?;
                let names = column_names(&stmt);
                let col_count = names.len();
                let mut rows = stmt.raw_query();
                match rows.next()? {
                    Some(row) => Ok(Some(CustomDbRow::new(names, extract_row(row, col_count)?))),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn open_cursor(
        self: Box<Self>,
        command: BoundCommand,
    ) -> Result<RowCursor, SqlExecutorError> {
        let (head_tx, head_rx) = oneshot::channel();
        let (rows_tx, rows_rx) = mpsc::channel(CURSOR_BUFFER);
        self.worker
            .submit(move |conn| stream_rows(conn, &command, head_tx, &rows_tx))?;
        let closed = self.worker.into_closed();

        let columns = head_rx.await.map_err(|_| {
            SqlExecutorError::ConnectionError("SQLite worker stopped before reading".to_string())
        })??;
        Ok(RowCursor::new(
            columns,
            Box::new(ChannelSource::new(rows_rx, closed)),
        ))
    }

    async fn begin(&mut self) -> Result<(), SqlExecutorError> {
        self.run_sql("BEGIN").await
    }

    async fn commit(&mut self) -> Result<(), SqlExecutorError> {
        self.run_sql("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), SqlExecutorError> {
        self.run_sql("ROLLBACK").await
    }

    async fn close(self: Box<Self>) {
        self.worker.shutdown().await;
    }
}

/// Runs on the worker thread; the receiver going away stops the scan.
fn stream_rows(
    conn: &mut rusqlite::Connection,
    command: &BoundCommand,
    head: oneshot::Sender<Result<Arc<Vec<String>>, SqlExecutorError>>,
    rows: &RowSender,
) {
    let mut stmt = match prepare_bound(conn, command) {
        Ok(stmt) => stmt,
        Err(err) => {
            let _ = head.send(Err(err));
            return;
        }
    };
    let names = column_names(&stmt);
    let col_count = names.len();
    if head.send(Ok(names)).is_err() {
        return;
    }

    let mut cursor = stmt.raw_query();
    loop {
        let item = match cursor.next() {
            Ok(Some(row)) => extract_row(row, col_count),
            Ok(None) => break,
            Err(err) => Err(err.into()),
        };
        let failed = item.is_err();
        if rows.blocking_send(item).is_err() || failed {
            break;
        }
    }
}
