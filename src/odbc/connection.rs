use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use odbc_api::{ConnectionOptions, Cursor, Environment};
use tokio::sync::{mpsc, oneshot};

use super::params::Params;
use super::query::{describe, extract_row, read_table};
use crate::backend::{Backend, Connection};
use crate::command::BoundCommand;
use crate::cursor::{CURSOR_BUFFER, ChannelSource, RowCursor};
use crate::error::SqlExecutorError;
use crate::params::Parameter;
use crate::results::{ResultSet, RowSet};
use crate::translation::PlaceholderStyle;
use crate::types::{BackendKind, RowValues};
use crate::worker::BlockingWorker;

type OdbcConnection = odbc_api::Connection<'static>;
type RowSender = mpsc::Sender<Result<Vec<RowValues>, SqlExecutorError>>;

static NEXT_WORKER: AtomicU64 = AtomicU64::new(1);

fn environment() -> Result<&'static Environment, SqlExecutorError> {
    static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();
    if let Some(env) = ENVIRONMENT.get() {
        return Ok(env);
    }
    let env = Environment::new()?;
    Ok(ENVIRONMENT.get_or_init(|| env))
}

/// Backends reached through an ODBC driver manager: plain ODBC DSNs, OLE DB sources and
/// Oracle, each through its own ODBC driver.
#[derive(Debug, Clone, Copy)]
pub struct OdbcBackend {
    kind: BackendKind,
}

impl OdbcBackend {
    #[must_use]
    pub fn new(kind: BackendKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl Backend for OdbcBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    /// The ODBC call escape; output arguments are not supported.
    fn procedure_text(&self, name: &str, params: &[Parameter]) -> Result<String, SqlExecutorError> {
        if let Some(out) = params.iter().find(|p| p.direction.is_output()) {
            return Err(SqlExecutorError::Unimplemented(format!(
                "output parameter {} is not supported over ODBC",
                out.name
            )));
        }
        let markers = vec!["?"; params.len()].join(", ");
        Ok(format!("{{CALL {name}({markers})}}"))
    }

    async fn connect(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn Connection>, SqlExecutorError> {
        let connection_string = connection_string.to_string();
        let id = NEXT_WORKER.fetch_add(1, Ordering::Relaxed);
        let worker = BlockingWorker::spawn(format!("odbc-worker-{id}"), move || {
            let env = environment()?;
            Ok(env.connect_with_connection_string(
                &connection_string,
                ConnectionOptions::default(),
            )?)
        })
        .await?;
        Ok(Box::new(OdbcSession { worker }))
    }
}

/// One ODBC session owned by a worker thread.
#[derive(Debug)]
pub struct OdbcSession {
    worker: BlockingWorker<OdbcConnection>,
}

#[async_trait]
impl Connection for OdbcSession {
    async fn execute(&mut self, command: &BoundCommand) -> Result<usize, SqlExecutorError> {
        let command = command.clone();
        self.worker
            .run(move |conn| {
                let params = Params::convert(&command.params);
                let mut prepared = conn.prepare(&command.text)?;
                if let Some(mut cursor) = prepared.execute(params.as_slice())? {
                    while cursor.next_row()?.is_some() {}
                }
                Ok(prepared.row_count()?.unwrap_or(0))
            })
            .await
    }

    async fn query(&mut self, command: &BoundCommand) -> Result<ResultSet, SqlExecutorError> {
        let command = command.clone();
        self.worker
            .run(move |conn| {
                let params = Params::convert(&command.params);
                match conn.execute(&command.text, params.as_slice())? {
                    Some(mut cursor) => read_table(&mut cursor),
                    None => Ok(ResultSet::default()),
                }
            })
            .await
    }

    async fn query_sets(&mut self, command: &BoundCommand) -> Result<RowSet, SqlExecutorError> {
        let command = command.clone();
        self.worker
            .run(move |conn| {
                let params = Params::convert(&command.params);
                let mut set = RowSet::default();
                let mut next = conn.execute(&command.text, params.as_slice())?;
                while let Some(mut cursor) = next {
                    set.push(read_table(&mut cursor)?);
                    next = cursor.more_results()?;
                }
                Ok(set)
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
            SqlExecutorError::ConnectionError("ODBC worker stopped before reading".to_string())
        })??;
        Ok(RowCursor::new(
            columns,
            Box::new(ChannelSource::new(rows_rx, closed)),
        ))
    }

    async fn begin(&mut self) -> Result<(), SqlExecutorError> {
        self.worker
            .run(|conn| Ok(conn.set_autocommit(false)?))
            .await
    }

    async fn commit(&mut self) -> Result<(), SqlExecutorError> {
        self.worker
            .run(|conn| {
                conn.commit()?;
                Ok(conn.set_autocommit(true)?)
            })
            .await
    }

    async fn rollback(&mut self) -> Result<(), SqlExecutorError> {
        self.worker
            .run(|conn| {
                conn.rollback()?;
                Ok(conn.set_autocommit(true)?)
            })
            .await
    }

    async fn close(self: Box<Self>) {
        self.worker.shutdown().await;
    }
}

fn stream_rows(
    conn: &mut OdbcConnection,
    command: &BoundCommand,
    head: oneshot::Sender<Result<Arc<Vec<String>>, SqlExecutorError>>,
    rows: &RowSender,
) {
    let params = Params::convert(&command.params);
    let mut cursor = match conn.execute(&command.text, params.as_slice()) {
        Ok(Some(cursor)) => cursor,
        Ok(None) => {
            let _ = head.send(Ok(Arc::new(Vec::new())));
            return;
        }
        Err(err) => {
            let _ = head.send(Err(err.into()));
            return;
        }
    };
    let (names, kinds) = match describe(&mut cursor) {
        Ok(described) => described,
        Err(err) => {
            let _ = head.send(Err(err));
            return;
        }
    };
    if head.send(Ok(names)).is_err() {
        return;
    }

    let mut buf = Vec::new();
    loop {
        let item = match cursor.next_row() {
            Ok(Some(mut row)) => extract_row(&mut row, &kinds, &mut buf),
            Ok(None) => break,
            Err(err) => Err(err.into()),
        };
        let failed = item.is_err();
        if rows.blocking_send(item).is_err() || failed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn procedures_use_the_call_escape() {
        let backend = OdbcBackend::new(BackendKind::Oracle);
        let params = vec![Parameter::new("a", 1), Parameter::new("b", 2)];
        assert_eq!(
            backend.procedure_text("pkg.proc", &params).unwrap(),
            "{CALL pkg.proc(?, ?)}"
        );
        let params = vec![Parameter::output("total")];
        assert!(backend.procedure_text("pkg.proc", &params).is_err());
    }
}
