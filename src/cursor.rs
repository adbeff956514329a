//! Forward-only streaming over a command's rows.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(any(feature = "sqlite", feature = "mssql", feature = "odbc"))]
use tokio::sync::{mpsc, oneshot};

use crate::error::SqlExecutorError;
use crate::results::{CustomDbRow, ResultSet};
use crate::types::RowValues;

/// Rows buffered between a driver and a [`RowCursor`] before the producer waits.
#[cfg(any(feature = "sqlite", feature = "mssql", feature = "odbc"))]
pub(crate) const CURSOR_BUFFER: usize = 64;

/// Where a cursor's rows come from.
///
/// A source owns the connection it reads from; `close` must release it.
#[async_trait]
pub trait RowSource: Send {
    /// The next row's values, or `None` once the results are exhausted.
    async fn next_row(&mut self) -> Result<Option<Vec<RowValues>>, SqlExecutorError>;

    /// Stop reading and release the underlying connection.
    async fn close(self: Box<Self>);
}

/// A forward-only cursor that owns its connection.
///
/// The connection is released when the rows run out, when [`RowCursor::close`] is awaited,
/// or when the cursor is dropped.
///
/// ```rust,no_run
/// # use sql_executor::prelude::*;
/// # async fn demo(executor: &SqlExecutor) -> Result<(), SqlExecutorError> {
/// let mut cursor = executor.execute_reader("select id, name from users").await?;
/// while let Some(row) = cursor.next().await? {
///     println!("{:?} {:?}", row.get("id"), row.get("name"));
/// }
/// cursor.close().await;
/// # Ok(())
/// # }
/// ```
pub struct RowCursor {
    layout: ResultSet,
    source: Option<Box<dyn RowSource>>,
}

impl RowCursor {
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, source: Box<dyn RowSource>) -> Self {
        let mut layout = ResultSet::default();
        layout.set_column_names(column_names);
        Self {
            layout,
            source: Some(source),
        }
    }

    /// Column names of the rows this cursor yields.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        self.layout
            .get_column_names()
            .map_or(&[][..], |names| names.as_slice())
    }

    /// Whether the connection has been released.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    /// Advance to the next row.
    ///
    /// # Errors
    /// Returns the driver's error; the cursor is closed before the error is returned.
    pub async fn next(&mut self) -> Result<Option<CustomDbRow>, SqlExecutorError> {
        let Some(source) = self.source.as_mut() else {
            return Ok(None);
        };
        match source.next_row().await {
            Ok(Some(values)) => Ok(self.layout.make_row(values)),
            Ok(None) => {
                self.close_source().await;
                Ok(None)
            }
            Err(err) => {
                self.close_source().await;
                Err(err)
            }
        }
    }

    /// Read every remaining row into a table.
    ///
    /// # Errors
    /// Returns the first driver error encountered.
    pub async fn collect(mut self) -> Result<ResultSet, SqlExecutorError> {
        let mut table = ResultSet::with_capacity(16);
        if let Some(names) = self.layout.get_column_names() {
            table.set_column_names(Arc::clone(names));
        }
        while let Some(row) = self.next().await? {
            table.add_row(row);
        }
        Ok(table)
    }

    /// Release the connection without reading further rows.
    pub async fn close(mut self) {
        self.close_source().await;
    }

    async fn close_source(&mut self) {
        if let Some(source) = self.source.take() {
            source.close().await;
            tracing::debug!("cursor closed");
        }
    }
}

impl fmt::Debug for RowCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowCursor")
            .field("columns", &self.columns())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Rows pushed by a producer that holds the connection on another task or thread.
///
/// Dropping the receiver tells the producer to stop; `closed` resolves once it has let go of
/// the connection.
#[cfg(any(feature = "sqlite", feature = "mssql", feature = "odbc"))]
pub(crate) struct ChannelSource {
    rows: mpsc::Receiver<Result<Vec<RowValues>, SqlExecutorError>>,
    closed: oneshot::Receiver<()>,
}

#[cfg(any(feature = "sqlite", feature = "mssql", feature = "odbc"))]
impl ChannelSource {
    pub(crate) fn new(
        rows: mpsc::Receiver<Result<Vec<RowValues>, SqlExecutorError>>,
        closed: oneshot::Receiver<()>,
    ) -> Self {
        Self { rows, closed }
    }
}

#[cfg(any(feature = "sqlite", feature = "mssql", feature = "odbc"))]
#[async_trait]
impl RowSource for ChannelSource {
    async fn next_row(&mut self) -> Result<Option<Vec<RowValues>>, SqlExecutorError> {
        self.rows.recv().await.transpose()
    }

    async fn close(self: Box<Self>) {
        let ChannelSource { rows, closed } = *self;
        drop(rows);
        let _ = closed.await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    struct VecSource {
        rows: Mutex<Vec<Result<Vec<RowValues>, SqlExecutorError>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl RowSource for VecSource {
        async fn next_row(&mut self) -> Result<Option<Vec<RowValues>>, SqlExecutorError> {
            let mut rows = self.rows.lock().unwrap();
            if rows.is_empty() {
                Ok(None)
            } else {
                rows.remove(0).map(Some)
            }
        }

        async fn close(self: Box<Self>) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn cursor(rows: Vec<Result<Vec<RowValues>, SqlExecutorError>>) -> (RowCursor, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        let source = VecSource {
            rows: Mutex::new(rows),
            closed: Arc::clone(&closed),
        };
        let names = Arc::new(vec!["id".to_string()]);
        (RowCursor::new(names, Box::new(source)), closed)
    }

    #[tokio::test]
    async fn exhaustion_releases_the_source() {
        let (mut cur, closed) = cursor(vec![Ok(vec![RowValues::Int(1)]), Ok(vec![RowValues::Int(2)])]);
        assert_eq!(cur.columns(), ["id".to_string()]);
        let first = cur.next().await.unwrap().unwrap();
        assert_eq!(first.get("id"), Some(&RowValues::Int(1)));
        assert!(!closed.load(Ordering::SeqCst));
        assert!(cur.next().await.unwrap().is_some());
        assert!(cur.next().await.unwrap().is_none());
        assert!(closed.load(Ordering::SeqCst));
        assert!(cur.is_closed());
        assert!(cur.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn errors_close_the_cursor() {
        let (mut cur, closed) = cursor(vec![Err(SqlExecutorError::ExecutionError("bad row".into()))]);
        assert!(cur.next().await.is_err());
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn early_close_releases_the_source() {
        let (cur, closed) = cursor(vec![Ok(vec![RowValues::Int(1)])]);
        cur.close().await;
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn collect_materializes_remaining_rows() {
        let (cur, _) = cursor(vec![Ok(vec![RowValues::Int(1)]), Ok(vec![RowValues::Int(2)])]);
        let table = cur.collect().await.unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.results[1].get("id"), Some(&RowValues::Int(2)));
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn channel_source_waits_for_the_producer_to_let_go() {
        let (tx, rx) = mpsc::channel(CURSOR_BUFFER);
        let (closed_tx, closed_rx) = oneshot::channel();
        let producer = tokio::spawn(async move {
            let mut n = 0;
            while tx.send(Ok(vec![RowValues::Int(n)])).await.is_ok() {
                n += 1;
            }
            let _ = closed_tx.send(());
        });
        let mut cur = RowCursor::new(
            Arc::new(vec!["n".to_string()]),
            Box::new(ChannelSource::new(rx, closed_rx)),
        );
        assert_eq!(
            cur.next().await.unwrap().unwrap().get("n"),
            Some(&RowValues::Int(0))
        );
        cur.close().await;
        producer.await.unwrap();
    }
}
