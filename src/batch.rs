//! Statements accumulated for one all-or-nothing transaction.

use std::time::Duration;

use crate::command::LazyConnection;
use crate::error::SqlExecutorError;
use crate::executor::SqlExecutor;
use crate::params::{NamedParams, Parameter};
use crate::types::CommandMode;

const COMPONENT: &str = "sql_executor::batch";

/// One registered statement with its parameters already in backend-native form.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingStatement {
    pub text: String,
    pub params: Vec<Parameter>,
}

/// What a flush did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every statement ran and the transaction committed.
    Committed { statements: usize },
    /// Nothing was registered, so no connection was opened.
    Empty,
}

impl BatchOutcome {
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, BatchOutcome::Committed { .. })
    }
}

/// Statements registered now and run later inside a single transaction.
///
/// Each statement keeps its own parameter list. [`flush`](Self::flush) runs them in
/// registration order on one connection and commits; if any statement fails, the
/// transaction is rolled back and nothing it did is kept. The accumulator is emptied by
/// every flush, successful or not.
///
/// ```rust,no_run
/// use sql_executor::prelude::*;
///
/// # async fn demo(executor: &SqlExecutor) -> Result<(), SqlExecutorError> {
/// let mut batch = executor.begin_batch();
/// batch
///     .register("insert into t (id) values (@id)", [("@id", 1)])
///     .register("insert into t (id) values (@id)", [("@id", 2)]);
/// assert_eq!(batch.flush().await?, BatchOutcome::Committed { statements: 2 });
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TransactionBatch<'e> {
    executor: &'e SqlExecutor,
    pending: Vec<PendingStatement>,
}

impl<'e> TransactionBatch<'e> {
    pub(crate) fn new(executor: &'e SqlExecutor) -> Self {
        Self {
            executor,
            pending: Vec::new(),
        }
    }

    /// Queue a statement. Its parameters are converted to the backend's form now.
    pub fn register(
        &mut self,
        text: impl Into<String>,
        params: impl Into<NamedParams>,
    ) -> &mut Self {
        let backend = self.executor.backend();
        let params = params
            .into()
            .into_iter()
            .map(|p| backend.create_parameter(p))
            .collect();
        self.pending.push(PendingStatement {
            text: text.into(),
            params,
        });
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn statements(&self) -> &[PendingStatement] {
        &self.pending
    }

    /// Run every queued statement in one transaction, then clear the queue.
    ///
    /// # Errors
    /// Returns the error of the statement (or the begin/commit) that failed, after rolling
    /// back. A failed rollback is logged; the original error is still the one returned.
    pub async fn flush(&mut self) -> Result<BatchOutcome, SqlExecutorError> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            tracing::debug!("transaction batch is empty; nothing to flush");
            return Ok(BatchOutcome::Empty);
        }

        let statements = pending.len();
        let result = match self.executor.timeout() {
            Some(limit) => tokio::time::timeout(limit, self.run(&pending))
                .await
                .unwrap_or_else(|_| Err(self.report_timeout(limit, &pending))),
            None => self.run(&pending).await,
        };
        result?;
        tracing::debug!(statements, "transaction batch committed");
        Ok(BatchOutcome::Committed { statements })
    }

    async fn run(&self, pending: &[PendingStatement]) -> Result<(), SqlExecutorError> {
        let mut lazy = self.executor.lazy();

        let begun: Result<(), SqlExecutorError> = async { lazy.open().await?.begin().await }.await;
        if let Err(err) = begun {
            self.report(&err, "BEGIN TRANSACTION", &[]);
            lazy.release().await;
            return Err(err);
        }

        for statement in pending {
            let step: Result<usize, SqlExecutorError> = async {
                let (conn, bound) = lazy
                    .bind(&statement.text, CommandMode::Text, &statement.params)
                    .await?;
                conn.execute(&bound).await
            }
            .await;
            if let Err(err) = step {
                roll_back(&mut lazy).await;
                self.report(&err, &statement.text, &statement.params);
                lazy.release().await;
                return Err(err);
            }
        }

        let committed = match lazy.opened() {
            Some(conn) => conn.commit().await,
            None => Ok(()),
        };
        if let Err(err) = committed {
            roll_back(&mut lazy).await;
            self.report(&err, "COMMIT TRANSACTION", &[]);
            lazy.release().await;
            return Err(err);
        }

        lazy.release().await;
        Ok(())
    }

    fn report(&self, err: &SqlExecutorError, text: &str, params: &[Parameter]) {
        self.executor
            .diagnosed(COMPONENT, text, params, None)
            .report(err);
    }

    /// Dropping the timed-out flush drops its connection, which ends the open transaction.
    fn report_timeout(&self, limit: Duration, pending: &[PendingStatement]) -> SqlExecutorError {
        let err = SqlExecutorError::Timeout(limit);
        let text = pending
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(";\n");
        self.report(&err, &text, &[]);
        err
    }
}

async fn roll_back(lazy: &mut LazyConnection<'_>) {
    if let Some(conn) = lazy.opened()
        && let Err(err) = conn.rollback().await
    {
        tracing::warn!(error = %err, "rollback after a failed batch statement also failed");
    }
}
