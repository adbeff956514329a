//! Failure reporting.
//!
//! Every failed operation is formatted with its command text and parameter values and handed
//! to a [`FailureSink`] before the original error is returned to the caller. The executor adds
//! diagnostics only; it never retries or swallows a failure.

use std::fmt::Write as _;
use std::future::Future;
use std::time::Duration;

use crate::error::SqlExecutorError;
use crate::params::Parameter;

/// Destination for formatted failure diagnostics.
///
/// Implementations must not fail or block for long; the call is fire-and-forget.
pub trait FailureSink: Send + Sync {
    fn record_failure(&self, message: &str, component: &str);
}

/// Default sink: emits each failure as a `tracing` error event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl FailureSink for TracingSink {
    fn record_failure(&self, message: &str, component: &str) {
        tracing::error!(component, "{message}");
    }
}

/// Render an error with the command text and each parameter as `name = value`.
///
/// ```rust
/// use sql_executor::prelude::*;
/// use sql_executor::diagnostics::format_failure;
///
/// let err = SqlExecutorError::ExecutionError("no such column: b".into());
/// let params = NamedParams::new().with("a", 1);
/// let text = format_failure(&err, "select b from t where a = :a", params.as_slice());
/// assert_eq!(
///     text,
///     "SQL execution error: no such column: b\nCommandText: select b from t where a = :a\nParams: a = 1\n"
/// );
/// ```
#[must_use]
pub fn format_failure(error: &SqlExecutorError, command_text: &str, params: &[Parameter]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{error}");
    let _ = writeln!(out, "CommandText: {command_text}");
    for param in params {
        let _ = writeln!(out, "Params: {} = {}", param.name, param.value);
    }
    out
}

/// What a diagnosed operation was running, for the failure report.
pub(crate) struct Diagnosed<'a> {
    pub(crate) sink: &'a dyn FailureSink,
    pub(crate) component: &'a str,
    pub(crate) command_text: &'a str,
    pub(crate) params: &'a [Parameter],
    pub(crate) timeout: Option<Duration>,
}

impl Diagnosed<'_> {
    /// Run `operation` under the deadline, reporting any failure before returning it.
    pub(crate) async fn run<T, F>(self, operation: F) -> Result<T, SqlExecutorError>
    where
        F: Future<Output = Result<T, SqlExecutorError>>,
    {
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, operation)
                .await
                .unwrap_or(Err(SqlExecutorError::Timeout(limit))),
            None => operation.await,
        };
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    pub(crate) fn report(&self, error: &SqlExecutorError) {
        let message = format_failure(error, self.command_text, self.params);
        self.sink.record_failure(&message, self.component);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::params::NamedParams;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, String)>>);

    impl FailureSink for Recorder {
        fn record_failure(&self, message: &str, component: &str) {
            self.0
                .lock()
                .unwrap()
                .push((message.to_string(), component.to_string()));
        }
    }

    #[test]
    fn formats_every_parameter() {
        let params = NamedParams::new()
            .with("@name", "ada")
            .with("@missing", None::<i64>);
        let text = format_failure(
            &SqlExecutorError::Other("boom".into()),
            "insert into t values (@name, @missing)",
            params.as_slice(),
        );
        assert!(text.starts_with("Other database error: boom\n"));
        assert!(text.contains("Params: @name = ada\n"));
        assert!(text.ends_with("Params: @missing = \n"));
    }

    #[tokio::test]
    async fn failures_are_reported_then_returned() {
        let sink = Recorder::default();
        let res: Result<(), _> = Diagnosed {
            sink: &sink,
            component: "test",
            command_text: "select 1",
            params: &[],
            timeout: None,
        }
        .run(async { Err(SqlExecutorError::ExecutionError("bad".into())) })
        .await;

        assert!(matches!(res, Err(SqlExecutorError::ExecutionError(ref m)) if m == "bad"));
        let recorded = sink.0.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].1, "test");
        assert!(recorded[0].0.contains("CommandText: select 1"));
    }

    #[tokio::test]
    async fn successes_are_not_reported() {
        let sink = Recorder::default();
        let value = Diagnosed {
            sink: &sink,
            component: "test",
            command_text: "select 1",
            params: &[],
            timeout: Some(Duration::from_secs(5)),
        }
        .run(async { Ok(1) })
        .await
        .unwrap();
        assert_eq!(value, 1);
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_is_a_timeout() {
        let sink = Recorder::default();
        let res: Result<(), _> = Diagnosed {
            sink: &sink,
            component: "test",
            command_text: "waitfor delay '00:01'",
            params: &[],
            timeout: Some(Duration::from_millis(50)),
        }
        .run(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert!(matches!(res, Err(SqlExecutorError::Timeout(_))));
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }
}
