use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use tokio::sync::oneshot;

use crate::error::SqlExecutorError;

type Job<C> = Box<dyn FnOnce(&mut C) + Send>;

/// A synchronous driver connection owned by a dedicated thread.
///
/// Jobs run one at a time, in submission order, against the connection. The connection is
/// opened on the worker thread and never leaves it, so drivers whose handles are not `Send`
/// can still be used from async code. Dropping the last handle ends the thread, which closes
/// the connection.
pub(crate) struct BlockingWorker<C: 'static> {
    sender: Sender<Job<C>>,
    closed: oneshot::Receiver<()>,
    name: String,
}

impl<C: 'static> BlockingWorker<C> {
    /// Spawn the worker thread and open the connection on it.
    ///
    /// # Errors
    /// Returns the error produced by `open`, or [`SqlExecutorError::ConnectionError`] if the
    /// thread cannot be spawned.
    pub(crate) async fn spawn<F>(name: String, open: F) -> Result<Self, SqlExecutorError>
    where
        F: FnOnce() -> Result<C, SqlExecutorError> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel::<Job<C>>();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (closed_tx, closed_rx) = oneshot::channel();

        thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker(open, &receiver, ready_tx, closed_tx))
            .map_err(|err| {
                SqlExecutorError::ConnectionError(format!(
                    "failed to spawn worker thread {name}: {err}"
                ))
            })?;

        ready_rx.await.map_err(|_| {
            SqlExecutorError::ConnectionError(format!("worker {name} exited while connecting"))
        })??;

        tracing::debug!(worker = %name, "connection opened on worker thread");
        Ok(Self {
            sender,
            closed: closed_rx,
            name,
        })
    }

    /// Queue a job without waiting for it.
    ///
    /// # Errors
    /// Returns [`SqlExecutorError::ConnectionError`] if the worker has already stopped.
    pub(crate) fn submit<F>(&self, job: F) -> Result<(), SqlExecutorError>
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.sender.send(Box::new(job)).map_err(|_| {
            SqlExecutorError::ConnectionError(format!("worker {} is closed", self.name))
        })
    }

    /// Run a job on the worker and wait for its result.
    ///
    /// # Errors
    /// Returns the job's own error, or [`SqlExecutorError::ConnectionError`] if the worker
    /// stopped before answering (for example because the job panicked).
    pub(crate) async fn run<F, R>(&self, job: F) -> Result<R, SqlExecutorError>
    where
        F: FnOnce(&mut C) -> Result<R, SqlExecutorError> + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.submit(move |conn| {
            let _ = tx.send(job(conn));
        })?;
        rx.await.map_err(|_| {
            SqlExecutorError::ConnectionError(format!(
                "worker {} dropped the command before answering",
                self.name
            ))
        })?
    }

    /// Stop accepting jobs and return a receiver that resolves once the connection is closed.
    pub(crate) fn into_closed(self) -> oneshot::Receiver<()> {
        let Self { sender, closed, .. } = self;
        drop(sender);
        closed
    }

    /// Stop the worker and wait until the connection is closed.
    pub(crate) async fn shutdown(self) {
        let name = self.name.clone();
        let _ = self.into_closed().await;
        tracing::debug!(worker = %name, "connection closed on worker thread");
    }
}

impl<C: 'static> fmt::Debug for BlockingWorker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingWorker")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn run_worker<C, F>(
    open: F,
    receiver: &Receiver<Job<C>>,
    ready: oneshot::Sender<Result<(), SqlExecutorError>>,
    closed: oneshot::Sender<()>,
) where
    F: FnOnce() -> Result<C, SqlExecutorError>,
{
    let mut conn = match open() {
        Ok(conn) => {
            let _ = ready.send(Ok(()));
            conn
        }
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    while let Ok(job) = receiver.recv() {
        job(&mut conn);
    }

    drop(conn);
    let _ = closed.send(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_jobs_in_order_on_one_connection() {
        let worker = BlockingWorker::spawn("test-worker".into(), || Ok(Vec::<u32>::new()))
            .await
            .unwrap();
        for i in 0..5 {
            worker.submit(move |log: &mut Vec<u32>| log.push(i)).unwrap();
        }
        let seen = worker.run(|log| Ok(log.clone())).await.unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        worker.shutdown().await;
    }

    #[tokio::test]
    async fn open_failure_is_returned() {
        let res = BlockingWorker::<()>::spawn("failing-worker".into(), || {
            Err(SqlExecutorError::ConnectionError("nope".into()))
        })
        .await;
        assert!(matches!(res, Err(SqlExecutorError::ConnectionError(msg)) if msg == "nope"));
    }

    #[tokio::test]
    async fn panicking_job_surfaces_as_connection_error() {
        let worker = BlockingWorker::spawn("panicking-worker".into(), || Ok(()))
            .await
            .unwrap();
        let res: Result<(), _> = worker.run(|()| panic!("boom")).await;
        assert!(matches!(res, Err(SqlExecutorError::ConnectionError(_))));
    }
}
