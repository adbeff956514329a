//! Backend-agnostic SQL execution.
//!
//! An [`SqlExecutor`] is built once for a [`BackendKind`] and a connection string, then runs
//! parameterized commands against that database: row counts, scalars, materialized tables
//! and row sets, forward-only cursors, stored procedures with output arguments, and
//! all-or-nothing statement batches. Named parameters are written once and bound the way
//! each driver expects.
//!
//! | Kind | Driver | Feature |
//! |------|--------|---------|
//! | `SqlServer` (default) | tiberius | `mssql` |
//! | `Postgres` | tokio-postgres | `postgres` |
//! | `Sqlite` | rusqlite | `sqlite` |
//! | `Odbc`, `OleDb`, `Oracle` | odbc-api | `odbc` |
//!
//! ```rust,no_run
//! use sql_executor::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlExecutorError> {
//! let executor = SqlExecutor::new("app.db", BackendKind::Sqlite);
//! executor
//!     .execute_non_query("create table if not exists t (a integer)")
//!     .await?;
//!
//! let mut batch = executor.begin_batch();
//! batch
//!     .register("insert into t (a) values (?)", [("a", 1)])
//!     .register("insert into t (a) values (?)", [("a", 2)]);
//! batch.flush().await?;
//!
//! let count = executor.get_scalar("select count(*) from t").await?;
//! assert_eq!(count, Some(RowValues::Int(2)));
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod batch;
pub mod command;
pub mod config;
pub mod cursor;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod params;
pub mod prelude;
pub mod results;
pub mod translation;
pub mod types;

#[cfg(any(feature = "sqlite", feature = "odbc"))]
mod worker;

#[cfg(feature = "mssql")]
pub mod mssql;
#[cfg(feature = "odbc")]
pub mod odbc;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use batch::{BatchOutcome, PendingStatement, TransactionBatch};
pub use command::{BoundCommand, Command};
pub use config::ExecutorConfig;
pub use cursor::RowCursor;
pub use diagnostics::{FailureSink, TracingSink};
pub use error::SqlExecutorError;
pub use executor::SqlExecutor;
pub use params::{NamedParams, ParamDirection, Parameter};
pub use results::{CustomDbRow, ResultSet, RowSet};
pub use types::{BackendKind, CommandMode, RowValues};
