//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::backend::{Backend, Connection};
pub use crate::batch::{BatchOutcome, PendingStatement, TransactionBatch};
pub use crate::command::{BoundCommand, Command};
pub use crate::config::ExecutorConfig;
pub use crate::cursor::{RowCursor, RowSource};
pub use crate::diagnostics::{FailureSink, TracingSink, format_failure};
pub use crate::error::SqlExecutorError;
pub use crate::executor::SqlExecutor;
pub use crate::params::{NamedParams, ParamDirection, Parameter};
pub use crate::results::{CustomDbRow, ResultSet, RowSet};
pub use crate::translation::{PlaceholderStyle, rewrite_placeholders};
pub use crate::types::{BackendKind, CommandMode, RowValues};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteOptions;
