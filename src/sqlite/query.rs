use std::sync::Arc;

use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::types::Value;
use rusqlite::{Batch, Statement};

use super::params::bind_parameters;
use crate::command::BoundCommand;
use crate::error::SqlExecutorError;
use crate::results::{ResultSet, RowSet};
use crate::types::RowValues;

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
///
/// Returns `SqlExecutorError` if the value cannot be converted.
pub fn sqlite_extract_value_sync(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<RowValues, SqlExecutorError> {
    let value: Value = row.get(idx)?;
    match value {
        Value::Null => Ok(RowValues::Null),
        Value::Integer(i) => Ok(RowValues::Int(i)),
        Value::Real(f) => Ok(RowValues::Float(f)),
        Value::Text(s) => Ok(RowValues::Text(s)),
        Value::Blob(b) => Ok(RowValues::Blob(b)),
    }
}

pub(crate) fn extract_row(
    row: &rusqlite::Row,
    col_count: usize,
) -> Result<Vec<RowValues>, SqlExecutorError> {
    (0..col_count)
        .map(|i| sqlite_extract_value_sync(row, i))
        .collect()
}

pub(crate) fn column_names(stmt: &Statement<'_>) -> Arc<Vec<String>> {
    Arc::new(
        stmt.column_names()
            .iter()
            .map(std::string::ToString::to_string)
            .collect(),
    )
}

/// Prepare the command's text and bind its parameters.
pub(crate) fn prepare_bound<'c>(
    conn: &'c rusqlite::Connection,
    command: &BoundCommand,
) -> Result<Statement<'c>, SqlExecutorError> {
    let mut stmt = conn.prepare(&command.text)?;
    bind_parameters(&mut stmt, &command.params)?;
    Ok(stmt)
}

/// Read every row of an already-bound statement.
///
/// # Errors
/// Returns `SqlExecutorError` if stepping the statement or reading a value fails.
pub fn build_result_set(stmt: &mut Statement<'_>) -> Result<ResultSet, SqlExecutorError> {
    let column_names = column_names(stmt);
    let col_count = column_names.len();
    let mut result_set = ResultSet::with_capacity(10);
    result_set.set_column_names(column_names);

    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        result_set.add_row_values(extract_row(row, col_count)?);
    }
    Ok(result_set)
}

/// Run an already-bound statement for its side effects.
///
/// Statements that return rows are stepped to completion; read-only ones report zero changes.
pub(crate) fn execute_bound(
    conn: &rusqlite::Connection,
    stmt: &mut Statement<'_>,
) -> Result<usize, SqlExecutorError> {
    if stmt.column_count() == 0 {
        return Ok(stmt.raw_execute()?);
    }
    let mut rows = stmt.raw_query();
    while rows.next()?.is_some() {}
    drop(rows);
    if stmt.readonly() {
        Ok(0)
    } else {
        Ok(usize::try_from(conn.changes()).unwrap_or(usize::MAX))
    }
}

/// Run every statement of a parameterless text, returning the rows changed by all of them.
pub(crate) fn execute_all(conn: &rusqlite::Connection, sql: &str) -> Result<usize, SqlExecutorError> {
    let before = conn.total_changes();
    let mut batch = Batch::new(conn, sql);
    while let Some(mut stmt) = batch.next()? {
        execute_bound(conn, &mut stmt)?;
    }
    let changed = conn.total_changes().saturating_sub(before);
    Ok(usize::try_from(changed).unwrap_or(usize::MAX))
}

/// Run every statement in `command`, keeping one table per statement that returns columns.
pub(crate) fn build_row_set(
    conn: &rusqlite::Connection,
    command: &BoundCommand,
) -> Result<RowSet, SqlExecutorError> {
    let mut set = RowSet::default();
    let mut batch = Batch::new(conn, &command.text);
    while let Some(mut stmt) = batch.next()? {
        bind_parameters(&mut stmt, &command.params)?;
        if stmt.column_count() > 0 {
            set.push(build_result_set(&mut stmt)?);
        } else {
            stmt.raw_execute()?;
        }
    }
    Ok(set)
}
