use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::error::SqlExecutorError;

/// Values that can be stored in a database row or used as command parameters.
///
/// The same enum is used by every backend so callers never branch on driver types:
/// ```rust
/// use sql_executor::prelude::*;
///
/// let values: Vec<RowValues> = vec![1.into(), "alice".into(), true.into(), None::<i64>.into()];
/// assert!(values[3].is_null());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            RowValues::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            RowValues::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

/// Renders the value the way it appears in diagnostics and in
/// [`SqlExecutor::get_scalar_string`](crate::SqlExecutor::get_scalar_string).
///
/// NULL renders as an empty string.
impl fmt::Display for RowValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowValues::Int(i) => write!(f, "{i}"),
            RowValues::Float(v) => write!(f, "{v}"),
            RowValues::Text(s) => f.write_str(s),
            RowValues::Bool(b) => write!(f, "{b}"),
            RowValues::Timestamp(dt) => write!(f, "{}", dt.format("%F %T%.f")),
            RowValues::Null => Ok(()),
            RowValues::JSON(v) => write!(f, "{v}"),
            RowValues::Blob(bytes) => {
                f.write_str("0x")?;
                for b in bytes {
                    write!(f, "{b:02X}")?;
                }
                Ok(())
            }
        }
    }
}

macro_rules! int_into_row_values {
    ($($t:ty),*) => {
        $(impl From<$t> for RowValues {
            fn from(value: $t) -> Self {
                RowValues::Int(i64::from(value))
            }
        })*
    };
}

int_into_row_values!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for RowValues {
    fn from(value: f32) -> Self {
        RowValues::Float(f64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_string())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<NaiveDateTime> for RowValues {
    fn from(value: NaiveDateTime) -> Self {
        RowValues::Timestamp(value)
    }
}

impl From<JsonValue> for RowValues {
    fn from(value: JsonValue) -> Self {
        RowValues::JSON(value)
    }
}

impl From<Vec<u8>> for RowValues {
    fn from(value: Vec<u8>) -> Self {
        RowValues::Blob(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// The family of database engine behind an executor.
///
/// Fixed at construction; [`backend::resolve`](crate::backend::resolve) maps each kind to the
/// driver capabilities that serve it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, ValueEnum, Serialize)]
pub enum BackendKind {
    /// SQL Server over TDS
    #[default]
    #[value(alias = "mssql", alias = "sqlserver")]
    SqlServer,
    /// OLE DB style tabular sources, reached through their ODBC drivers
    #[value(alias = "oledb")]
    OleDb,
    /// Any ODBC data source
    Odbc,
    /// Oracle, reached through the Oracle ODBC driver
    Oracle,
    /// `PostgreSQL`
    #[value(alias = "postgresql", alias = "pg")]
    Postgres,
    /// `SQLite` database file
    #[value(alias = "sqlite3")]
    Sqlite,
}

impl BackendKind {
    /// Parse a backend name, falling back to [`BackendKind::SqlServer`] for anything unknown.
    ///
    /// The fallback is logged at warn. Use [`str::parse`] to reject unknown names instead.
    #[must_use]
    pub fn from_name_or_default(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            tracing::warn!(
                backend = name,
                "unrecognised backend kind; falling back to SQL Server"
            );
            BackendKind::SqlServer
        })
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::SqlServer => "sql-server",
            BackendKind::OleDb => "ole-db",
            BackendKind::Odbc => "odbc",
            BackendKind::Oracle => "oracle",
            BackendKind::Postgres => "postgres",
            BackendKind::Sqlite => "sqlite",
        };
        f.write_str(name)
    }
}

impl FromStr for BackendKind {
    type Err = SqlExecutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "sqlserver" | "mssql" => Ok(BackendKind::SqlServer),
            "oledb" => Ok(BackendKind::OleDb),
            "odbc" => Ok(BackendKind::Odbc),
            "oracle" => Ok(BackendKind::Oracle),
            "postgres" | "postgresql" | "pg" => Ok(BackendKind::Postgres),
            "sqlite" | "sqlite3" => Ok(BackendKind::Sqlite),
            _ => Err(SqlExecutorError::ConfigError(format!(
                "unknown backend kind: {s}"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for BackendKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(BackendKind::from_name_or_default(&name))
    }
}

/// How the command text is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommandMode {
    /// Raw SQL text.
    #[default]
    Text,
    /// The text names a stored procedure; parameters become its arguments.
    StoredProcedure,
}
