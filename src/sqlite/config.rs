use std::time::Duration;

use rusqlite::OpenFlags;

use crate::error::SqlExecutorError;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for opening a `SQLite` database.
///
/// Built from either a bare path (or `file:` URI) or an ADO-style string such as
/// `Data Source=app.db;FailIfMissing=True;Busy Timeout=2000`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteOptions {
    pub db_path: String,
    pub create_if_missing: bool,
    pub read_only: bool,
    pub busy_timeout: Duration,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            create_if_missing: true,
            read_only: false,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Parse a connection string.
    ///
    /// Recognised keys (case-insensitive): `Data Source` / `DataSource` / `Filename`,
    /// `FailIfMissing`, `Read Only`, `Busy Timeout` (milliseconds). Other keys are ignored.
    ///
    /// # Errors
    /// Returns [`SqlExecutorError::ConfigError`] for an empty path or a malformed value.
    pub fn parse(connection_string: &str) -> Result<Self, SqlExecutorError> {
        let trimmed = connection_string.trim();
        if !is_keyed(trimmed) {
            if trimmed.is_empty() {
                return Err(SqlExecutorError::ConfigError(
                    "SQLite connection string names no database".to_string(),
                ));
            }
            return Ok(Self::new(trimmed));
        }

        let mut opts = Self::new(String::new());
        for (key, value) in pairs(trimmed) {
            match normalize_key(key).as_str() {
                "datasource" | "filename" => opts.db_path = value.to_string(),
                "failifmissing" => opts.create_if_missing = !parse_bool(key, value)?,
                "readonly" => opts.read_only = parse_bool(key, value)?,
                "busytimeout" => {
                    let millis = value.parse::<u64>().map_err(|_| {
                        SqlExecutorError::ConfigError(format!("invalid {key}: {value}"))
                    })?;
                    opts.busy_timeout = Duration::from_millis(millis);
                }
                _ => tracing::debug!(key, "ignoring SQLite connection string key"),
            }
        }
        if opts.db_path.is_empty() {
            return Err(SqlExecutorError::ConfigError(
                "SQLite connection string has an empty Data Source".to_string(),
            ));
        }
        Ok(opts)
    }

    pub(crate) fn open(&self) -> Result<rusqlite::Connection, SqlExecutorError> {
        let mut flags = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if self.read_only {
            flags |= OpenFlags::SQLITE_OPEN_READ_ONLY;
        } else {
            flags |= OpenFlags::SQLITE_OPEN_READ_WRITE;
            if self.create_if_missing {
                flags |= OpenFlags::SQLITE_OPEN_CREATE;
            }
        }
        let conn = rusqlite::Connection::open_with_flags(&self.db_path, flags)?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }
}

fn pairs(connection_string: &str) -> impl Iterator<Item = (&str, &str)> {
    connection_string
        .split(';')
        .filter_map(|segment| segment.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
}

fn is_keyed(connection_string: &str) -> bool {
    pairs(connection_string)
        .any(|(key, _)| matches!(normalize_key(key).as_str(), "datasource" | "filename"))
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SqlExecutorError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(SqlExecutorError::ConfigError(format!(
            "invalid {key}: {value}"
        ))),
    }
}
