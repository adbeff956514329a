use std::time::Duration;

use serde::Deserialize;

use crate::error::SqlExecutorError;
use crate::executor::SqlExecutor;
use crate::types::BackendKind;

/// Everything needed to build a [`SqlExecutor`].
///
/// Deserializes from `{"connection_string": "...", "backend": "postgres", "timeout_secs": 30}`;
/// `backend` and `timeout_secs` are optional, and an unrecognised backend name falls back to
/// SQL Server with a warning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawConfig")]
pub struct ExecutorConfig {
    pub connection_string: String,
    pub backend: BackendKind,
    pub timeout: Option<Duration>,
}

#[derive(Deserialize)]
struct RawConfig {
    connection_string: String,
    #[serde(default)]
    backend: BackendKind,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

impl From<RawConfig> for ExecutorConfig {
    fn from(raw: RawConfig) -> Self {
        Self {
            connection_string: raw.connection_string,
            backend: raw.backend,
            timeout: raw.timeout_secs.map(Duration::from_secs),
        }
    }
}

impl ExecutorConfig {
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            backend: BackendKind::default(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    /// Returns [`SqlExecutorError::ConfigError`] if the JSON is malformed or lacks
    /// `connection_string`.
    pub fn from_json(json: &str) -> Result<Self, SqlExecutorError> {
        serde_json::from_str(json)
            .map_err(|e| SqlExecutorError::ConfigError(format!("invalid executor config: {e}")))
    }

    #[must_use]
    pub fn build(self) -> SqlExecutor {
        SqlExecutor::from_config(self)
    }
}
