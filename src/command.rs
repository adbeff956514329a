//! Commands and the binder that prepares them for a backend.

use std::time::Duration;

use crate::backend::{Backend, Connection};
use crate::error::SqlExecutorError;
use crate::params::{NamedParams, Parameter};
use crate::translation::rewrite_placeholders;
use crate::types::{CommandMode, RowValues};

/// A command as the caller writes it: text or procedure name, mode and named parameters.
///
/// Plain strings convert into text commands, so every executor operation accepts either.
///
/// ```rust
/// use std::time::Duration;
/// use sql_executor::prelude::*;
///
/// let cmd = Command::text("update users set name = @name where id = @id")
///     .param("@id", 7)
///     .param("@name", "ada")
///     .timeout(Duration::from_secs(5));
/// assert_eq!(cmd.parameters().len(), 2);
///
/// let proc = Command::procedure("dbo.archive_user").param("id", 7);
/// assert_eq!(proc.command_mode(), CommandMode::StoredProcedure);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    pub(crate) text: String,
    pub(crate) mode: CommandMode,
    pub(crate) params: NamedParams,
    pub(crate) timeout: Option<Duration>,
}

impl Command {
    #[must_use]
    pub fn text(sql: impl Into<String>) -> Self {
        Self {
            text: sql.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn procedure(name: impl Into<String>) -> Self {
        Self {
            text: name.into(),
            mode: CommandMode::StoredProcedure,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: CommandMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.params.insert(Parameter::new(name, value));
        self
    }

    #[must_use]
    pub fn parameter(mut self, param: Parameter) -> Self {
        self.params.insert(param);
        self
    }

    /// Add every entry of `params`, replacing same-named ones already present.
    #[must_use]
    pub fn params(mut self, params: impl Into<NamedParams>) -> Self {
        for param in params.into() {
            self.params.insert(param);
        }
        self
    }

    /// Deadline for this command, overriding the executor default.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn command_text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn command_mode(&self) -> CommandMode {
        self.mode
    }

    #[must_use]
    pub fn parameters(&self) -> &NamedParams {
        &self.params
    }
}

impl From<&str> for Command {
    fn from(sql: &str) -> Self {
        Command::text(sql)
    }
}

impl From<String> for Command {
    fn from(sql: String) -> Self {
        Command::text(sql)
    }
}

impl From<&String> for Command {
    fn from(sql: &String) -> Self {
        Command::text(sql.as_str())
    }
}

/// A command ready for one driver: final text plus parameters in driver position order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundCommand {
    pub text: String,
    pub mode: CommandMode,
    pub params: Vec<Parameter>,
}

impl BoundCommand {
    pub fn values(&self) -> impl Iterator<Item = &RowValues> {
        self.params.iter().map(|p| &p.value)
    }
}

/// Bind `text` and `params` for `backend`.
///
/// Text commands have their placeholders rewritten into the driver's style; procedure
/// commands are turned into the backend's call syntax. Each parameter is first converted
/// into the backend's native form.
///
/// # Errors
/// Returns [`SqlExecutorError::Unimplemented`] for procedures on backends without them.
pub fn prepare(
    backend: &dyn Backend,
    text: &str,
    mode: CommandMode,
    params: &[Parameter],
) -> Result<BoundCommand, SqlExecutorError> {
    let native: Vec<Parameter> = params
        .iter()
        .cloned()
        .map(|p| backend.create_parameter(p))
        .collect();

    match mode {
        CommandMode::Text => {
            let rewritten = rewrite_placeholders(text, backend.placeholder_style(), &native);
            let params = rewritten
                .order
                .iter()
                .map(|&idx| native[idx].clone())
                .collect();
            Ok(BoundCommand {
                text: rewritten.sql.into_owned(),
                mode,
                params,
            })
        }
        CommandMode::StoredProcedure => Ok(BoundCommand {
            text: backend.procedure_text(text, &native)?,
            mode,
            params: native,
        }),
    }
}

/// A connection that is opened the first time a command is bound to it.
pub(crate) struct LazyConnection<'a> {
    backend: &'a dyn Backend,
    connection_string: &'a str,
    conn: Option<Box<dyn Connection>>,
}

impl<'a> LazyConnection<'a> {
    pub(crate) fn new(backend: &'a dyn Backend, connection_string: &'a str) -> Self {
        Self {
            backend,
            connection_string,
            conn: None,
        }
    }

    /// The open connection, connecting first if needed.
    pub(crate) async fn open(&mut self) -> Result<&mut Box<dyn Connection>, SqlExecutorError> {
        if self.conn.is_none() {
            let conn = self.backend.connect(self.connection_string).await?;
            tracing::trace!(backend = %self.backend.kind(), "connection opened");
            self.conn = Some(conn);
        }
        self.conn.as_mut().ok_or_else(|| {
            SqlExecutorError::ConnectionError("connection was not opened".to_string())
        })
    }

    /// Open if needed, then bind the command against this backend.
    pub(crate) async fn bind(
        &mut self,
        text: &str,
        mode: CommandMode,
        params: &[Parameter],
    ) -> Result<(&mut Box<dyn Connection>, BoundCommand), SqlExecutorError> {
        let backend = self.backend;
        let conn = self.open().await?;
        let bound = prepare(backend, text, mode, params)?;
        Ok((conn, bound))
    }

    /// The connection if it was opened.
    pub(crate) fn opened(&mut self) -> Option<&mut Box<dyn Connection>> {
        self.conn.as_mut()
    }

    pub(crate) fn into_connection(self) -> Option<Box<dyn Connection>> {
        self.conn
    }

    /// Close the connection if it was ever opened.
    pub(crate) async fn release(self) {
        if let Some(conn) = self.conn {
            conn.close().await;
            tracing::trace!("connection released");
        }
    }
}
