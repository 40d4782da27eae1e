use crate::alias::NoSuchAlias;
use crate::command::{ExitCode, ExitNotification, UsageError};
use crate::lexer::LexingError;
use crate::registry::RegistryError;
use thiserror::Error;

/// Boxed underlying failure carried by the wrapping variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything that can go wrong while executing a line.
#[derive(Debug, Error)]
pub enum ShellError {
    /// No alias, command or group answers to the name.
    #[error("command not found: {0}")]
    CommandNotFound(String),
    /// The name resolved to a group, which cannot be executed.
    #[error("{0}: is a group")]
    IsAGroup(String),
    #[error(transparent)]
    NoSuchAlias(#[from] NoSuchAlias),
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("syntax error: {0}")]
    Syntax(#[from] LexingError),
    /// A substitution inside an argument failed.
    #[error("cannot evaluate `{fragment}`: {source}")]
    Evaluation {
        fragment: String,
        #[source]
        source: BoxError,
    },
    /// The command itself failed.
    #[error("{path}: {source} (args: {args:?})")]
    Execution {
        path: String,
        args: Vec<String>,
        #[source]
        source: BoxError,
    },
    #[error("alias `{name}` nested more than {limit} levels deep")]
    AliasDepthExceeded { name: String, limit: usize },
    /// Not a failure; see [`ExitNotification`].
    #[error(transparent)]
    Exit(#[from] ExitNotification),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// Errors that leave the session intact and only fail the statement
    /// that raised them.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ShellError::CommandNotFound(_)
                | ShellError::IsAGroup(_)
                | ShellError::NoSuchAlias(_)
                | ShellError::Usage(_)
        )
    }

    /// The requested exit status when this is an exit notification.
    pub fn exit_code(&self) -> Option<ExitCode> {
        match self {
            ShellError::Exit(exit) => Some(exit.code),
            _ => None,
        }
    }
}
