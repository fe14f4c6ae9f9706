//! Error types for backlog
//!
//! Errors are grouped into kinds:
//! - Format: malformed identifiers, front matter, enum values or config
//! - NotFound: missing task, parent or dependency
//! - Lock: allocator lock could not be taken
//! - Resolution: unsupported strategy or a failed plan action
//! - Io: file system and logging setup failures

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Format,
    NotFound,
    Lock,
    Resolution,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Format => "format",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Lock => "lock",
            ErrorKind::Resolution => "resolution",
            ErrorKind::Io => "io",
        }
    }
}

/// Main error type for backlog operations
#[derive(Error, Debug)]
pub enum Error {
    // Format errors
    #[error("invalid task id {input:?}: {reason}")]
    InvalidTaskId { input: String, reason: String },

    #[error("invalid front matter in {path}: {reason}")]
    InvalidFrontMatter { path: PathBuf, reason: String },

    #[error("invalid {field} {value:?}")]
    InvalidEnum { field: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // Not found
    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error("parent task {0} not found")]
    ParentNotFound(String),

    #[error("dependency task {0} not found")]
    DependencyNotFound(String),

    // Locking
    #[error("Lock acquisition timed out: {0}")]
    LockTimeout(PathBuf),

    #[error("Lock failure: {0}")]
    Lock(String),

    // Resolution
    #[error("unsupported resolution strategy: {0}")]
    UnsupportedStrategy(String),

    #[error("failed to execute action {action}: {source}")]
    ActionFailed {
        action: String,
        /// Messages produced by the actions that completed before the failure
        completed: Vec<String>,
        #[source]
        source: Box<Error>,
    },

    // IO
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("logging setup failed: {0}")]
    Logging(String),
}

impl Error {
    /// Get the kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidTaskId { .. }
            | Error::InvalidFrontMatter { .. }
            | Error::InvalidEnum { .. }
            | Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::Yaml(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_) => ErrorKind::Format,

            Error::TaskNotFound(_) | Error::ParentNotFound(_) | Error::DependencyNotFound(_) => {
                ErrorKind::NotFound
            }

            Error::LockTimeout(_) | Error::Lock(_) => ErrorKind::Lock,

            Error::UnsupportedStrategy(_) | Error::ActionFailed { .. } => ErrorKind::Resolution,

            Error::Io(_) | Error::Logging(_) => ErrorKind::Io,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub(crate) fn invalid_id(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidTaskId {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for backlog operations
pub type Result<T> = std::result::Result<T, Error>;
