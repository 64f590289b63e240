use std::path::PathBuf;

use thiserror::Error;

/// Every failure a task can surface to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("Process failed with {0}")]
    NonZeroExit(String),

    #[error("Network request timed out: {0}")]
    NetworkTimeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid custom arguments: {0}")]
    MalformedArguments(String),

    #[error("Failed to create directory {}: {reason}", path.display())]
    DirectoryCreation { path: PathBuf, reason: String },

    #[error("No release asset named {0}")]
    AssetNotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Another task is already running")]
    Busy,

    #[error("Cancelled")]
    Cancelled,
}

impl From<std::io::Error> for TaskError {
    fn from(e: std::io::Error) -> Self {
        TaskError::Io(e.to_string())
    }
}
