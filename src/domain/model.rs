use std::fmt;

use super::TaskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Download,
    FetchBinary,
    InstallPackages,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Download => "download",
            TaskKind::FetchBinary => "fetch yt-dlp",
            TaskKind::InstallPackages => "install packages",
        };
        f.write_str(name)
    }
}

/// One trimmed line of tool output together with the last known percentage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub text: String,
    pub percent: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded(String),
    Failed(TaskError),
    Cancelled,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded(_))
    }

    pub fn message(&self) -> String {
        match self {
            TaskOutcome::Succeeded(message) => message.clone(),
            TaskOutcome::Failed(error) => error.to_string(),
            TaskOutcome::Cancelled => "Cancelled by user".to_string(),
        }
    }
}

impl From<Result<String, TaskError>> for TaskOutcome {
    fn from(result: Result<String, TaskError>) -> Self {
        match result {
            Ok(message) => TaskOutcome::Succeeded(message),
            Err(TaskError::Cancelled) => TaskOutcome::Cancelled,
            Err(e) => TaskOutcome::Failed(e),
        }
    }
}

/// Notifications a worker sends back to the UI thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// Incremental output from a running download.
    Output(OutputLine),
    /// Discrete progress message from a setup operation.
    Setup(String),
    Finished(TaskOutcome),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_error_becomes_cancelled_outcome() {
        let outcome = TaskOutcome::from(Err(TaskError::Cancelled));
        assert_eq!(outcome, TaskOutcome::Cancelled);
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_failure_message_is_error_text() {
        let outcome = TaskOutcome::from(Err(TaskError::NonZeroExit("exit status: 2".into())));
        assert_eq!(outcome.message(), "Process failed with exit status: 2");
    }
}
