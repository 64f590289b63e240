pub mod dependencies;
pub mod progress;
pub mod setup;
pub mod task_runner;

use tokio_util::sync::CancellationToken;

use crate::domain::{TaskError, TaskKind};

pub use dependencies::{check_dependencies, DependencyReport};
pub use setup::SetupCoordinator;
pub use task_runner::run_process;

/// The single active-task slot. At most one worker runs at a time; a second
/// start is rejected rather than queued.
#[derive(Debug, Default)]
pub struct TaskSlot {
    active: Option<(TaskKind, CancellationToken)>,
}

impl TaskSlot {
    pub fn begin(&mut self, kind: TaskKind) -> Result<CancellationToken, TaskError> {
        if self.active.is_some() {
            return Err(TaskError::Busy);
        }
        let token = CancellationToken::new();
        self.active = Some((kind, token.clone()));
        log::info!("{kind} task started");
        Ok(token)
    }

    /// Request cancellation of the running task, if any.
    pub fn cancel(&self) -> bool {
        match &self.active {
            Some((kind, token)) => {
                log::info!("cancel requested for {kind} task");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn finish(&mut self) -> Option<TaskKind> {
        self.active.take().map(|(kind, _)| kind)
    }

    pub fn kind(&self) -> Option<TaskKind> {
        self.active.as_ref().map(|(kind, _)| *kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_task_rejected() {
        let mut slot = TaskSlot::default();
        let token = slot.begin(TaskKind::Download).unwrap();
        assert!(matches!(
            slot.begin(TaskKind::FetchBinary),
            Err(TaskError::Busy)
        ));
        assert_eq!(slot.kind(), Some(TaskKind::Download));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_sets_token() {
        let mut slot = TaskSlot::default();
        assert!(!slot.cancel());
        let token = slot.begin(TaskKind::InstallPackages).unwrap();
        assert!(slot.cancel());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_finish_frees_slot() {
        let mut slot = TaskSlot::default();
        slot.begin(TaskKind::Download).unwrap();
        assert_eq!(slot.finish(), Some(TaskKind::Download));
        assert_eq!(slot.kind(), None);
        assert!(slot.begin(TaskKind::FetchBinary).is_ok());
    }
}
