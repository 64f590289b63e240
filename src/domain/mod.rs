pub mod command;
pub mod error;
pub mod model;

pub use command::{DownloadOptions, FormatPreset};
pub use error::TaskError;
pub use model::{OutputLine, TaskEvent, TaskKind, TaskOutcome};
